//! Moke entry point.
//!
//! Parses the command line into a [`RunConfig`], initializes logging, and
//! runs the startup sequence against the real evdev and uinput adapters.
//!
//! # Usage
//!
//! ```text
//! moke [OPTIONS] [KEYBOARD] [DEVICE]
//!
//! Options:
//!   -l, --left <KEYS>     Keys for the left button
//!   -m, --middle <KEYS>   Keys for the middle button
//!   -r, --right <KEYS>    Keys for the right button
//!   -s, --shared          Do not hold the keyboard grab while running;
//!                         without it no other key is typed
//!   -v, --verbose         Log every decision at debug level
//!       --list-keys       Print the accepted key names and exit
//! ```
//!
//! `KEYS` is `KEY` or `KEY+MODIFIER`.  `KEYBOARD` is a device path or a
//! fragment of the device name (`^` and `$` anchor it); the default matches
//! any name ending in ` keyboard`.  `DEVICE` defaults to `/dev/uinput`.
//!
//! # Environment variable overrides
//!
//! | Variable        | Default       | Description              |
//! |-----------------|---------------|--------------------------|
//! | `MOKE_KEYBOARD` | ` keyboard$`  | Keyboard path or pattern |
//! | `MOKE_OUTPUT`   | `/dev/uinput` | uinput control device    |
//! | `RUST_LOG`      | `info`        | Log filter               |
//!
//! # Exit status
//!
//! `0` when the keyboard stream ends, `1` on any fatal error (printed once
//! to stderr), `2` on a command-line usage error.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use tracing_subscriber::EnvFilter;

use moke::application::config::{key_help, ChordConfig, GrabMode, RunConfig, DEFAULT_OUTPUT};
use moke_core::MouseButton;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Mouse buttons from keyboard chords.
///
/// Reads a keyboard through evdev and emits left, middle and right button
/// events on a uinput virtual device.
#[derive(Debug, Parser)]
#[command(
    name = "moke",
    about = "Emulate mouse buttons from keyboard chords",
    version,
    after_help = "Run with --list-keys for the accepted key names and the default mapping."
)]
struct Cli {
    /// Keys for the left button: KEY or KEY+MODIFIER.
    #[arg(short = 'l', long, value_name = "KEYS")]
    left: Vec<String>,

    /// Keys for the middle button: KEY or KEY+MODIFIER.
    #[arg(short = 'm', long, value_name = "KEYS")]
    middle: Vec<String>,

    /// Keys for the right button: KEY or KEY+MODIFIER.
    #[arg(short = 'r', long, value_name = "KEYS")]
    right: Vec<String>,

    /// Share the keyboard so it can still type (without this, only chord keys get through).
    ///
    /// By default the keyboard is grabbed for the whole run and only the
    /// chord keys are forwarded through the virtual device, so the keyboard
    /// cannot type anything else while moke runs.  With --shared the grab is
    /// taken once at startup to detect a competing reader, then released.
    /// Chord keys are not forwarded through the virtual device.
    #[arg(short, long)]
    shared: bool,

    /// Log each decision (device rejections, button transitions).
    #[arg(short, long)]
    verbose: bool,

    /// Print the accepted key names and exit.
    #[arg(long)]
    list_keys: bool,

    /// Keyboard device path or name pattern.
    #[arg(env = "MOKE_KEYBOARD")]
    keyboard: Option<String>,

    /// uinput control device.
    #[arg(default_value = DEFAULT_OUTPUT, env = "MOKE_OUTPUT")]
    device: PathBuf,
}

impl Cli {
    /// Parses `args`, keeping the raw matches for option positions.
    fn parse_args<I, T>(args: I) -> Result<(Self, ArgMatches), clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let cli = Self::from_arg_matches(&matches)?;
        Ok((cli, matches))
    }

    /// Converts the parsed arguments into a [`RunConfig`].
    ///
    /// Chords keep the order they were given on the command line.
    fn into_run_config(self, matches: &ArgMatches) -> RunConfig {
        let mut chords = Vec::new();
        for (button, id, values) in [
            (MouseButton::Left, "left", self.left),
            (MouseButton::Middle, "middle", self.middle),
            (MouseButton::Right, "right", self.right),
        ] {
            let indices = matches.indices_of(id).into_iter().flatten();
            for (index, keys) in indices.zip(values) {
                chords.push((index, ChordConfig { button, keys }));
            }
        }
        chords.sort_by_key(|(index, _)| *index);

        RunConfig {
            chords: chords.into_iter().map(|(_, chord)| chord).collect(),
            keyboard: self.keyboard,
            output: self.device,
            grab: if self.shared {
                GrabMode::Probe
            } else {
                GrabMode::Exclusive
            },
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let (cli, matches) = match Cli::parse_args(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    if cli.list_keys {
        println!("{}", key_help());
        return ExitCode::SUCCESS;
    }

    // Initialise structured logging on stderr; RUST_LOG overrides -v.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.into_run_config(&matches);
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {err:#}", env!("CARGO_BIN_NAME"));
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_os = "linux")]
fn run(config: &RunConfig) -> anyhow::Result<()> {
    use moke::application::startup;
    use moke::infrastructure::keyboard::linux::EvdevNamespace;
    use moke::infrastructure::virtual_device::linux::UinputFactory;

    tracing::info!("moke {} starting", env!("CARGO_PKG_VERSION"));
    match startup::run(config, &EvdevNamespace::default(), &UinputFactory) {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() && !nix::unistd::geteuid().is_root() => {
            Err(anyhow::anyhow!("{err} (not root, sudo?)"))
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(not(target_os = "linux"))]
fn run(_config: &RunConfig) -> anyhow::Result<()> {
    anyhow::bail!("moke needs Linux evdev and uinput")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
