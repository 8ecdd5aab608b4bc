//! moke library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does moke do? (for beginners)
//!
//! Some laptops have a trackpad without physical buttons.  Moke lets the
//! keyboard stand in for them: holding `Windows` acts as the left button,
//! `Windows+LeftAlt` as the middle button and `Windows+RightAlt` as the right
//! button (all configurable).
//!
//! The application:
//!
//! 1. Builds the chord table from the command line (or the defaults).
//! 2. Finds the keyboard in `/dev/input` and checks it can generate every key
//!    the chords use.
//! 3. Grabs the keyboard so nobody else reads its raw events.  Only the
//!    chord keys are passed on, so by default the keyboard cannot type
//!    anything else while moke runs.  `--shared` leaves the keyboard to the
//!    desktop and keeps normal typing.
//! 4. Creates a virtual device through `/dev/uinput` that declares the mouse
//!    buttons and the chord keys.
//! 5. Runs the translation engine from `moke-core` until the keyboard goes
//!    away.

/// Application layer: run configuration and startup sequencing.
pub mod application;

/// Infrastructure layer: Linux evdev/uinput adapters and in-memory mocks.
pub mod infrastructure;
