//! Infrastructure layer for moke.
//!
//! Contains the OS-facing adapters behind the application ports: the evdev
//! keyboard reader and the uinput virtual device.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `moke_core`, but MUST NOT be imported by the `application` layer outside
//! of tests.
//!
//! # Sub-modules
//!
//! - **`keyboard`** – `/dev/input` scanning and the evdev keyboard
//!   ([`keyboard::linux::EvdevNamespace`]).  A mock namespace is provided for
//!   tests.
//!
//! - **`virtual_device`** – `/dev/uinput` device creation and event writes
//!   ([`virtual_device::linux::UinputFactory`]).  A recording mock is provided
//!   for tests.
//!
//! - **`ioctl`** (Linux only) – The evdev and uinput ioctl wrappers both
//!   adapters share.

pub mod keyboard;
pub mod virtual_device;

#[cfg(target_os = "linux")]
pub(crate) mod ioctl;
