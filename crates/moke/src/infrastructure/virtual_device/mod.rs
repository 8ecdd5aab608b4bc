//! Virtual output device adapters.
//!
//! The correct implementation is selected at compile time via `#[cfg(target_os = ...)]`.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;
