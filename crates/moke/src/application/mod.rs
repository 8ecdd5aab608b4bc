//! Application layer for moke.
//!
//! # What lives here?
//!
//! - **`config`** – [`config::RunConfig`], the plain settings struct the
//!   binary fills from its command line.  Nothing below `main` reads the
//!   environment or the argument list.
//!
//! - **`startup`** – The ordered startup sequence (mapping, keyboard search,
//!   grab, output device, engine loop) written against the
//!   [`startup::Keyboard`] and [`startup::OutputFactory`] ports.  The Linux
//!   adapters implement those ports in the infrastructure layer, and the
//!   in-memory mocks implement them for tests.

pub mod config;
pub mod startup;
