//! Domain entities for Moke.
//!
//! This module contains pure logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the rules that make the program what it is: which chord drives
//!   which button, and which device counts as "the keyboard".
//! - Has **no** imports from OS APIs.  Opening a device and issuing ioctls is
//!   the application crate's job; it hands the results to this layer through
//!   the [`device::DeviceNamespace`] and [`device::ProbeDevice`] traits.
//! - Can be compiled and tested on any platform without any external setup.

/// Fixed-size capability bitmaps.
pub mod bitset;

/// Device selection and validation.
///
/// See [`device::find_keyboard`] for the entry point.
pub mod device;

/// Chord-to-button rules and per-key state.
///
/// See [`mapping::MappingTable`] for the builder.
pub mod mapping;
