//! Driver for a Notecard companion module on an I2C bus.
//!
//! Requests are JSON documents built on a [`Notecard`] handle, framed into
//! bus-sized segments, and answered by a newline-terminated JSON reply that
//! is polled back in chunks. One handle owns one physical bus and allows one
//! request in flight at a time.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod application;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod hal;
pub mod protocol;
pub mod testing;

pub use config::LinkConfig;
pub use diagnostics::{LinkStats, PeripheralError, PeripheralErrorKind, Restart};
pub use drivers::{AttnSignal, Notecard, Outcome, State};
pub use hal::{Bus, BusFault, Clock, HalBus};
pub use protocol::{ErrorKind, LinkError, Request, Response, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
