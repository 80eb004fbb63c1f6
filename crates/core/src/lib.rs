// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sdpc-core: shared types for the SDP control client — the `Client` context,
//! its configuration, policy timers, and the error taxonomy every other
//! crate composes into via `?`.

pub mod bytes;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod permissions;

pub use client::{Client, ClientState, ConnState};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::CoreError;

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
