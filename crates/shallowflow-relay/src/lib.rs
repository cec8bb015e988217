//! Worker relay.
//!
//! The relay owns one embedded interpreter [`Runtime`], brings it up with
//! [`Relay::initialize`], and then serves page [`Command`]s strictly one at a
//! time. Interpreter-originated patches are pushed through a [`PatchSink`]
//! and reach the page without going through the command queue.
//!
//! [`Command`]: shallowflow_core::protocol::Command

pub mod location;
pub mod relay;
pub mod runtime;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;

pub use relay::{Relay, RelayHandle, RelaySetup, spawn};
pub use runtime::{PatchSink, Runtime};
