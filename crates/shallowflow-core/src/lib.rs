//! Core types, config, errors, and wire protocol for ShallowFlow.

pub mod config;
pub mod error;
pub mod execution;
pub mod fetch;
pub mod logging;
pub mod protocol;

pub use error::{Result, ShallowFlowError};
