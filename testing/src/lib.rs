//! Shared test helpers for the configuration workspace.
//!
//! - [`JsonCodec`]: a JSON encoder/decoder so manager tests can read and
//!   write real files
//! - [`ScriptedStrategy`]: a reloading strategy whose answers are scripted
//!   and whose calls are recorded
//! - File fixtures for writing configuration into temp directories

mod fixtures;
mod json;
mod strategy;

pub use fixtures::*;
pub use json::JsonCodec;
pub use strategy::{ScriptedStrategy, StrategyCall, StrategyProbe};
