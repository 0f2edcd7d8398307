//! Core engine of the channel comment bot.
//!
//! Framework-agnostic: the Telegram client and the text-generation endpoint
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod generation;
pub mod logging;
pub mod platform;
pub mod resolver;
pub mod session_config;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
