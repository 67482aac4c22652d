//! Data-driven configuration.
//!
//! Pure data structures that describe agent kinds and simulation tuning.
//! All of them deserialize from RON strings.
//!
//! **Note:** This module contains no IO - it only parses strings.
//! File loading is handled by `skirmish_headless`.

mod config;
mod kinds;

pub use config::SimConfig;
pub use kinds::{KindProfile, KindTable};
