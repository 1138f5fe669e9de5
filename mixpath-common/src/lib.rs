//! # mixpath Common Library
//!
//! Shared code for the mixpath engine and its front ends including:
//! - Error types
//! - Configuration loading (TOML bootstrap + search settings)
//! - Search progress events and the EventBus
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
