//! Hacx Common - shared configuration, errors and logging for the relay bot.
//!
//! This crate provides:
//! - Configuration types, the static provider table and environment loading
//! - Configuration validation
//! - Error types and context helpers
//! - Logging setup
//! - Text utilities used when logging and relaying

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{Config, ProviderEndpoint, ProviderPreset, PROVIDERS};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};

