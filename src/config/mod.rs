//! Service Configuration Module
//!
//! Detector tuning, data locations and server settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `HARVEST_CONFIG` environment variable (path to TOML file)
//! 2. `harvest.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded `HarvestConfig` is built once in `main` and shared by `Arc`.

mod harvest_config;
pub mod validation;

pub use harvest_config::*;
