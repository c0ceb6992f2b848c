//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the
//! platform-appropriate directory and falls back to defaults when the file
//! does not exist yet.

pub mod config;
