//! Formatting helpers for debug-only diagnostics.

pub mod hex;
