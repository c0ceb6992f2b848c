//! Concrete `IoTarget` implementations.
//!
//! - **`recording`** – Keeps every forwarded request so tests can inspect it
//!   and complete it later, like a lower driver that pends its I/O.
//! - **`simulated`** – A simulated USB bus and controller function driver,
//!   driven by Tokio timers.

pub mod recording;
pub mod simulated;
