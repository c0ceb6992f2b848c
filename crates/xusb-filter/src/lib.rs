//! xusb-filter library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does xusb-filter do? (for beginners)
//!
//! A controller's function driver answers a client's "wait for input"
//! request as soon as it sees it, even if the device has not sent a new
//! report since the last answer.  The client then reads the same sample twice
//! and its frame timing drifts.
//!
//! This crate provides a filter that is installed twice in the driver stack:
//!
//! 1. The **lower** instance watches the USB interrupt-IN traffic.  When the
//!    function driver asks the device for a report, the gate opens; when a
//!    genuine state report comes back, the gate closes.
//! 2. The **upper** instance routes every "wait for input" request through
//!    the gate, so requests that arrive between a delivered report and the
//!    next poll are held until the function driver is actually waiting on
//!    the device again.

/// Application layer: dispatchers, gate, and device contexts.
pub mod application;

/// Infrastructure layer: configuration, diagnostics, and I/O targets.
pub mod infrastructure;
