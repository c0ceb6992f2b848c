//! # xusb-core
//!
//! Shared library for the XUSB input-timing filter containing the control
//! codes, the device-bound transfer block, and the pure decision rules the
//! filter layers apply to them.
//!
//! It has zero dependencies on OS APIs, async runtimes, or I/O.
//!
//! # Architecture overview (for beginners)
//!
//! A game-controller driver stack looks like this:
//!
//! ```text
//! client (game)          -- WAIT_FOR_INPUT, LEGACY_GET_STATE, ...
//!   upper filter         -- holds WAIT_FOR_INPUT until a new report exists
//!   function driver      -- turns USB reports into controller state
//!   lower filter         -- watches the interrupt-IN transfers
//!   USB bus              -- the real (or virtual) device
//! ```
//!
//! The function driver answers "wait for input" as soon as it sees the
//! request, even when the device has not produced a new report yet, so the
//! client receives stale data.  The two filter layers (in `xusb-filter`)
//! fix this by gating those requests on real transfer completions.
//!
//! This crate defines:
//!
//! - **`protocol`** – The vocabulary exchanged between layers: completion
//!   status codes, control codes, and the USB transfer block.
//!
//! - **`domain`** – The decisions: is this transfer a poll of the input
//!   endpoint, is this completed payload a genuine state report, and is this
//!   legacy payload well formed.
//!
//! - **`diagnostics`** – Hex-dump formatting for debug logging.

pub mod diagnostics;
pub mod domain;
pub mod protocol;

pub use diagnostics::hex::format_hex;
pub use domain::classify::{classify_report, ReportClass, ReportRules};
pub use domain::intercept::is_input_poll;
pub use domain::legacy::{check_legacy_payload, LegacyCheck, LegacyRejection};
pub use protocol::control_code::{ControlCodeKind, IoControlCode};
pub use protocol::status::NtStatus;
pub use protocol::transfer::{
    BulkOrInterruptTransfer, PipeHandle, TransferFlags, TransferReport, Urb,
    DEFAULT_INPUT_PIPE_HANDLE,
};
