//! Classification of completed interrupt-IN transfers.
//!
//! The controller reports its state in a 20-byte message whose first byte is
//! the message type (`0x00` = input state) and whose last 6 bytes are unused.
//! Some virtual bus drivers send only the first 14 bytes, so a transfer of at
//! least 14 bytes starting with `0x00` is taken as a genuine state report.
//!
//! This is a structural heuristic tied to one report format: any transport
//! whose idle or keep-alive packets share the leading byte and length is
//! misclassified as fresh input.  [`ReportRules`] makes both values
//! configurable for that reason.

use crate::protocol::transfer::TransferReport;

/// Minimum length of a state report observed on a real transfer.
pub const MIN_STATE_REPORT_LEN: usize = 14;

/// Full length of a state report, including the 6 trailing unused bytes.
pub const FULL_STATE_REPORT_LEN: usize = 20;

/// Message-type byte of an input state report.
pub const STATE_REPORT_MARKER: u8 = 0x00;

/// The structural rules a payload must meet to count as a state report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRules {
    pub min_len: usize,
    pub marker: u8,
}

impl Default for ReportRules {
    fn default() -> Self {
        Self {
            min_len: MIN_STATE_REPORT_LEN,
            marker: STATE_REPORT_MARKER,
        }
    }
}

/// Verdict on a successfully completed transfer's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportClass {
    /// A genuine new input-state report.
    GenuineState,
    /// Anything else (LED/rumble acks, headset data, short packets).
    NotAState,
}

/// Classifies the payload of a transfer that completed successfully.
///
/// Failed completions must not reach this function; they are inconclusive
/// and are handled by the caller.
pub fn classify_report(report: &TransferReport<'_>, rules: &ReportRules) -> ReportClass {
    if report.len() >= rules.min_len && report.first_byte() == Some(rules.marker) {
        ReportClass::GenuineState
    } else {
        ReportClass::NotAState
    }
}
