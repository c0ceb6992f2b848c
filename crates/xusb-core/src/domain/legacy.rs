//! Structural check of the legacy get-state payload.
//!
//! Older function drivers poll with `LEGACY_GET_STATE` and a 2-byte input
//! buffer: byte 0 selects the controller slot (`0` or `1`), byte 1 is the
//! protocol version and must be `1`.  When no gate is available the upper
//! filter rejects malformed payloads instead of forwarding them.

use thiserror::Error;

/// Why a legacy payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LegacyRejection {
    #[error("slot byte {0:#04x} is greater than 1")]
    SlotOutOfRange(u8),
    #[error("version byte {0:#04x} is not 1")]
    UnsupportedVersion(u8),
}

/// Outcome of [`check_legacy_payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCheck {
    /// Payload is well formed.
    Accepted,
    /// Payload is shorter than 2 bytes and is not validated.
    NotValidated,
    /// Payload is malformed and must be completed with an invalid-parameter status.
    Rejected(LegacyRejection),
}

/// Checks a legacy get-state input buffer.
pub fn check_legacy_payload(payload: &[u8]) -> LegacyCheck {
    let [slot, version, ..] = payload else {
        return LegacyCheck::NotValidated;
    };

    if *slot > 1 {
        LegacyCheck::Rejected(LegacyRejection::SlotOutOfRange(*slot))
    } else if *version != 1 {
        LegacyCheck::Rejected(LegacyRejection::UnsupportedVersion(*version))
    } else {
        LegacyCheck::Accepted
    }
}
