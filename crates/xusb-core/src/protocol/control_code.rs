//! Control codes exchanged at the filter boundary.
//!
//! A control code is an opaque 32-bit request identifier.  Only three of them
//! mean anything to the filter; every other code is forwarded untouched.
//!
//! | Code         | Constant                               | Seen by     |
//! |--------------|----------------------------------------|-------------|
//! | `0x8000E3AC` | [`IoControlCode::WAIT_FOR_INPUT`]      | upper layer |
//! | `0x8000E004` | [`IoControlCode::LEGACY_GET_STATE`]    | upper layer |
//! | `0x00220003` | [`IoControlCode::SUBMIT_TRANSFER`]     | lower layer |

use std::fmt;

/// A 32-bit I/O control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoControlCode(pub u32);

/// The classification of an [`IoControlCode`] the filter layers route on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCodeKind {
    /// Block until the controller produces its next input sample.
    WaitForInput,
    /// Legacy polling request; carries a 2-byte payload.
    LegacyGetState,
    /// Device-bound USB transfer submission.
    SubmitTransfer,
    /// Anything else; forwarded without inspection.
    Opaque,
}

impl IoControlCode {
    pub const WAIT_FOR_INPUT: IoControlCode = IoControlCode(0x8000_E3AC);
    pub const LEGACY_GET_STATE: IoControlCode = IoControlCode(0x8000_E004);
    pub const SUBMIT_TRANSFER: IoControlCode = IoControlCode(0x0022_0003);

    /// Classifies this code.
    pub fn kind(self) -> ControlCodeKind {
        match self {
            Self::WAIT_FOR_INPUT => ControlCodeKind::WaitForInput,
            Self::LEGACY_GET_STATE => ControlCodeKind::LegacyGetState,
            Self::SUBMIT_TRANSFER => ControlCodeKind::SubmitTransfer,
            _ => ControlCodeKind::Opaque,
        }
    }
}

impl fmt::Display for IoControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
