//! Request completion status codes.
//!
//! # How is success encoded? (for beginners)
//!
//! Every request in the driver stack is completed with a 32-bit status.  The
//! two top bits carry the *severity*: `00` success, `01` informational,
//! `10` warning, `11` error.  A status counts as "successful" when the
//! value, read as a signed 32-bit integer, is not negative; i.e. when the
//! topmost bit is clear.  Informational codes are therefore successes too,
//! while warnings and errors are failures.

use std::fmt;

/// A 32-bit request completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    pub const UNSUCCESSFUL: NtStatus = NtStatus(0xC000_0001);
    /// Returned for a legacy get-state payload that fails its structural check.
    pub const INVALID_PARAMETER: NtStatus = NtStatus(0xC000_000D);
    /// Returned when the gate's dispatch callback receives a control code it does not own.
    pub const INVALID_PARAMETER_5: NtStatus = NtStatus(0xC000_00F3);
    pub const CANCELLED: NtStatus = NtStatus(0xC000_0120);
    pub const INVALID_DEVICE_STATE: NtStatus = NtStatus(0xC000_0184);
    pub const DEVICE_NOT_CONNECTED: NtStatus = NtStatus(0xC000_009D);

    /// Returns `true` when the severity bits mark this status as a success
    /// or informational code.
    pub fn is_success(self) -> bool {
        (self.0 as i32) >= 0
    }
}

impl Default for NtStatus {
    fn default() -> Self {
        NtStatus::SUCCESS
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
