//! Hex-dump formatting for diagnostic log lines.

use std::fmt::Write;

/// Largest number of bytes rendered by [`format_hex`].
///
/// Each byte takes three characters (`"XX "`), and dumps are sized to fit
/// a 256-byte log buffer including its terminator.
pub const HEX_DUMP_MAX_BYTES: usize = 85;

/// Formats `data` as upper-case hex pairs, each followed by a space.
///
/// Input longer than [`HEX_DUMP_MAX_BYTES`] is truncated.
pub fn format_hex(data: &[u8]) -> String {
    let shown = &data[..data.len().min(HEX_DUMP_MAX_BYTES)];
    let mut out = String::with_capacity(shown.len() * 3);
    for byte in shown {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02X} ");
    }
    out
}
