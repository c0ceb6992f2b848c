//! Recognition of input polling submissions.

use crate::protocol::transfer::{PipeHandle, Urb};

/// Returns `true` when `urb` is a bulk/interrupt IN transfer on `input_pipe`.
///
/// The function driver keeps exactly one such transfer outstanding at a
/// time, so seeing one submitted means the previous report has been
/// consumed and a new polling cycle has started.
pub fn is_input_poll(urb: &Urb, input_pipe: PipeHandle) -> bool {
    match urb.as_bulk_or_interrupt() {
        Some(t) => t.transfer_flags.is_in() && t.pipe_handle == input_pipe,
        None => false,
    }
}
