//! Pass-through forwarding to the next-lower layer.
//!
//! Each filter layer sits on top of an [`IoTarget`]: the driver below it in
//! the stack.  A request is handed to the target in one of two ways:
//!
//! - **Fire-and-forget** ([`pass_through`]) – the target completes the
//!   request directly; this layer never sees it again.
//! - **With a completion routine** ([`pass_through_with_completion`]) – the
//!   target hands the request back to the routine when it finishes, and the
//!   routine is responsible for completing it.
//!
//! Either way, if the target refuses the submission synchronously it returns
//! the request inside a [`SendFailure`], and the request is completed here
//! with the target's reported status.  There are no retries.

use tracing::error;
use xusb_core::NtStatus;

use super::request::IoRequest;

/// Status and byte count reported by a target when it finishes a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionParams {
    pub status: NtStatus,
    pub information: usize,
}

/// Single-shot continuation invoked when a target finishes a request.
pub type CompletionRoutine = Box<dyn FnOnce(IoRequest, CompletionParams) + Send + 'static>;

/// A synchronous submission failure.  Ownership of the request returns to the caller.
#[derive(Debug)]
pub struct SendFailure {
    pub request: IoRequest,
    pub status: NtStatus,
}

impl SendFailure {
    pub fn new(request: IoRequest, status: NtStatus) -> Self {
        Self { request, status }
    }
}

/// The next-lower layer of the driver stack.
#[cfg_attr(test, mockall::automock)]
pub trait IoTarget: Send + Sync {
    /// Hands `request` to the target, which will complete it.
    fn send_and_forget(&self, request: IoRequest) -> Result<(), SendFailure>;

    /// Hands `request` to the target, which will invoke `routine` exactly once
    /// when it finishes instead of completing the request itself.
    fn send_with_completion(
        &self,
        request: IoRequest,
        routine: CompletionRoutine,
    ) -> Result<(), SendFailure>;
}

/// Forwards `request` fire-and-forget.
pub fn pass_through(request: IoRequest, target: &dyn IoTarget) {
    if let Err(SendFailure { request, status }) = target.send_and_forget(request) {
        error!(request = %request.id(), %status, "send to lower target failed");
        request.complete(status);
    }
}

/// Forwards `request` with `routine` attached to its completion.
pub fn pass_through_with_completion(
    request: IoRequest,
    target: &dyn IoTarget,
    routine: CompletionRoutine,
) {
    if let Err(SendFailure { request, status }) = target.send_with_completion(request, routine) {
        error!(request = %request.id(), %status, "send to lower target failed");
        request.complete(status);
    }
}
