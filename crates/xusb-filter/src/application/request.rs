//! I/O requests flowing through the filter layers.
//!
//! # Ownership model (for beginners)
//!
//! In the driver stack a request is *owned* by exactly one layer at a time:
//! the layer that currently holds it must either complete it or hand it to
//! the next layer.  Rust's move semantics express this directly:
//!
//! - [`IoRequest`] is not `Clone`.  Handing it to a target moves it.
//! - [`IoRequest::complete`] takes `self` by value, so a request cannot be
//!   completed twice or used after completion.
//!
//! The originator keeps a [`PendingRequest`] (the receiving half of a
//! `tokio::sync::oneshot` channel) and awaits the [`RequestCompletion`].

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use xusb_core::{IoControlCode, NtStatus, Urb};

/// Identifies a request in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    fn next() -> Self {
        // Ids only correlate log lines; Relaxed is enough.
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What the originator receives when its request completes.
#[derive(Debug)]
pub struct RequestCompletion {
    pub status: NtStatus,
    /// Bytes transferred (for device-control requests, bytes written to `output`).
    pub information: usize,
    pub output: Vec<u8>,
    /// The transfer block, returned to the originator that owns its memory.
    pub urb: Option<Urb>,
}

/// The originator's handle on an in-flight request.
pub type PendingRequest = oneshot::Receiver<RequestCompletion>;

/// A request travelling down the stack.
#[derive(Debug)]
pub struct IoRequest {
    id: RequestId,
    control_code: IoControlCode,
    input: Vec<u8>,
    output: Vec<u8>,
    urb: Option<Urb>,
    completer: oneshot::Sender<RequestCompletion>,
}

impl IoRequest {
    /// Creates a client-facing device-control request with an `output_len`-byte
    /// zeroed output buffer.
    pub fn device_control(
        control_code: IoControlCode,
        input: Vec<u8>,
        output_len: usize,
    ) -> (Self, PendingRequest) {
        Self::build(control_code, input, vec![0; output_len], None)
    }

    /// Creates a device-bound internal request carrying a transfer block.
    pub fn internal_device_control(control_code: IoControlCode, urb: Urb) -> (Self, PendingRequest) {
        Self::build(control_code, Vec::new(), Vec::new(), Some(urb))
    }

    fn build(
        control_code: IoControlCode,
        input: Vec<u8>,
        output: Vec<u8>,
        urb: Option<Urb>,
    ) -> (Self, PendingRequest) {
        let (completer, pending) = oneshot::channel();
        let request = Self {
            id: RequestId::next(),
            control_code,
            input,
            output,
            urb,
            completer,
        };
        (request, pending)
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn control_code(&self) -> IoControlCode {
        self.control_code
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    pub fn output_mut(&mut self) -> &mut [u8] {
        &mut self.output
    }

    pub fn urb(&self) -> Option<&Urb> {
        self.urb.as_ref()
    }

    pub fn urb_mut(&mut self) -> Option<&mut Urb> {
        self.urb.as_mut()
    }

    /// Completes the request with no bytes transferred.
    pub fn complete(self, status: NtStatus) {
        self.complete_with_information(status, 0);
    }

    /// Completes the request, handing the output buffer and transfer block
    /// back to the originator.
    pub fn complete_with_information(self, status: NtStatus, information: usize) {
        let completion = RequestCompletion {
            status,
            information,
            output: self.output,
            urb: self.urb,
        };
        // An originator that stopped listening is not an error here.
        let _ = self.completer.send(completion);
    }
}
