//! Recording I/O target for unit and integration tests.
//!
//! # Why a recording target?
//!
//! A real lower driver completes requests asynchronously, sometimes much
//! later.  [`RecordingIoTarget`] reproduces that: every forwarded request is
//! parked in arrival order together with its completion routine (if any), and
//! the test decides when and how each one completes via
//! [`ForwardedRequest::finish`].
//!
//! Set a failure status with [`RecordingIoTarget::failing`] to make every
//! submission fail synchronously instead.

use std::sync::{Mutex, PoisonError};

use xusb_core::{IoControlCode, NtStatus};

use crate::application::forward::{CompletionParams, CompletionRoutine, IoTarget, SendFailure};
use crate::application::request::{IoRequest, RequestId};

/// A request parked in a [`RecordingIoTarget`].
pub struct ForwardedRequest {
    request: IoRequest,
    routine: Option<CompletionRoutine>,
}

impl ForwardedRequest {
    pub fn request(&self) -> &IoRequest {
        &self.request
    }

    /// Mutable access, e.g. to fill an IN transfer before finishing it.
    pub fn request_mut(&mut self) -> &mut IoRequest {
        &mut self.request
    }

    /// `true` if the request was sent with a completion routine.
    pub fn has_routine(&self) -> bool {
        self.routine.is_some()
    }

    /// Finishes the request as the target would: through its completion
    /// routine if one was attached, otherwise by completing it directly.
    pub fn finish(self, status: NtStatus, information: usize) {
        match self.routine {
            Some(routine) => routine(self.request, CompletionParams { status, information }),
            None => self.request.complete_with_information(status, information),
        }
    }
}

/// An `IoTarget` that parks every request it receives.
#[derive(Default)]
pub struct RecordingIoTarget {
    forwarded: Mutex<Vec<ForwardedRequest>>,
    fail_with: Option<NtStatus>,
}

impl RecordingIoTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// A target whose every submission fails synchronously with `status`.
    pub fn failing(status: NtStatus) -> Self {
        Self {
            forwarded: Mutex::new(Vec::new()),
            fail_with: Some(status),
        }
    }

    pub fn forwarded_count(&self) -> usize {
        self.forwarded.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Ids of parked requests, in arrival order.
    pub fn forwarded_ids(&self) -> Vec<RequestId> {
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|f| f.request.id())
            .collect()
    }

    /// Control codes of parked requests, in arrival order.
    pub fn forwarded_codes(&self) -> Vec<IoControlCode> {
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|f| f.request.control_code())
            .collect()
    }

    /// Removes and returns the oldest parked request.
    pub fn take_next(&self) -> Option<ForwardedRequest> {
        let mut guard = self.forwarded.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_empty() {
            None
        } else {
            Some(guard.remove(0))
        }
    }

    /// Removes and returns all parked requests, in arrival order.
    pub fn take_all(&self) -> Vec<ForwardedRequest> {
        std::mem::take(&mut *self.forwarded.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn park(&self, request: IoRequest, routine: Option<CompletionRoutine>) -> Result<(), SendFailure> {
        if let Some(status) = self.fail_with {
            return Err(SendFailure::new(request, status));
        }
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ForwardedRequest { request, routine });
        Ok(())
    }
}

impl IoTarget for RecordingIoTarget {
    fn send_and_forget(&self, request: IoRequest) -> Result<(), SendFailure> {
        self.park(request, None)
    }

    fn send_with_completion(
        &self,
        request: IoRequest,
        routine: CompletionRoutine,
    ) -> Result<(), SendFailure> {
        self.park(request, Some(routine))
    }
}
