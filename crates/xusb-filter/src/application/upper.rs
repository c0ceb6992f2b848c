//! Upper Dispatcher: the client-facing filter layer.
//!
//! Every client device-control request is routed by control code:
//!
//! | Code               | Gate present            | No gate (legacy mode)          |
//! |--------------------|-------------------------|--------------------------------|
//! | `WAIT_FOR_INPUT`   | enqueued into the gate  | pass-through                   |
//! | `LEGACY_GET_STATE` | pass-through            | payload checked, then forwarded|
//! | anything else      | pass-through            | pass-through                   |

use std::sync::Arc;

use tracing::{error, info};
use xusb_core::{check_legacy_payload, ControlCodeKind, IoControlCode, LegacyCheck, NtStatus};

use super::forward::{pass_through, pass_through_with_completion, IoTarget};
use super::gate::{EnqueueFailure, GateDispatch, GateEntry, GateState};
use super::request::IoRequest;
use crate::infrastructure::diagnostics::Diagnostics;

/// Forwards wait-for-input requests released by the gate.
pub struct WaitForInputDispatch {
    target: Arc<dyn IoTarget>,
    diagnostics: Diagnostics,
}

impl WaitForInputDispatch {
    pub fn new(target: Arc<dyn IoTarget>, diagnostics: Diagnostics) -> Self {
        Self { target, diagnostics }
    }
}

impl GateDispatch for WaitForInputDispatch {
    fn dispatch(&self, request: IoRequest) {
        info!(
            request = %request.id(),
            ioctl = %request.control_code(),
            "releasing wait-for-input"
        );

        if request.control_code() != IoControlCode::WAIT_FOR_INPUT {
            error!(request = %request.id(), ioctl = %request.control_code(), "invalid control code in input gate");
            request.complete(NtStatus::INVALID_PARAMETER_5);
            return;
        }

        if self.diagnostics.completion_logging() {
            let diagnostics = self.diagnostics;
            pass_through_with_completion(
                request,
                self.target.as_ref(),
                Box::new(move |request, params| {
                    diagnostics.log_completion(&request, &params);
                    request.complete_with_information(params.status, params.information);
                }),
            );
        } else {
            pass_through(request, self.target.as_ref());
        }
    }
}

/// Routes client requests for one upper filter device.
pub struct UpperDispatcher {
    target: Arc<dyn IoTarget>,
    gate: Option<GateEntry>,
    diagnostics: Diagnostics,
}

impl UpperDispatcher {
    /// `gate` is `None` in legacy mode.
    pub fn new(target: Arc<dyn IoTarget>, gate: Option<GateEntry>, diagnostics: Diagnostics) -> Self {
        Self {
            target,
            gate,
            diagnostics,
        }
    }

    pub fn gate(&self) -> Option<&GateEntry> {
        self.gate.as_ref()
    }

    pub fn gate_state(&self) -> Option<GateState> {
        self.gate.as_ref().map(GateEntry::state)
    }

    /// Routes one client device-control request.
    pub fn dispatch(&self, request: IoRequest) {
        info!(
            request = %request.id(),
            ioctl = %request.control_code(),
            input_len = request.input().len(),
            output_len = request.output_len(),
            "upper device control"
        );
        self.diagnostics.dump("INPUT", &request, request.input());

        let kind = request.control_code().kind();
        match &self.gate {
            Some(gate) if kind == ControlCodeKind::WaitForInput => {
                info!(request = %request.id(), gate = %gate.id(), "forwarding to input gate");
                if let Err(EnqueueFailure { request, status }) = gate.enqueue(request) {
                    error!(request = %request.id(), %status, "enqueue into input gate failed");
                    request.complete(status);
                }
                return;
            }
            None if kind == ControlCodeKind::LegacyGetState => {
                if let LegacyCheck::Rejected(reason) = check_legacy_payload(request.input()) {
                    info!(request = %request.id(), %reason, "completing legacy request with invalid status");
                    request.complete(NtStatus::INVALID_PARAMETER);
                    return;
                }
            }
            _ => {}
        }

        pass_through(request, self.target.as_ref());
    }
}
