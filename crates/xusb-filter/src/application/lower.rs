//! Lower Dispatcher and Transfer Completion Classifier: the device-facing layer.
//!
//! The lower filter sits directly above the USB bus and only inspects
//! `SUBMIT_TRANSFER` requests.  When the function driver submits an
//! interrupt-IN read on the input pipe, a new polling cycle has begun:
//!
//! 1. The gate is opened (held wait-for-input requests are released).
//! 2. The transfer is forwarded with [`LowerDispatcher::on_transfer_complete`]
//!    attached.
//! 3. When the bus completes it, the payload is classified.  A genuine state
//!    report closes the gate; anything else, including a failed transfer,
//!    leaves the gate as it is.
//! 4. The transfer request is completed with the bus's status and length,
//!    untouched by the classification.

use std::sync::{Arc, OnceLock};

use tracing::info;
use uuid::Uuid;
use xusb_core::{
    classify_report, is_input_poll, ControlCodeKind, PipeHandle, ReportClass, ReportRules,
};

use super::forward::{pass_through, pass_through_with_completion, CompletionParams, IoTarget};
use super::gate::{GateControl, GateError, GateState};
use super::request::IoRequest;
use crate::infrastructure::diagnostics::Diagnostics;

/// Routes device-bound requests for one lower filter device.
pub struct LowerDispatcher {
    device_id: Uuid,
    target: Arc<dyn IoTarget>,
    gate: OnceLock<GateControl>,
    input_pipe: PipeHandle,
    rules: ReportRules,
    diagnostics: Diagnostics,
}

impl LowerDispatcher {
    pub fn new(
        device_id: Uuid,
        target: Arc<dyn IoTarget>,
        input_pipe: PipeHandle,
        rules: ReportRules,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            device_id,
            target,
            gate: OnceLock::new(),
            input_pipe,
            rules,
            diagnostics,
        }
    }

    /// Hands this layer its control handle on the pair's gate.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::AlreadyPaired`] if a gate is already attached.
    pub fn attach_gate(&self, control: GateControl) -> Result<(), GateError> {
        self.gate
            .set(control)
            .map_err(|_| GateError::AlreadyPaired(self.device_id))
    }

    pub fn gate(&self) -> Option<&GateControl> {
        self.gate.get()
    }

    pub fn gate_state(&self) -> Option<GateState> {
        self.gate().map(GateControl::state)
    }

    /// Routes one internal device-control request.
    pub fn dispatch(self: &Arc<Self>, request: IoRequest) {
        info!(
            device = %self.device_id,
            request = %request.id(),
            ioctl = %request.control_code(),
            "lower internal device control"
        );

        let is_poll = request.control_code().kind() == ControlCodeKind::SubmitTransfer
            && request
                .urb()
                .is_some_and(|urb| is_input_poll(urb, self.input_pipe));

        if !is_poll {
            pass_through(request, self.target.as_ref());
            return;
        }

        match self.gate() {
            Some(gate) => {
                info!(request = %request.id(), gate = %gate.id(), "starting input gate");
                gate.open();
            }
            None => info!(request = %request.id(), "input poll without a paired gate"),
        }

        let this = Arc::clone(self);
        pass_through_with_completion(
            request,
            self.target.as_ref(),
            Box::new(move |request, params| this.on_transfer_complete(request, params)),
        );
    }

    /// Classifies a completed input-poll transfer, updates the gate, and
    /// completes the transfer with the bus's own status and length.
    pub fn on_transfer_complete(&self, request: IoRequest, params: CompletionParams) {
        info!(
            request = %request.id(),
            status = %params.status,
            information = params.information,
            "input transfer completed"
        );

        if params.status.is_success() {
            self.classify(&request);
        } else {
            info!(request = %request.id(), "skipped stopping input gate");
        }

        request.complete_with_information(params.status, params.information);
    }

    fn classify(&self, request: &IoRequest) {
        let Some(transfer) = request.urb().and_then(|urb| urb.as_bulk_or_interrupt()) else {
            return;
        };
        let report = transfer.report();
        self.diagnostics.dump("OUTPUT", request, report.bytes);

        match classify_report(&report, &self.rules) {
            ReportClass::GenuineState => {
                info!(request = %request.id(), "stopping input gate");
                if let Some(gate) = self.gate() {
                    gate.close();
                }
            }
            ReportClass::NotAState => {
                info!(
                    request = %request.id(),
                    len = report.len(),
                    first_byte = format_args!("{:02X}", report.first_byte().unwrap_or(0xFF)),
                    "unexpected transfer data"
                );
            }
        }
    }
}
