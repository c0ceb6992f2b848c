//! Filter device contexts: role, pairing, and queue entry points.
//!
//! The same filter is installed twice on a controller's device stack:
//!
//! - as a **lower** filter, right above the USB bus, and
//! - as an **upper** filter, right below the client.
//!
//! The lower device is created first.  When the upper device is created with
//! a link to it, the upper device creates the pair's [`InputGate`] and hands
//! the control half to the lower device.  If anything goes wrong the upper
//! device logs the failure and keeps running without a gate (legacy mode).

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;
use xusb_core::{PipeHandle, ReportRules, DEFAULT_INPUT_PIPE_HANDLE};

use super::forward::{pass_through, IoTarget};
use super::gate::{GateEntry, GateError, GateState, InputGate};
use super::lower::LowerDispatcher;
use super::request::IoRequest;
use super::upper::{UpperDispatcher, WaitForInputDispatch};
use crate::infrastructure::diagnostics::Diagnostics;

/// Position of a filter device in the stack.  Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    Upper,
    Lower,
}

/// Per-device settings derived from the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    pub input_pipe: PipeHandle,
    pub report_rules: ReportRules,
    pub diagnostics: Diagnostics,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            input_pipe: DEFAULT_INPUT_PIPE_HANDLE,
            report_rules: ReportRules::default(),
            diagnostics: Diagnostics::default(),
        }
    }
}

enum Layer {
    Upper {
        dispatcher: UpperDispatcher,
        paired_lower: Option<Uuid>,
    },
    Lower(Arc<LowerDispatcher>),
}

/// One filter device instance.
pub struct FilterDevice {
    id: Uuid,
    target: Arc<dyn IoTarget>,
    layer: Layer,
}

impl FilterDevice {
    /// Creates a lower filter device above `target` (the bus).
    pub fn create_lower(target: Arc<dyn IoTarget>, settings: &DeviceSettings) -> Self {
        let id = Uuid::new_v4();
        let dispatcher = Arc::new(LowerDispatcher::new(
            id,
            Arc::clone(&target),
            settings.input_pipe,
            settings.report_rules,
            settings.diagnostics,
        ));
        info!(device = %id, input_pipe = %settings.input_pipe, "created lower filter device");
        Self {
            id,
            target,
            layer: Layer::Lower(dispatcher),
        }
    }

    /// Creates an upper filter device above `target` (the function driver).
    ///
    /// With a `lower` link, an input gate is created and shared with it.
    /// Gate creation failure is logged and the device runs in legacy mode.
    pub fn create_upper(
        target: Arc<dyn IoTarget>,
        lower: Option<&FilterDevice>,
        settings: &DeviceSettings,
    ) -> Self {
        let id = Uuid::new_v4();

        let gate = lower.and_then(|lower| match pair_with(lower, &target, settings) {
            Ok(entry) => {
                info!(device = %id, lower = %lower.id, gate = %entry.id(), "paired with lower filter");
                Some(entry)
            }
            Err(e) => {
                error!(device = %id, "input gate creation failed: {e}; continuing without gate");
                None
            }
        });

        info!(device = %id, gated = gate.is_some(), "created upper filter device");
        let paired_lower = gate.as_ref().and(lower.map(|l| l.id));
        Self {
            id,
            target: Arc::clone(&target),
            layer: Layer::Upper {
                dispatcher: UpperDispatcher::new(target, gate, settings.diagnostics),
                paired_lower,
            },
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> LayerRole {
        match self.layer {
            Layer::Upper { .. } => LayerRole::Upper,
            Layer::Lower(_) => LayerRole::Lower,
        }
    }

    /// The lower device this upper device shares a gate with.
    pub fn paired_lower(&self) -> Option<Uuid> {
        match &self.layer {
            Layer::Upper { paired_lower, .. } => *paired_lower,
            Layer::Lower(_) => None,
        }
    }

    pub fn has_gate(&self) -> bool {
        self.gate_state().is_some()
    }

    pub fn gate_state(&self) -> Option<GateState> {
        match &self.layer {
            Layer::Upper { dispatcher, .. } => dispatcher.gate_state(),
            Layer::Lower(dispatcher) => dispatcher.gate_state(),
        }
    }

    /// Number of requests held in this device's gate.
    pub fn held_len(&self) -> usize {
        match &self.layer {
            Layer::Upper { dispatcher, .. } => dispatcher.gate().map_or(0, GateEntry::held_len),
            Layer::Lower(_) => 0,
        }
    }

    /// Entry point for client device-control requests.
    ///
    /// Only the upper device routes these; a lower device forwards them.
    pub fn dispatch_device_control(&self, request: IoRequest) {
        match &self.layer {
            Layer::Upper { dispatcher, .. } => dispatcher.dispatch(request),
            Layer::Lower(_) => pass_through(request, self.target.as_ref()),
        }
    }

    /// Entry point for device-bound internal device-control requests.
    ///
    /// Only the lower device routes these; an upper device forwards them.
    pub fn dispatch_internal_device_control(&self, request: IoRequest) {
        match &self.layer {
            Layer::Lower(dispatcher) => dispatcher.dispatch(request),
            Layer::Upper { .. } => pass_through(request, self.target.as_ref()),
        }
    }
}

impl Drop for FilterDevice {
    fn drop(&mut self) {
        if let Layer::Upper { dispatcher, .. } = &self.layer {
            if let Some(gate) = dispatcher.gate() {
                gate.purge();
            }
        }
        info!(device = %self.id, role = ?self.role(), "filter device torn down");
    }
}

fn pair_with(
    lower: &FilterDevice,
    target: &Arc<dyn IoTarget>,
    settings: &DeviceSettings,
) -> Result<GateEntry, GateError> {
    let Layer::Lower(lower_dispatcher) = &lower.layer else {
        return Err(GateError::NotLowerLayer(lower.id));
    };
    if lower_dispatcher.gate().is_some() {
        return Err(GateError::AlreadyPaired(lower.id));
    }

    let dispatch = Arc::new(WaitForInputDispatch::new(Arc::clone(target), settings.diagnostics));
    let (entry, control) = InputGate::create(dispatch);
    lower_dispatcher.attach_gate(control)?;
    Ok(entry)
}
