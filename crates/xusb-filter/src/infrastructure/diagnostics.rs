//! Optional diagnostics: payload hex dumps and completion logging.
//!
//! Diagnostics only observe.  They are toggled independently from the
//! config file, write to the `tracing` sink, and never influence gate
//! transitions or completion status.  With both switches off the filter
//! behaves identically, just more quietly.

use serde::{Deserialize, Serialize};
use tracing::info;
use xusb_core::format_hex;

use crate::application::forward::CompletionParams;
use crate::application::request::IoRequest;

/// `[diagnostics]` section of the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Log a hex dump of client input buffers and completed transfer payloads.
    #[serde(default)]
    pub hex_dump: bool,
    /// Attach a logging completion routine to gated wait-for-input requests.
    #[serde(default)]
    pub completion_logging: bool,
}

/// The diagnostics capability handed to each filter layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    config: DiagnosticsConfig,
}

impl Diagnostics {
    pub fn new(config: DiagnosticsConfig) -> Self {
        Self { config }
    }

    /// Both switches on.
    pub fn verbose() -> Self {
        Self::new(DiagnosticsConfig {
            hex_dump: true,
            completion_logging: true,
        })
    }

    pub fn completion_logging(&self) -> bool {
        self.config.completion_logging
    }

    /// Emits a hex dump of `bytes` when hex dumps are enabled.
    pub fn dump(&self, label: &str, request: &IoRequest, bytes: &[u8]) {
        if self.config.hex_dump {
            info!(request = %request.id(), len = bytes.len(), "{label} = {}", format_hex(bytes));
        }
    }

    /// Logs a target's completion of `request` when completion logging is enabled.
    pub fn log_completion(&self, request: &IoRequest, params: &CompletionParams) {
        if self.config.completion_logging {
            info!(
                request = %request.id(),
                ioctl = %request.control_code(),
                output_len = request.output_len(),
                status = %params.status,
                information = params.information,
                "request completed by lower target"
            );
        }
    }
}
