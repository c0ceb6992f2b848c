//! Simulated controller stack: a USB bus and the controller's function driver.
//!
//! # How the simulation reproduces the timing defect (for beginners)
//!
//! ```text
//! client ──► upper filter ──► SimulatedFunctionDriver ──► lower filter ──► SimulatedBus
//! ```
//!
//! - [`SimulatedBus`] answers each interrupt-IN poll after `report_interval`
//!   with a fresh 20-byte state report.  Bytes 2..6 carry a little-endian
//!   sequence number so a client can tell a fresh report from a repeat.
//! - [`SimulatedFunctionDriver`] keeps one poll in flight.  A wait-for-input
//!   request that arrives while the poll is outstanding is pended and
//!   completed with the next report.  One that arrives in the gap between a
//!   completion and the next poll is answered *immediately* with the report
//!   it already has.  That immediate answer is the stale duplicate the
//!   filter pair exists to prevent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use xusb_core::domain::classify::FULL_STATE_REPORT_LEN;
use xusb_core::{BulkOrInterruptTransfer, ControlCodeKind, IoControlCode, NtStatus, PipeHandle, Urb};

use crate::application::device::FilterDevice;
use crate::application::forward::{CompletionParams, CompletionRoutine, IoTarget, SendFailure};
use crate::application::request::IoRequest;

/// Capacity of the function driver's interrupt-IN buffer.
pub const POLL_BUFFER_LEN: usize = 32;

/// Byte range holding the report sequence number.
const SEQUENCE_RANGE: std::ops::Range<usize> = 2..6;

/// Error type for the simulated function driver's poll loop.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The bus completed a poll with a failure status.
    #[error("input poll failed with status {0}")]
    PollFailed(NtStatus),

    /// A poll was dropped without being completed.
    #[error("input poll was abandoned before completion")]
    PollAbandoned,

    /// A completed poll came back without its transfer block.
    #[error("input poll completed without a bulk/interrupt transfer")]
    MissingTransfer,
}

/// Builds a genuine 20-byte state report carrying `sequence`.
pub fn state_report(sequence: u32) -> Vec<u8> {
    let mut report = vec![0u8; FULL_STATE_REPORT_LEN];
    report[1] = FULL_STATE_REPORT_LEN as u8;
    report[SEQUENCE_RANGE].copy_from_slice(&sequence.to_le_bytes());
    report
}

/// Reads the sequence number from a report built by [`state_report`].
pub fn report_sequence(report: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = report.get(SEQUENCE_RANGE)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

// ── Simulated bus ─────────────────────────────────────────────────────────────

/// A USB bus with one controller attached.
pub struct SimulatedBus {
    runtime: Handle,
    report_interval: Duration,
    input_pipe: PipeHandle,
    next_sequence: AtomicU32,
    connected: AtomicBool,
}

impl SimulatedBus {
    pub fn new(runtime: Handle, report_interval: Duration, input_pipe: PipeHandle) -> Self {
        Self {
            runtime,
            report_interval,
            input_pipe,
            next_sequence: AtomicU32::new(1),
            connected: AtomicBool::new(true),
        }
    }

    /// Unplugs the controller; every later submission fails synchronously.
    pub fn disconnect(&self) {
        info!("simulated controller disconnected");
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Number of reports produced so far.
    pub fn reports_sent(&self) -> u32 {
        self.next_sequence.load(Ordering::Relaxed) - 1
    }

    fn check_connected(&self, request: IoRequest) -> Result<IoRequest, SendFailure> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(request)
        } else {
            Err(SendFailure::new(request, NtStatus::DEVICE_NOT_CONNECTED))
        }
    }

    fn is_input_read(&self, request: &IoRequest) -> bool {
        request
            .urb()
            .and_then(Urb::as_bulk_or_interrupt)
            .is_some_and(|t| t.transfer_flags.is_in() && t.pipe_handle == self.input_pipe)
    }
}

impl IoTarget for SimulatedBus {
    fn send_and_forget(&self, request: IoRequest) -> Result<(), SendFailure> {
        let request = self.check_connected(request)?;
        let information = request
            .urb()
            .and_then(Urb::as_bulk_or_interrupt)
            .map_or(0, |t| t.transfer_buffer_length as usize);
        request.complete_with_information(NtStatus::SUCCESS, information);
        Ok(())
    }

    fn send_with_completion(
        &self,
        request: IoRequest,
        routine: CompletionRoutine,
    ) -> Result<(), SendFailure> {
        let mut request = self.check_connected(request)?;

        if !self.is_input_read(&request) {
            routine(request, CompletionParams { status: NtStatus::SUCCESS, information: 0 });
            return Ok(());
        }

        let interval = self.report_interval;
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            let report = state_report(sequence);
            let information = match request.urb_mut().and_then(Urb::as_bulk_or_interrupt_mut) {
                Some(transfer) => {
                    transfer.fill(&report);
                    transfer.transfer_buffer_length as usize
                }
                None => 0,
            };
            debug!(request = %request.id(), sequence, "simulated report delivered");
            routine(request, CompletionParams { status: NtStatus::SUCCESS, information });
        });
        Ok(())
    }
}

// ── Simulated function driver ─────────────────────────────────────────────────

/// A request the driver answers with report data, plus the sender's
/// completion routine if one was attached.
struct Waiter {
    request: IoRequest,
    routine: Option<CompletionRoutine>,
}

impl Waiter {
    fn finish(mut self, status: NtStatus, report: &[u8]) {
        let n = report.len().min(self.request.output_len());
        self.request.output_mut()[..n].copy_from_slice(&report[..n]);
        match self.routine {
            Some(routine) => routine(self.request, CompletionParams { status, information: n }),
            None => self.request.complete_with_information(status, n),
        }
    }
}

#[derive(Default)]
struct DriverState {
    poll_in_flight: bool,
    latest: Option<Vec<u8>>,
    pending_waits: VecDeque<Waiter>,
}

/// The controller's function driver, sitting between the two filter layers.
pub struct SimulatedFunctionDriver {
    lower: Arc<FilterDevice>,
    input_pipe: PipeHandle,
    processing_delay: Duration,
    state: Mutex<DriverState>,
}

impl SimulatedFunctionDriver {
    /// `processing_delay` is the time between a poll completing and the next
    /// poll being submitted.
    pub fn new(lower: Arc<FilterDevice>, input_pipe: PipeHandle, processing_delay: Duration) -> Self {
        Self {
            lower,
            input_pipe,
            processing_delay,
            state: Mutex::new(DriverState::default()),
        }
    }

    /// Number of wait-for-input requests pended on the next report.
    pub fn pending_waits(&self) -> usize {
        self.lock().pending_waits.len()
    }

    /// Runs the interrupt-IN poll loop until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns a [`SimulationError`] if a poll fails or loses its transfer
    /// block.  Pended waits are completed with a failure status first.
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) -> Result<(), SimulationError> {
        info!(input_pipe = %self.input_pipe, "simulated function driver polling");
        while running.load(Ordering::Relaxed) {
            if let Err(e) = self.poll_once().await {
                let status = match e {
                    SimulationError::PollFailed(status) => status,
                    _ => NtStatus::UNSUCCESSFUL,
                };
                self.fail_pending(status);
                return Err(e);
            }
            tokio::time::sleep(self.processing_delay).await;
        }
        self.fail_pending(NtStatus::CANCELLED);
        info!("simulated function driver stopped");
        Ok(())
    }

    /// Submits one interrupt-IN poll through the lower filter and delivers
    /// its report to every pended wait.
    ///
    /// # Errors
    ///
    /// See [`SimulatedFunctionDriver::run`].
    pub async fn poll_once(&self) -> Result<(), SimulationError> {
        // Must be set before dispatch: opening the gate releases waits into
        // this driver synchronously.
        self.lock().poll_in_flight = true;

        let (poll, pending) = IoRequest::internal_device_control(
            IoControlCode::SUBMIT_TRANSFER,
            Urb::BulkOrInterruptTransfer(BulkOrInterruptTransfer::new_in(
                self.input_pipe,
                POLL_BUFFER_LEN,
            )),
        );
        self.lower.dispatch_internal_device_control(poll);
        let completion = pending.await;

        let mut state = self.lock();
        state.poll_in_flight = false;
        let completion = completion.map_err(|_| SimulationError::PollAbandoned)?;
        if !completion.status.is_success() {
            return Err(SimulationError::PollFailed(completion.status));
        }
        let report = completion
            .urb
            .as_ref()
            .and_then(Urb::as_bulk_or_interrupt)
            .map(|t| t.report().bytes.to_vec())
            .ok_or(SimulationError::MissingTransfer)?;

        let waits = std::mem::take(&mut state.pending_waits);
        state.latest = Some(report.clone());
        drop(state);

        for waiter in waits {
            waiter.finish(NtStatus::SUCCESS, &report);
        }
        Ok(())
    }

    fn fail_pending(&self, status: NtStatus) {
        let waits = std::mem::take(&mut self.lock().pending_waits);
        for waiter in waits {
            waiter.finish(status, &[]);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, waiter: Waiter) {
        match waiter.request.control_code().kind() {
            ControlCodeKind::WaitForInput => {
                let mut state = self.lock();
                let last = if state.poll_in_flight { None } else { state.latest.clone() };
                match last {
                    Some(report) => {
                        drop(state);
                        warn!(request = %waiter.request.id(), "answering wait-for-input with the last report");
                        waiter.finish(NtStatus::SUCCESS, &report);
                    }
                    None => state.pending_waits.push_back(waiter),
                }
            }
            ControlCodeKind::LegacyGetState => {
                let latest = self.lock().latest.clone().unwrap_or_default();
                waiter.finish(NtStatus::SUCCESS, &latest);
            }
            _ => waiter.finish(NtStatus::SUCCESS, &[]),
        }
    }
}

impl IoTarget for SimulatedFunctionDriver {
    fn send_and_forget(&self, request: IoRequest) -> Result<(), SendFailure> {
        self.handle(Waiter { request, routine: None });
        Ok(())
    }

    fn send_with_completion(
        &self,
        request: IoRequest,
        routine: CompletionRoutine,
    ) -> Result<(), SendFailure> {
        self.handle(Waiter { request, routine: Some(routine) });
        Ok(())
    }
}
