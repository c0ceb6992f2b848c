//! Integration tests for the upper/lower filter pair.
//!
//! The pair is assembled through `FilterDevice` exactly as at device
//! bring-up.  Recording targets stand in for the function driver (below the
//! upper filter) and the bus (below the lower filter), so each test controls
//! when transfers complete.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_pending, assert_ready};
use xusb_core::{
    BulkOrInterruptTransfer, IoControlCode, NtStatus, PipeHandle, Urb, DEFAULT_INPUT_PIPE_HANDLE,
};
use xusb_filter::application::device::{DeviceSettings, FilterDevice};
use xusb_filter::application::forward::IoTarget;
use xusb_filter::application::gate::GateState;
use xusb_filter::application::request::{IoRequest, PendingRequest};
use xusb_filter::infrastructure::diagnostics::Diagnostics;
use xusb_filter::infrastructure::io_target::recording::RecordingIoTarget;
use xusb_filter::infrastructure::io_target::simulated::{
    report_sequence, state_report, SimulatedBus, SimulatedFunctionDriver,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Stack {
    upper: FilterDevice,
    lower: FilterDevice,
    /// Target below the upper filter (the function driver).
    driver: Arc<RecordingIoTarget>,
    /// Target below the lower filter (the bus).
    bus: Arc<RecordingIoTarget>,
}

fn gated_stack(settings: DeviceSettings) -> Stack {
    let driver = Arc::new(RecordingIoTarget::new());
    let bus = Arc::new(RecordingIoTarget::new());
    let lower = FilterDevice::create_lower(Arc::clone(&bus) as Arc<dyn IoTarget>, &settings);
    let upper = FilterDevice::create_upper(
        Arc::clone(&driver) as Arc<dyn IoTarget>,
        Some(&lower),
        &settings,
    );
    Stack {
        upper,
        lower,
        driver,
        bus,
    }
}

fn wait_for_input(stack: &Stack) -> PendingRequest {
    let (wait, pending) = IoRequest::device_control(IoControlCode::WAIT_FOR_INPUT, vec![], 20);
    stack.upper.dispatch_device_control(wait);
    pending
}

fn submit_poll(stack: &Stack) -> PendingRequest {
    let (poll, pending) = IoRequest::internal_device_control(
        IoControlCode::SUBMIT_TRANSFER,
        Urb::BulkOrInterruptTransfer(BulkOrInterruptTransfer::new_in(DEFAULT_INPUT_PIPE_HANDLE, 32)),
    );
    stack.lower.dispatch_internal_device_control(poll);
    pending
}

fn complete_next_poll(stack: &Stack, payload: &[u8], status: NtStatus) {
    let mut forwarded = stack.bus.take_next().expect("poll must reach the bus");
    forwarded
        .request_mut()
        .urb_mut()
        .and_then(Urb::as_bulk_or_interrupt_mut)
        .expect("bulk transfer")
        .fill(payload);
    forwarded.finish(status, payload.len());
}

// ── End-to-end scenario ───────────────────────────────────────────────────────

#[test]
fn test_wait_is_held_between_report_and_next_poll() {
    // Arrange – fresh pair, gate starts Open
    let stack = gated_stack(DeviceSettings::default());
    assert_eq!(stack.upper.gate_state(), Some(GateState::Open));

    // Act / Assert – first wait goes straight through
    let _first = wait_for_input(&stack);
    assert_eq!(stack.driver.forwarded_count(), 1);

    // Function driver polls the input endpoint
    let mut poll = submit_poll(&stack);
    assert_eq!(stack.lower.gate_state(), Some(GateState::Open));

    // Genuine 20-byte report completes the poll: gate closes, poll keeps its status/length
    complete_next_poll(&stack, &state_report(1), NtStatus::SUCCESS);
    assert_eq!(stack.upper.gate_state(), Some(GateState::Closed));
    let completion = poll.try_recv().expect("poll completed");
    assert_eq!(completion.status, NtStatus::SUCCESS);
    assert_eq!(completion.information, 20);

    // Second wait is held, not forwarded
    let second = wait_for_input(&stack);
    let mut second = tokio_test::task::spawn(second);
    assert_pending!(second.poll());
    assert_eq!(stack.driver.forwarded_count(), 1);
    assert_eq!(stack.upper.held_len(), 1);

    // Next poll reopens the gate and releases the held wait
    let _poll2 = submit_poll(&stack);
    assert_eq!(stack.upper.gate_state(), Some(GateState::Open));
    assert_eq!(stack.upper.held_len(), 0);
    let mut forwarded = stack.driver.take_all();
    assert_eq!(forwarded.len(), 2);

    // The function driver answers it and the client sees the completion
    forwarded.pop().expect("released wait").finish(NtStatus::SUCCESS, 20);
    assert!(second.is_woken());
    let completion = assert_ready!(second.poll()).expect("completed");
    assert_eq!(completion.status, NtStatus::SUCCESS);
    assert_eq!(completion.information, 20);
}

// ── Gate transition properties ────────────────────────────────────────────────

#[test]
fn test_poll_submission_opens_gate_from_either_state() {
    for close_first in [false, true] {
        // Arrange
        let stack = gated_stack(DeviceSettings::default());
        if close_first {
            let _p = submit_poll(&stack);
            complete_next_poll(&stack, &state_report(1), NtStatus::SUCCESS);
            assert_eq!(stack.lower.gate_state(), Some(GateState::Closed));
        }

        // Act
        let _p = submit_poll(&stack);

        // Assert
        assert_eq!(stack.lower.gate_state(), Some(GateState::Open));
    }
}

#[test]
fn test_genuine_report_closes_gate_from_either_state() {
    for already_closed in [false, true] {
        // Arrange – two polls in flight so the second completion finds the gate Closed
        let stack = gated_stack(DeviceSettings::default());
        let _p1 = submit_poll(&stack);
        let _p2 = submit_poll(&stack);
        if already_closed {
            complete_next_poll(&stack, &[0u8; 14], NtStatus::SUCCESS);
        }

        // Act
        complete_next_poll(&stack, &[0u8; 14], NtStatus::SUCCESS);

        // Assert
        assert_eq!(stack.lower.gate_state(), Some(GateState::Closed));
    }
}

#[test]
fn test_failed_or_non_state_completion_leaves_gate_unchanged() {
    let cases: [(&[u8], NtStatus); 4] = [
        (&[0u8; 20], NtStatus::CANCELLED),
        (&[0u8; 20], NtStatus::DEVICE_NOT_CONNECTED),
        (&[0x01, 0x03, 0x0E], NtStatus::SUCCESS),
        (&[0x08, 0x03, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], NtStatus::SUCCESS),
    ];
    for (payload, status) in cases {
        for close_first in [false, true] {
            // Arrange
            let stack = gated_stack(DeviceSettings::default());
            let _p1 = submit_poll(&stack);
            let _p2 = submit_poll(&stack);
            if close_first {
                complete_next_poll(&stack, &state_report(1), NtStatus::SUCCESS);
            }
            let before = stack.lower.gate_state();

            // Act
            complete_next_poll(&stack, payload, status);

            // Assert
            assert_eq!(
                stack.lower.gate_state(),
                before,
                "payload {payload:02X?} status {status} must not move the gate"
            );
        }
    }
}

#[test]
fn test_transfers_to_other_pipes_do_not_touch_gate() {
    // Arrange
    let stack = gated_stack(DeviceSettings::default());
    let _p = submit_poll(&stack);
    complete_next_poll(&stack, &state_report(1), NtStatus::SUCCESS);
    let (other, _pending) = IoRequest::internal_device_control(
        IoControlCode::SUBMIT_TRANSFER,
        Urb::BulkOrInterruptTransfer(BulkOrInterruptTransfer::new_in(PipeHandle(0xFFFF_0082), 32)),
    );

    // Act
    stack.lower.dispatch_internal_device_control(other);

    // Assert
    assert_eq!(stack.lower.gate_state(), Some(GateState::Closed));
    assert!(!stack.bus.take_next().expect("forwarded").has_routine());
}

// ── FIFO and idempotence ──────────────────────────────────────────────────────

#[test]
fn test_held_waits_are_released_in_arrival_order() {
    // Arrange – close the gate, then queue five waits
    let stack = gated_stack(DeviceSettings::default());
    let _p = submit_poll(&stack);
    complete_next_poll(&stack, &state_report(1), NtStatus::SUCCESS);

    let mut expected = Vec::new();
    let mut pendings = Vec::new();
    for _ in 0..5 {
        let (wait, pending) = IoRequest::device_control(IoControlCode::WAIT_FOR_INPUT, vec![], 20);
        expected.push(wait.id());
        stack.upper.dispatch_device_control(wait);
        pendings.push(pending);
    }
    assert_eq!(stack.upper.held_len(), 5);

    // Act
    let _p2 = submit_poll(&stack);

    // Assert
    assert_eq!(stack.driver.forwarded_ids(), expected);
}

#[test]
fn test_repeated_open_and_close_do_not_re_release() {
    // Arrange – one wait held, then released by a poll
    let stack = gated_stack(DeviceSettings::default());
    let _p1 = submit_poll(&stack);
    complete_next_poll(&stack, &state_report(1), NtStatus::SUCCESS);
    let _wait = wait_for_input(&stack);
    let _p2 = submit_poll(&stack);
    assert_eq!(stack.driver.forwarded_count(), 1);

    // Act – open again while Open
    let _p3 = submit_poll(&stack);

    // Assert
    assert_eq!(stack.driver.forwarded_count(), 1);
    assert_eq!(stack.lower.gate_state(), Some(GateState::Open));

    // Act – close twice
    complete_next_poll(&stack, &state_report(2), NtStatus::SUCCESS);
    complete_next_poll(&stack, &state_report(3), NtStatus::SUCCESS);

    // Assert
    assert_eq!(stack.lower.gate_state(), Some(GateState::Closed));
    assert_eq!(stack.driver.forwarded_count(), 1);
}

// ── Legacy mode ───────────────────────────────────────────────────────────────

#[test]
fn test_legacy_validation_truth_table() {
    let cases = [
        ([0x00, 0x01], true),
        ([0x01, 0x01], true),
        ([0x02, 0x01], false),
        ([0x00, 0x02], false),
    ];
    for (payload, accepted) in cases {
        // Arrange
        let driver = Arc::new(RecordingIoTarget::new());
        let upper = FilterDevice::create_upper(
            Arc::clone(&driver) as Arc<dyn IoTarget>,
            None,
            &DeviceSettings::default(),
        );
        let (req, mut pending) =
            IoRequest::device_control(IoControlCode::LEGACY_GET_STATE, payload.to_vec(), 29);

        // Act
        upper.dispatch_device_control(req);

        // Assert
        if accepted {
            assert_eq!(driver.forwarded_count(), 1, "{payload:02X?} must be forwarded");
        } else {
            assert_eq!(driver.forwarded_count(), 0);
            assert_eq!(pending.try_recv().unwrap().status, NtStatus::INVALID_PARAMETER);
        }
    }
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

/// Runs a fixed request script and records every observable outcome.
fn scripted_run(diagnostics: Diagnostics) -> Vec<String> {
    let stack = gated_stack(DeviceSettings {
        diagnostics,
        ..DeviceSettings::default()
    });
    let mut trace = Vec::new();

    let mut w1 = wait_for_input(&stack);
    let mut p1 = submit_poll(&stack);
    trace.push(format!("{:?}", stack.upper.gate_state()));
    complete_next_poll(&stack, &state_report(1), NtStatus::SUCCESS);
    trace.push(format!("{:?}", stack.upper.gate_state()));
    let mut w2 = wait_for_input(&stack);
    trace.push(format!("held={}", stack.upper.held_len()));
    let _p2 = submit_poll(&stack);
    for forwarded in stack.driver.take_all() {
        forwarded.finish(NtStatus::SUCCESS, 20);
    }

    for pending in [&mut w1, &mut p1, &mut w2] {
        let c = pending.try_recv().expect("completed");
        trace.push(format!("{} {}", c.status, c.information));
    }
    trace
}

#[test]
fn test_diagnostics_do_not_change_behaviour() {
    assert_eq!(scripted_run(Diagnostics::default()), scripted_run(Diagnostics::verbose()));
}

// ── Simulated stack ───────────────────────────────────────────────────────────

/// Runs the simulated stack and returns the sequence number of each report
/// the client received.
async fn simulated_sequences(gated: bool, waits: usize) -> Vec<u32> {
    let settings = DeviceSettings::default();
    let bus = Arc::new(SimulatedBus::new(
        tokio::runtime::Handle::current(),
        Duration::from_millis(3),
        settings.input_pipe,
    ));
    let lower = Arc::new(FilterDevice::create_lower(bus, &settings));
    let driver = Arc::new(SimulatedFunctionDriver::new(
        Arc::clone(&lower),
        settings.input_pipe,
        Duration::from_millis(3),
    ));
    let upper = FilterDevice::create_upper(
        Arc::clone(&driver) as Arc<dyn IoTarget>,
        gated.then_some(lower.as_ref()),
        &settings,
    );
    let running = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(Arc::clone(&driver).run(Arc::clone(&running)));

    let mut sequences = Vec::new();
    for _ in 0..waits {
        let (wait, pending) = IoRequest::device_control(IoControlCode::WAIT_FOR_INPUT, vec![], 20);
        upper.dispatch_device_control(wait);
        let completion = pending.await.expect("wait completed");
        assert_eq!(completion.status, NtStatus::SUCCESS);
        sequences.push(report_sequence(&completion.output).expect("sequence"));
    }

    running.store(false, Ordering::Relaxed);
    drop(upper);
    task.await.expect("join").expect("driver stops cleanly");
    sequences
}

#[tokio::test]
async fn test_gated_stack_never_delivers_stale_report() {
    // Act
    let sequences = simulated_sequences(true, 10).await;

    // Assert – every report is newer than the one before
    assert!(
        sequences.windows(2).all(|w| w[1] > w[0]),
        "stale report delivered: {sequences:?}"
    );
}

#[tokio::test]
async fn test_legacy_stack_delivers_stale_reports() {
    // Act
    let sequences = simulated_sequences(false, 10).await;

    // Assert – without the gate the function driver repeats its last report
    assert!(
        sequences.windows(2).any(|w| w[1] == w[0]),
        "expected at least one repeat: {sequences:?}"
    );
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tearing_down_gated_stack_frees_lower_device_and_driver() {
    // Arrange – a paired stack that has served one wait
    let settings = DeviceSettings::default();
    let bus = Arc::new(SimulatedBus::new(
        tokio::runtime::Handle::current(),
        Duration::from_millis(3),
        settings.input_pipe,
    ));
    let lower = Arc::new(FilterDevice::create_lower(bus, &settings));
    let driver = Arc::new(SimulatedFunctionDriver::new(
        Arc::clone(&lower),
        settings.input_pipe,
        Duration::from_millis(3),
    ));
    let upper = FilterDevice::create_upper(
        Arc::clone(&driver) as Arc<dyn IoTarget>,
        Some(lower.as_ref()),
        &settings,
    );
    assert!(upper.has_gate());
    let running = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(Arc::clone(&driver).run(Arc::clone(&running)));

    let (wait, pending) = IoRequest::device_control(IoControlCode::WAIT_FOR_INPUT, vec![], 20);
    upper.dispatch_device_control(wait);
    assert_eq!(pending.await.expect("wait completed").status, NtStatus::SUCCESS);

    running.store(false, Ordering::Relaxed);
    task.await.expect("join").expect("driver stops cleanly");
    let weak_lower = Arc::downgrade(&lower);
    let weak_driver = Arc::downgrade(&driver);

    // Act – upper first, then driver, then lower
    drop(upper);
    drop(driver);
    drop(lower);

    // Assert – the lower device's gate handle pins nothing above it
    assert!(weak_driver.upgrade().is_none(), "function driver leaked");
    assert!(weak_lower.upgrade().is_none(), "lower device leaked");
}
