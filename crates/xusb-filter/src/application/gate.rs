//! The Input Gate: a two-state dispatch queue shared by the two filter layers.
//!
//! # What does the gate do? (for beginners)
//!
//! Clients send `WAIT_FOR_INPUT` to the upper filter to block until the
//! controller has a new input sample.  The upper filter routes every such
//! request into the gate:
//!
//! - **Open** – the request is dispatched to the function driver immediately.
//! - **Closed** – the request is held in arrival order.
//!
//! The *lower* filter, which sees the raw USB traffic, drives the state:
//!
//! ```text
//!   input-poll transfer submitted ──► open()   (held requests released, FIFO)
//!   genuine state report completed ──► close()
//! ```
//!
//! So a client request that arrives after a report was delivered, but before
//! the function driver asked the device for the next one, waits in the gate
//! instead of reading stale data.
//!
//! # Handles
//!
//! [`InputGate::create`] returns two handles over one shared gate:
//!
//! - [`GateEntry`] (kept by the upper layer) can only enqueue.
//! - [`GateControl`] (given to the lower layer) can only open and close.
//!
//! The gate is freed when both handles are dropped.  Purging through
//! [`GateEntry::purge`] also releases the dispatch target, so a lower device
//! that still holds its [`GateControl`] no longer keeps the upper layer's
//! target alive.
//!
//! # Concurrency
//!
//! Both layers run on many threads at once.  State and queue live behind one
//! mutex, and dispatch always happens *outside* it because the next layer may
//! suspend.  To keep release order strictly FIFO while dispatching unlocked,
//! exactly one caller at a time acts as the *drainer*: it pops and dispatches
//! until the queue is empty or the gate closes.  Requests arriving during a
//! drain queue up behind older ones and are dispatched by that drainer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use xusb_core::NtStatus;

use super::request::IoRequest;

/// Gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Closed,
}

/// Why an upper device came up without a gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("paired device {0} is not a lower filter")]
    NotLowerLayer(Uuid),
    #[error("lower filter {0} already holds an input gate")]
    AlreadyPaired(Uuid),
}

/// A request the gate could not accept.  Ownership returns to the caller.
#[derive(Debug)]
pub struct EnqueueFailure {
    pub request: IoRequest,
    pub status: NtStatus,
}

/// Sends a request released by the gate on to its destination.
pub trait GateDispatch: Send + Sync {
    fn dispatch(&self, request: IoRequest);
}

struct GateInner {
    state: GateState,
    held: VecDeque<IoRequest>,
    draining: bool,
    purged: bool,
    /// `None` once purged.
    dispatch: Option<Arc<dyn GateDispatch>>,
}

/// The shared gate.  Only reachable through [`GateEntry`] and [`GateControl`].
pub struct InputGate {
    id: Uuid,
    inner: Mutex<GateInner>,
}

impl InputGate {
    /// Creates an Open gate that releases requests through `dispatch`.
    pub fn create(dispatch: Arc<dyn GateDispatch>) -> (GateEntry, GateControl) {
        let gate = Arc::new(InputGate {
            id: Uuid::new_v4(),
            inner: Mutex::new(GateInner {
                state: GateState::Open,
                held: VecDeque::new(),
                draining: false,
                purged: false,
                dispatch: Some(dispatch),
            }),
        });
        info!(gate = %gate.id, "created input gate");
        (GateEntry(Arc::clone(&gate)), GateControl(gate))
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        // Dispatch never runs under the lock, so a poisoned guard still holds
        // a consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> GateState {
        self.lock().state
    }

    fn held_len(&self) -> usize {
        self.lock().held.len()
    }

    fn enqueue(&self, request: IoRequest) -> Result<(), EnqueueFailure> {
        {
            let mut inner = self.lock();
            if inner.purged {
                return Err(EnqueueFailure {
                    request,
                    status: NtStatus::INVALID_DEVICE_STATE,
                });
            }
            let id = request.id();
            inner.held.push_back(request);
            if inner.state == GateState::Closed || inner.draining {
                debug!(gate = %self.id, request = %id, held = inner.held.len(), "holding request");
                return Ok(());
            }
            inner.draining = true;
        }
        self.drain();
        Ok(())
    }

    fn open(&self) {
        {
            let mut inner = self.lock();
            if inner.purged {
                return;
            }
            if inner.state == GateState::Closed {
                debug!(gate = %self.id, held = inner.held.len(), "gate opened");
            }
            inner.state = GateState::Open;
            if inner.draining || inner.held.is_empty() {
                return;
            }
            inner.draining = true;
        }
        self.drain();
    }

    fn close(&self) {
        let mut inner = self.lock();
        if inner.purged {
            return;
        }
        if inner.state == GateState::Open {
            debug!(gate = %self.id, "gate closed");
        }
        inner.state = GateState::Closed;
    }

    /// Releases held requests in arrival order until the queue is empty or
    /// the gate closes.  The caller must have set `draining`.
    fn drain(&self) {
        loop {
            let next = {
                let mut inner = self.lock();
                let dispatch = match inner.state {
                    GateState::Open => inner.dispatch.clone(),
                    GateState::Closed => None,
                };
                let next = dispatch.and_then(|d| inner.held.pop_front().map(|request| (d, request)));
                if next.is_none() {
                    inner.draining = false;
                }
                next
            };

            match next {
                Some((dispatch, request)) => dispatch.dispatch(request),
                None => break,
            }
        }
    }

    fn purge(&self) {
        let (held, dispatch): (Vec<IoRequest>, _) = {
            let mut inner = self.lock();
            if inner.purged {
                return;
            }
            inner.purged = true;
            inner.state = GateState::Closed;
            (inner.held.drain(..).collect(), inner.dispatch.take())
        };
        info!(gate = %self.id, cancelled = held.len(), "purged input gate");
        for request in held {
            request.complete(NtStatus::CANCELLED);
        }
        // Released outside the lock; the target may own further devices.
        drop(dispatch);
    }
}

impl Drop for InputGate {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        for request in inner.held.drain(..) {
            request.complete(NtStatus::CANCELLED);
        }
        debug!(gate = %self.id, "released input gate");
    }
}

/// The upper layer's handle: admits requests into the gate.
pub struct GateEntry(Arc<InputGate>);

impl GateEntry {
    /// Routes `request` through the gate.
    ///
    /// # Errors
    ///
    /// Returns the request with [`NtStatus::INVALID_DEVICE_STATE`] if the gate
    /// has been purged.
    pub fn enqueue(&self, request: IoRequest) -> Result<(), EnqueueFailure> {
        self.0.enqueue(request)
    }

    pub fn state(&self) -> GateState {
        self.0.state()
    }

    /// Number of requests currently held.
    pub fn held_len(&self) -> usize {
        self.0.held_len()
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Number of live handles on this gate (entry plus control).
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Cancels every held request, refuses new ones, and releases the
    /// dispatch target.  Used at upper device teardown; the lower layer's
    /// `open`/`close` become no-ops.
    pub fn purge(&self) {
        self.0.purge();
    }
}

/// The lower layer's handle: the only way to change gate state.
pub struct GateControl(Arc<InputGate>);

impl GateControl {
    /// Opens the gate and releases all held requests in arrival order.
    /// Opening an Open gate changes nothing.
    pub fn open(&self) {
        self.0.open();
    }

    /// Closes the gate.  Closing a Closed gate changes nothing.
    pub fn close(&self) {
        self.0.close();
    }

    pub fn state(&self) -> GateState {
        self.0.state()
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }
}
