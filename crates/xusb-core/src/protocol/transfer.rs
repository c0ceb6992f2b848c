//! The device-bound USB transfer block carried by `SUBMIT_TRANSFER` requests.
//!
//! # What is a transfer block? (for beginners)
//!
//! A function driver talks to the USB bus by submitting *transfer blocks*.
//! Each block names a *function* (what kind of transfer it is) and, for
//! bulk/interrupt transfers, the *pipe* (endpoint) to use, the direction,
//! and a buffer.  For an IN transfer the bus fills the buffer and sets the
//! transfer length to the number of bytes the device actually sent.
//!
//! The controller's input reports arrive on one interrupt-IN pipe.  The lower
//! filter recognises that pipe by its handle, [`DEFAULT_INPUT_PIPE_HANDLE`]
//! unless configured otherwise.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transfer-block function number for bulk and interrupt transfers.
pub const URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER: u16 = 0x0009;

/// Opaque identity of a USB pipe (endpoint) as assigned by the bus driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipeHandle(pub u32);

/// The pipe the controller's interrupt-IN reports arrive on (endpoint 0x81).
pub const DEFAULT_INPUT_PIPE_HANDLE: PipeHandle = PipeHandle(0xFFFF_0081);

impl fmt::Display for PipeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Transfer flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TransferFlags(pub u32);

impl TransferFlags {
    /// Device-to-host transfer.  When clear the transfer is host-to-device.
    pub const DIRECTION_IN: u32 = 1 << 0;
    /// A short packet does not fail the transfer.
    pub const SHORT_TRANSFER_OK: u32 = 1 << 1;

    /// Returns `true` if the direction bit marks this transfer as IN.
    pub fn is_in(self) -> bool {
        self.0 & Self::DIRECTION_IN != 0
    }
}

/// A bulk or interrupt transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOrInterruptTransfer {
    pub pipe_handle: PipeHandle,
    pub transfer_flags: TransferFlags,
    pub transfer_buffer: Vec<u8>,
    /// Bytes valid in `transfer_buffer`.  On submission this is the buffer
    /// size; on completion of an IN transfer it is the count the device sent.
    pub transfer_buffer_length: u32,
}

impl BulkOrInterruptTransfer {
    /// Creates an IN transfer with a zeroed buffer of `capacity` bytes.
    pub fn new_in(pipe_handle: PipeHandle, capacity: usize) -> Self {
        Self {
            pipe_handle,
            transfer_flags: TransferFlags(TransferFlags::DIRECTION_IN | TransferFlags::SHORT_TRANSFER_OK),
            transfer_buffer: vec![0; capacity],
            transfer_buffer_length: capacity as u32,
        }
    }

    /// Creates an OUT transfer carrying `data`.
    pub fn new_out(pipe_handle: PipeHandle, data: Vec<u8>) -> Self {
        let len = data.len() as u32;
        Self {
            pipe_handle,
            transfer_flags: TransferFlags(0),
            transfer_buffer: data,
            transfer_buffer_length: len,
        }
    }

    /// Stores the bytes a device delivered for an IN transfer.
    ///
    /// Data beyond the buffer's capacity is dropped, the same way a bus
    /// driver truncates an overlong packet.
    pub fn fill(&mut self, data: &[u8]) {
        let n = data.len().min(self.transfer_buffer.len());
        self.transfer_buffer[..n].copy_from_slice(&data[..n]);
        self.transfer_buffer_length = n as u32;
    }

    /// Returns the valid portion of the buffer.
    pub fn report(&self) -> TransferReport<'_> {
        let n = (self.transfer_buffer_length as usize).min(self.transfer_buffer.len());
        TransferReport {
            bytes: &self.transfer_buffer[..n],
        }
    }
}

/// A USB transfer block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Urb {
    BulkOrInterruptTransfer(BulkOrInterruptTransfer),
    /// Any other function (control transfers, pipe requests, ...).  The
    /// filter never looks inside these.
    Other { function: u16 },
}

impl Urb {
    /// Returns the transfer-block function number.
    pub fn function(&self) -> u16 {
        match self {
            Urb::BulkOrInterruptTransfer(_) => URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
            Urb::Other { function } => *function,
        }
    }

    pub fn as_bulk_or_interrupt(&self) -> Option<&BulkOrInterruptTransfer> {
        match self {
            Urb::BulkOrInterruptTransfer(t) => Some(t),
            Urb::Other { .. } => None,
        }
    }

    pub fn as_bulk_or_interrupt_mut(&mut self) -> Option<&mut BulkOrInterruptTransfer> {
        match self {
            Urb::BulkOrInterruptTransfer(t) => Some(t),
            Urb::Other { .. } => None,
        }
    }
}

/// The payload of a completed transfer, borrowed for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport<'a> {
    pub bytes: &'a [u8],
}

impl<'a> TransferReport<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The first byte, or `None` for an empty report.
    pub fn first_byte(&self) -> Option<u8> {
        self.bytes.first().copied()
    }
}
