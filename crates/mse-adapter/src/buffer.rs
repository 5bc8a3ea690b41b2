// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{format::Field, Error};
use crossbeam_channel::{Receiver, Sender};
use std::{
    fmt,
    sync::OnceLock,
    time::{Duration, Instant},
};
use unix_ts::Timestamp;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current time on the adapter's monotonic clock.
///
/// The clock starts at zero on first use within the process and never goes
/// backwards, matching the `CLOCK_MONOTONIC` semantics of queue timestamps.
pub fn monotonic_now() -> Timestamp {
    let elapsed = EPOCH.get_or_init(Instant::now).elapsed();
    let secs = i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX);
    Timestamp::new(secs, elapsed.subsec_nanos())
}

/// Status a buffer carries when it is handed back to the queue layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// The engine transmitted or filled the buffer
    Done,
    /// The buffer was not transferred (receive failure, stop drain, late completion)
    Error,
    /// The session never started; the buffer may be queued again as-is
    Queued,
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferState::Done => write!(f, "DONE"),
            BufferState::Error => write!(f, "ERROR"),
            BufferState::Queued => write!(f, "QUEUED"),
        }
    }
}

/// A queue buffer: backing storage plus the metadata stamped on completion.
///
/// The queue layer owns a buffer until it is submitted. From then on exactly
/// one of the pending queue, the engine (through a
/// [`Transfer`](crate::transfer::Transfer)) or the completion sink owns it.
pub struct Buffer {
    index: u32,
    data: Vec<u8>,
    bytes_used: usize,
    timestamp: Timestamp,
    sequence: u32,
    field: Field,
}

impl Buffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn new(index: u32, capacity: usize) -> Self {
        Buffer::from_vec(index, vec![0; capacity])
    }

    /// Wrap existing storage; the full vector is the payload.
    pub fn from_vec(index: u32, data: Vec<u8>) -> Self {
        Buffer {
            index,
            bytes_used: data.len(),
            data,
            timestamp: Timestamp::new(0, 0),
            sequence: 0,
            field: Field::None,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The whole backing storage.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The valid payload, the first `bytes_used` bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.bytes_used]
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Set the payload length of an output buffer before it is queued.
    pub fn set_bytes_used(&mut self, bytes_used: usize) -> Result<(), Error> {
        if bytes_used > self.data.len() {
            return Err(Error::BufferTooSmall {
                size: self.data.len(),
                required: bytes_used,
            });
        }
        self.bytes_used = bytes_used;
        Ok(())
    }

    /// Monotonic time at which the buffer was last dispatched or filled.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub(crate) fn stamp(&mut self, sequence: u32, field: Field) {
        self.timestamp = monotonic_now();
        self.sequence = sequence;
        self.field = field;
    }

    pub(crate) fn set_received(&mut self, byte_count: usize) {
        self.bytes_used = byte_count.min(self.data.len());
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::from_vec(0, Vec::new())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("index", &self.index)
            .field("capacity", &self.data.len())
            .field("bytes_used", &self.bytes_used)
            .field("sequence", &self.sequence)
            .field("field", &self.field)
            .finish()
    }
}

/// A buffer handed back to the queue layer.
#[derive(Debug)]
pub struct Completed {
    pub buffer: Buffer,
    pub state: BufferState,
}

/// Receiver of buffers leaving the adapter.
///
/// Called from the completion path, possibly on an engine thread, and never
/// with adapter locks held.
pub trait BufferSink: Send + Sync {
    fn buffer_done(&self, buffer: Buffer, state: BufferState);
}

/// Channel-backed sink feeding a [`DoneQueue`].
pub struct DoneSender {
    tx: Sender<Completed>,
}

impl BufferSink for DoneSender {
    fn buffer_done(&self, buffer: Buffer, state: BufferState) {
        let index = buffer.index();
        if self.tx.send(Completed { buffer, state }).is_err() {
            log::warn!("buffer {} returned {} after the queue was closed", index, state);
        }
    }
}

/// Dequeue side of the completion channel.
pub struct DoneQueue {
    rx: Receiver<Completed>,
}

/// Create a connected sink and dequeue pair.
pub fn done_queue() -> (DoneSender, DoneQueue) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (DoneSender { tx }, DoneQueue { rx })
}

impl DoneQueue {
    /// Wait up to `timeout` for the next completed buffer.
    pub fn dequeue(&self, timeout: Duration) -> Option<Completed> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_dequeue(&self) -> Option<Completed> {
        self.rx.try_recv().ok()
    }

    /// Everything completed so far, in completion order.
    pub fn drain(&self) -> Vec<Completed> {
        self.rx.try_iter().collect()
    }
}
