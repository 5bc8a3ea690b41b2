// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{buffer::Buffer, engine::EngineError, format::Direction, queue::Token};
use std::{fmt, mem, sync::Arc};

/// Where a transfer reports its completion.
pub(crate) trait CompletionTarget: Send + Sync {
    fn transfer_done(self: Arc<Self>, token: Token, buffer: Buffer, byte_count: usize);
}

/// A buffer in flight at the engine.
///
/// The engine owns the transfer between an accepted
/// [`start_transmission`](crate::engine::Engine::start_transmission) and
/// [`Transfer::complete`]. Completion consumes the handle, so it can only
/// happen once; a transfer dropped without completion completes with a byte
/// count of zero.
pub struct Transfer {
    direction: Direction,
    token: Token,
    buffer: Buffer,
    target: Arc<dyn CompletionTarget>,
    done: bool,
}

impl Transfer {
    pub(crate) fn new(
        direction: Direction,
        token: Token,
        buffer: Buffer,
        target: Arc<dyn CompletionTarget>,
    ) -> Self {
        Transfer {
            direction,
            token,
            buffer,
            target,
            done: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Queue index of the buffer.
    pub fn index(&self) -> u32 {
        self.buffer.index()
    }

    /// Number of bytes to transmit (output) or room to receive into (capture).
    pub fn len(&self) -> usize {
        match self.direction {
            Direction::Output => self.buffer.bytes_used(),
            Direction::Capture => self.buffer.capacity(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Data to transmit.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.data()[..self.len()]
    }

    /// Storage to receive into.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.buffer.data_mut()[..len]
    }

    /// Pointer to the payload for engines crossing an FFI boundary.
    ///
    /// Valid while the transfer is alive; the storage does not move when the
    /// transfer does.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buffer.data_mut().as_mut_ptr()
    }

    /// Report the transfer finished with `byte_count` bytes moved.
    ///
    /// For capture a count of zero marks the buffer as failed.
    pub fn complete(mut self, byte_count: usize) {
        self.finish(byte_count);
    }

    /// Take the buffer back without reporting a completion.
    pub(crate) fn reclaim(mut self) -> (Token, Buffer) {
        self.done = true;
        (self.token, mem::take(&mut self.buffer))
    }

    fn finish(&mut self, byte_count: usize) {
        if self.done {
            return;
        }
        self.done = true;
        let buffer = mem::take(&mut self.buffer);
        Arc::clone(&self.target).transfer_done(self.token, buffer, byte_count);
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if !self.done {
            log::debug!(
                "{} transfer of buffer {} dropped without completion",
                self.direction,
                self.buffer.index()
            );
            self.finish(0);
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("direction", &self.direction)
            .field("token", &self.token)
            .field("len", &self.len())
            .finish()
    }
}

/// A transfer the engine refused, returned untouched.
#[derive(Debug)]
pub struct Rejected {
    pub error: EngineError,
    pub transfer: Transfer,
}

impl Rejected {
    pub fn new(error: EngineError, transfer: Transfer) -> Self {
        Rejected { error, transfer }
    }
}
