// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Pending buffer FIFO for one direction of one device.
//!
//! The head of the queue is either waiting for dispatch or in flight at the
//! engine. An in-flight head stays in the queue as a [`Token`] until its
//! completion pops it, so the next dispatch always sees it and cannot send a
//! second buffer. Every operation here is non-blocking and never calls out of
//! the adapter; callers hold the direction's queue lock around it.

use crate::buffer::Buffer;
use std::collections::VecDeque;

/// Identity of an in-flight buffer.
///
/// `generation` is bumped by every session start, so a completion from an
/// earlier session never matches the current head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub index: u32,
    pub generation: u64,
}

#[derive(Debug)]
pub enum Slot {
    Pending(Buffer),
    InFlight(Token),
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    slots: VecDeque<Slot>,
}

impl PendingQueue {
    pub fn new() -> Self {
        PendingQueue::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append at the tail; returns whether the queue was empty before.
    pub fn push(&mut self, buffer: Buffer) -> bool {
        let was_empty = self.slots.is_empty();
        self.slots.push_back(Slot::Pending(buffer));
        was_empty
    }

    pub fn in_flight(&self) -> Option<Token> {
        match self.slots.front() {
            Some(Slot::InFlight(token)) => Some(*token),
            _ => None,
        }
    }

    /// Take the head buffer for dispatch, leaving `token` in its place.
    ///
    /// Returns `None` when the queue is empty or the head is already in
    /// flight.
    pub fn begin_dispatch(&mut self, generation: u64) -> Option<Buffer> {
        let head = self.slots.front_mut()?;
        let buffer = match head {
            Slot::InFlight(_) => return None,
            Slot::Pending(buffer) => std::mem::take(buffer),
        };
        *head = Slot::InFlight(Token {
            index: buffer.index(),
            generation,
        });
        Some(buffer)
    }

    /// Put a buffer the engine refused back at the head.
    ///
    /// Returns the buffer when `token` is no longer the head (the queue was
    /// drained while the engine call was outstanding).
    pub fn restore(&mut self, token: Token, buffer: Buffer) -> Result<(), Buffer> {
        if self.in_flight() != Some(token) {
            return Err(buffer);
        }
        match self.slots.front_mut() {
            Some(head) => {
                *head = Slot::Pending(buffer);
                Ok(())
            }
            None => Err(buffer),
        }
    }

    /// Pop the head if it is the in-flight `token`.
    pub fn complete(&mut self, token: Token) -> bool {
        if self.in_flight() == Some(token) {
            self.slots.pop_front();
            true
        } else {
            false
        }
    }

    /// Remove every slot, returning the buffers still pending in FIFO order.
    ///
    /// An in-flight slot is dropped; its buffer comes back through the
    /// engine's completion as a late completion.
    pub fn drain(&mut self) -> Vec<Buffer> {
        self.slots
            .drain(..)
            .filter_map(|slot| match slot {
                Slot::Pending(buffer) => Some(buffer),
                Slot::InFlight(_) => None,
            })
            .collect()
    }
}
