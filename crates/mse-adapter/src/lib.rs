// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! MSE Adapter Library for Rust
//!
//! Adapts a video buffer queue device (separate capture and output queues) to
//! the Media Streaming Engine, an asynchronous single-buffer-at-a-time engine
//! transmitting and receiving media over an AVB network transport.
//!
//! Buffers submitted by the queue layer wait in a per-direction FIFO. The
//! head buffer is handed to the engine as a [`transfer::Transfer`]; when the
//! engine completes it, the buffer is returned to the queue layer with its
//! status, sequence number and timestamp, and the next head is dispatched.
//! Exactly one buffer per direction is ever in flight.
//!
//! # Quick Start
//!
//! ```no_run
//! use mse_adapter::adapter::{Adapter, AdapterConfig};
//! use mse_adapter::buffer::Buffer;
//! use mse_adapter::format::Direction;
//! use mse_adapter::loopback::LoopbackEngine;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Arc::new(LoopbackEngine::new());
//! let adapter = Adapter::new(&AdapterConfig::default(), engine)?;
//! let device = adapter.device(0).expect("device 0");
//!
//! device.open()?;
//! let setup = device.queue_setup(Direction::Capture, 4, None)?;
//! for index in 0..setup.count {
//!     device
//!         .queue_buffer(Direction::Capture, Buffer::new(index, setup.plane_size))
//!         .map_err(|err| err.error)?;
//! }
//! device.streamon(Direction::Capture)?;
//!
//! if let Some(done) = device.dequeue(Direction::Capture, Duration::from_millis(100)) {
//!     println!("frame {} ({} bytes)", done.buffer.sequence(), done.buffer.bytes_used());
//! }
//!
//! device.streamoff(Direction::Capture)?;
//! device.release()?;
//! # Ok::<(), mse_adapter::Error>(())
//! ```
//!
//! # Engine Backends
//!
//! - [`mse::MseEngine`] - the engine C library loaded at runtime through
//!   `mse-sys` (`libmse.so`, overridable with `MSE_LIBRARY`)
//! - [`loopback::LoopbackEngine`] - an in-process engine completing transfers
//!   on a worker thread, for simulation and testing

use std::{error, fmt};

pub use engine::EngineError;
pub use fourcc::FourCC;

/// Error type for adapter operations
#[derive(Debug)]
pub enum Error {
    /// The engine library (libmse.so) could not be loaded at runtime
    LibraryNotLoaded(mse_sys::libloading::Error),

    /// An engine call returned a failure status
    Engine(EngineError),

    /// A request argument was rejected before any state changed
    InvalidArgument(String),

    /// Buffer backing storage is smaller than the negotiated image size
    BufferTooSmall { size: usize, required: usize },

    /// The pixel format has no engine codec mapping
    UnsupportedFormat(FourCC),

    /// The queue has reserved buffers or is streaming
    Busy,

    /// The device node is in the wrong open state for the request
    PermissionDenied(&'static str),

    /// No engine instance is bound to the device
    NotBound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LibraryNotLoaded(err) => {
                write!(f, "MSE library could not be loaded: {}", err)
            }
            Error::Engine(err) => write!(f, "Engine error: {}", err),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::BufferTooSmall { size, required } => {
                write!(f, "Buffer too small ({} < {})", size, required)
            }
            Error::UnsupportedFormat(fourcc) => write!(f, "Unsupported format: {}", fourcc),
            Error::Busy => write!(f, "Queue is busy"),
            Error::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Error::NotBound => write!(f, "No engine instance is bound"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::LibraryNotLoaded(err) => Some(err),
            Error::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<mse_sys::libloading::Error> for Error {
    fn from(err: mse_sys::libloading::Error) -> Self {
        Error::LibraryNotLoaded(err)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Engine(err)
    }
}

/// The fourcc module provides the pixel format codes used by the adapter.
pub mod fourcc;

/// The format module provides format tables, negotiation and frame intervals.
pub mod format;

/// The buffer module provides queue buffers and the completion sink.
pub mod buffer;

/// The queue module provides the pending buffer FIFO.
pub mod queue;

/// The engine module provides the streaming engine interface.
pub mod engine;

/// The transfer module provides the in-flight buffer handle given to engines.
pub mod transfer;

/// The binding module provides the engine lifecycle state machine.
pub mod binding;

/// The stream module provides dispatch, completion and session control.
pub mod stream;

/// The device module provides the adapter video device.
pub mod device;

/// The adapter module provides configuration and the device collection.
pub mod adapter;

/// The mse module provides the engine backed by the runtime-loaded library.
pub mod mse;

/// The loopback module provides an in-process engine.
pub mod loopback;
