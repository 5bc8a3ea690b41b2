// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! The streaming engine interface.
//!
//! The adapter drives an engine only through the calls of [`Engine`]. Every
//! call is synchronous from the adapter's side; the single asynchronous path
//! is the completion of a [`Transfer`], which the engine reports exactly once
//! per accepted [`Engine::start_transmission`].

use crate::{
    format::{Direction, MediaType},
    transfer::{Rejected, Transfer},
};
use std::{error, fmt};

/// An engine call returned a failure status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineError {
    call: &'static str,
    code: i32,
}

impl EngineError {
    pub fn new(call: &'static str, code: i32) -> Self {
        EngineError { call, code }
    }

    /// Name of the engine entry point that failed.
    pub fn call(&self) -> &'static str {
        self.call
    }

    /// Status code returned by the engine (negative errno style).
    pub fn code(&self) -> i32 {
        self.code
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed with status {}", self.call, self.code)
    }
}

impl error::Error for EngineError {}

/// Index returned by `register_adapter_media`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u32);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an opened engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Codec of an elementary video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoFormat {
    /// H.264 Annex B byte stream (start codes)
    #[default]
    H264ByteStream,
    /// H.264 AVC (length prefixed, no start codes)
    H264Avc,
    Mjpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRate {
    pub n: u32,
    pub m: u32,
}

/// Video stream configuration of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoConfig {
    pub format: VideoFormat,
    pub bitrate: u32,
    pub frame_rate: FrameRate,
    pub bytes_per_frame: u32,
    pub class_interval_frames: u32,
    pub max_payload_size: u32,
}

/// MPEG-2 TS configuration of an engine instance.
///
/// The adapter only round-trips it; none of the fields are derived from the
/// device format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mpeg2tsConfig {
    pub tspackets_per_frame: u32,
    pub bitrate: u32,
    pub pcr_pid: u32,
}

/// A media streaming engine.
///
/// Implementations must deliver exactly one completion (or drop, which
/// completes with zero bytes) for each transfer they accept, and must not
/// complete transfers for an instance once its streaming has stopped.
/// Completions may run on any thread but never from inside a call the adapter
/// is making into the engine.
///
/// The capture and output queues of a device share one instance, and each
/// calls `start_streaming` and `stop_streaming` once per session. An engine
/// that keeps the instance running until the last started queue stops lets
/// the other direction carry on; a transfer of the stopped direction that
/// completes afterwards comes back to the queue layer as an error.
pub trait Engine: Send + Sync {
    fn register_adapter_media(
        &self,
        media: MediaType,
        name: &str,
        device_node: &str,
    ) -> Result<RegistrationId, EngineError>;

    fn unregister_adapter_media(&self, registration: RegistrationId) -> Result<(), EngineError>;

    /// Open an instance; `Output` opens it for transmission.
    fn open(
        &self,
        registration: RegistrationId,
        direction: Direction,
    ) -> Result<InstanceId, EngineError>;

    fn close(&self, instance: InstanceId) -> Result<(), EngineError>;

    fn video_config(&self, instance: InstanceId) -> Result<VideoConfig, EngineError>;

    fn set_video_config(
        &self,
        instance: InstanceId,
        config: &VideoConfig,
    ) -> Result<(), EngineError>;

    fn mpeg2ts_config(&self, instance: InstanceId) -> Result<Mpeg2tsConfig, EngineError>;

    fn set_mpeg2ts_config(
        &self,
        instance: InstanceId,
        config: &Mpeg2tsConfig,
    ) -> Result<(), EngineError>;

    fn start_streaming(&self, instance: InstanceId) -> Result<(), EngineError>;

    fn stop_streaming(&self, instance: InstanceId) -> Result<(), EngineError>;

    /// Hand one buffer to the engine.
    ///
    /// On refusal the engine returns the transfer untouched inside
    /// [`Rejected`] and no completion follows.
    fn start_transmission(&self, instance: InstanceId, transfer: Transfer)
        -> Result<(), Rejected>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error() {
        let err = EngineError::new("mse_start_streaming", -5);
        assert_eq!(err.call(), "mse_start_streaming");
        assert_eq!(err.code(), -5);
        assert_eq!(format!("{}", err), "mse_start_streaming failed with status -5");
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(format!("{}", RegistrationId(3)), "3");
        assert_eq!(format!("{}", InstanceId(0)), "0");
    }
}
