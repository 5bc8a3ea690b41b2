// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Scripted engine shared by the integration tests.
//
// The engine records every call, keeps accepted transfers until a test
// completes them, and fails any named call on request. Stopping an instance
// drops its held transfers, which completes them with zero bytes.

#![allow(dead_code)]

use mse_adapter::{
    buffer::{Buffer, Completed},
    device::Device,
    engine::{
        Engine, EngineError, InstanceId, Mpeg2tsConfig, RegistrationId, VideoConfig,
    },
    format::{Direction, MediaType, PixFormat},
    transfer::{Rejected, Transfer},
    FourCC,
};
use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register(MediaType, String, String),
    Unregister(RegistrationId),
    Open(RegistrationId, Direction),
    Close(InstanceId),
    GetVideoConfig(InstanceId),
    SetVideoConfig(InstanceId, VideoConfig),
    GetMpeg2tsConfig(InstanceId),
    SetMpeg2tsConfig(InstanceId),
    StartStreaming(InstanceId),
    StopStreaming(InstanceId),
    Transmit { instance: InstanceId, index: u32, len: usize },
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    failing: HashSet<&'static str>,
    register_limit: Option<usize>,
    registered: usize,
    next_instance: u32,
}

#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<Script>,
    held: Mutex<VecDeque<Transfer>>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedEngine::default())
    }

    /// Make every later call of `name` fail.
    pub fn fail(&self, name: &'static str) {
        self.script.lock().unwrap().failing.insert(name);
    }

    pub fn heal(&self, name: &'static str) {
        self.script.lock().unwrap().failing.remove(name);
    }

    /// Let `count` registrations succeed, then fail the rest.
    pub fn register_limit(&self, count: usize) {
        self.script.lock().unwrap().register_limit = Some(count);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.script.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    /// Buffer indices handed to the engine, in order.
    pub fn transmitted(&self) -> Vec<u32> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Transmit { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Take the oldest held transfer out of the engine.
    pub fn take(&self) -> Transfer {
        self.held
            .lock()
            .unwrap()
            .pop_front()
            .expect("no transfer in flight")
    }

    /// Complete the oldest held transfer, returning its buffer index.
    pub fn complete_next(&self, byte_count: usize) -> u32 {
        let transfer = self.take();
        let index = transfer.index();
        transfer.complete(byte_count);
        index
    }

    fn record(&self, call: Call, name: &'static str) -> Result<(), EngineError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        if script.failing.contains(name) {
            return Err(EngineError::new(name, -5));
        }
        Ok(())
    }
}

impl Engine for ScriptedEngine {
    fn register_adapter_media(
        &self,
        media: MediaType,
        name: &str,
        device_node: &str,
    ) -> Result<RegistrationId, EngineError> {
        self.record(
            Call::Register(media, name.to_string(), device_node.to_string()),
            "register_adapter_media",
        )?;
        let mut script = self.script.lock().unwrap();
        if script.register_limit.is_some_and(|limit| script.registered >= limit) {
            return Err(EngineError::new("register_adapter_media", -12));
        }
        let registration = RegistrationId(script.registered as u32);
        script.registered += 1;
        Ok(registration)
    }

    fn unregister_adapter_media(&self, registration: RegistrationId) -> Result<(), EngineError> {
        self.record(Call::Unregister(registration), "unregister_adapter_media")
    }

    fn open(
        &self,
        registration: RegistrationId,
        direction: Direction,
    ) -> Result<InstanceId, EngineError> {
        self.record(Call::Open(registration, direction), "open")?;
        let mut script = self.script.lock().unwrap();
        let instance = InstanceId(script.next_instance);
        script.next_instance += 1;
        Ok(instance)
    }

    fn close(&self, instance: InstanceId) -> Result<(), EngineError> {
        self.record(Call::Close(instance), "close")
    }

    fn video_config(&self, instance: InstanceId) -> Result<VideoConfig, EngineError> {
        self.record(Call::GetVideoConfig(instance), "video_config")?;
        Ok(VideoConfig::default())
    }

    fn set_video_config(
        &self,
        instance: InstanceId,
        config: &VideoConfig,
    ) -> Result<(), EngineError> {
        self.record(Call::SetVideoConfig(instance, *config), "set_video_config")
    }

    fn mpeg2ts_config(&self, instance: InstanceId) -> Result<Mpeg2tsConfig, EngineError> {
        self.record(Call::GetMpeg2tsConfig(instance), "mpeg2ts_config")?;
        Ok(Mpeg2tsConfig::default())
    }

    fn set_mpeg2ts_config(
        &self,
        instance: InstanceId,
        _config: &Mpeg2tsConfig,
    ) -> Result<(), EngineError> {
        self.record(Call::SetMpeg2tsConfig(instance), "set_mpeg2ts_config")
    }

    fn start_streaming(&self, instance: InstanceId) -> Result<(), EngineError> {
        self.record(Call::StartStreaming(instance), "start_streaming")
    }

    fn stop_streaming(&self, instance: InstanceId) -> Result<(), EngineError> {
        let result = self.record(Call::StopStreaming(instance), "stop_streaming");
        // Quiesce: outstanding transfers complete empty before stop returns.
        let dropped: Vec<Transfer> = self.held.lock().unwrap().drain(..).collect();
        drop(dropped);
        result
    }

    fn start_transmission(
        &self,
        instance: InstanceId,
        transfer: Transfer,
    ) -> Result<(), Rejected> {
        let call = Call::Transmit {
            instance,
            index: transfer.index(),
            len: transfer.len(),
        };
        if let Err(err) = self.record(call, "start_transmission") {
            return Err(Rejected::new(err, transfer));
        }
        self.held.lock().unwrap().push_back(transfer);
        Ok(())
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small H.264 frames (80x80) keep test buffers cheap.
pub fn small_format() -> PixFormat {
    PixFormat::new(FourCC::H264, 80, 80)
}

/// A registered, opened video device on `engine` using [`small_format`].
pub fn open_device(engine: &Arc<ScriptedEngine>, media: MediaType) -> Device {
    let device = Device::new(engine.clone(), media, "MSE Adapter 0", "MSE Device 0", 0);
    if media == MediaType::Video {
        device.set_format(Direction::Output, small_format()).unwrap();
    }
    device.register_media().unwrap();
    device.open().unwrap();
    device
}

pub fn buffer(device: &Device, index: u32) -> Buffer {
    Buffer::new(index, device.format().plane_size())
}

pub fn queue(device: &Device, direction: Direction, indices: impl IntoIterator<Item = u32>) {
    for index in indices {
        device
            .queue_buffer(direction, buffer(device, index))
            .unwrap();
    }
}

pub fn indices(completed: &[Completed]) -> Vec<u32> {
    completed.iter().map(|c| c.buffer.index()).collect()
}
