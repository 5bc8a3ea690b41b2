// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    engine::{Engine, EngineError, InstanceId, Mpeg2tsConfig, RegistrationId, VideoConfig},
    format::{Direction, MediaType},
    transfer::{Rejected, Transfer},
};
use crossbeam_channel::{SendError, Sender};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

const ENOENT: i32 = -2;
const ENOMEM: i32 = -12;
const EPIPE: i32 = -32;

/// Transfer counters of a [`LoopbackEngine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackStats {
    /// Transfers completed with data
    pub frames: u64,
    /// Bytes received or transmitted
    pub bytes: u64,
    /// Capture transfers completed empty
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    bytes: AtomicU64,
    failed: AtomicU64,
}

struct Worker {
    tx: Sender<Transfer>,
    stopping: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn stop(self) {
        self.stopping.store(true, Ordering::SeqCst);
        drop(self.tx);
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            log::error!("loopback worker panicked");
        }
    }
}

struct Instance {
    registration: RegistrationId,
    direction: Direction,
    video: VideoConfig,
    mpeg2ts: Mpeg2tsConfig,
    /// Started streams, one per direction
    streams: u32,
    worker: Option<Worker>,
}

#[derive(Default)]
struct LoopState {
    next_registration: u32,
    registrations: HashMap<RegistrationId, MediaType>,
    next_instance: u32,
    instances: HashMap<InstanceId, Instance>,
}

/// An in-process engine completing transfers on a worker thread.
///
/// Every streaming instance gets a worker fed through a channel. Capture
/// transfers are filled with a synthetic frame, output transfers are consumed
/// whole. Both directions of a device stream on the same instance, so the
/// worker starts with the first `start_streaming` and is joined by the
/// matching last `stop_streaming`; no completion for the instance runs after
/// that returns.
pub struct LoopbackEngine {
    frame_size: Option<usize>,
    frame_delay: Duration,
    counters: Arc<Counters>,
    state: Mutex<LoopState>,
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        LoopbackEngine::new()
    }
}

impl LoopbackEngine {
    /// Capture frames fill the whole buffer and complete immediately.
    pub fn new() -> Self {
        LoopbackEngine {
            frame_size: None,
            frame_delay: Duration::ZERO,
            counters: Arc::new(Counters::default()),
            state: Mutex::new(LoopState::default()),
        }
    }

    /// Size of received capture frames; zero makes every receive fail.
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = Some(frame_size);
        self
    }

    /// Time each transfer takes.
    pub fn with_frame_delay(mut self, frame_delay: Duration) -> Self {
        self.frame_delay = frame_delay;
        self
    }

    pub fn stats(&self) -> LoopbackStats {
        LoopbackStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Number of registered adapter media.
    pub fn registrations(&self) -> usize {
        self.lock().registrations.len()
    }

    /// Number of open instances.
    pub fn instances(&self) -> usize {
        self.lock().instances.len()
    }

    pub fn is_streaming(&self, instance: InstanceId) -> bool {
        self.lock()
            .instances
            .get(&instance)
            .is_some_and(|inst| inst.worker.is_some())
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_worker(&self, instance: InstanceId) -> std::io::Result<Worker> {
        let (tx, rx) = crossbeam_channel::unbounded::<Transfer>();
        let stopping = Arc::new(AtomicBool::new(false));
        let frame_size = self.frame_size;
        let frame_delay = self.frame_delay;
        let counters = self.counters.clone();
        let stop = stopping.clone();

        let handle = thread::Builder::new()
            .name(format!("mse-loopback-{}", instance))
            .spawn(move || {
                let mut frame: u8 = 0;
                for mut transfer in rx.iter() {
                    if stop.load(Ordering::SeqCst) {
                        // completes empty
                        drop(transfer);
                        continue;
                    }
                    if !frame_delay.is_zero() {
                        thread::sleep(frame_delay);
                    }

                    let len = match transfer.direction() {
                        Direction::Capture => {
                            let len = frame_size.unwrap_or(usize::MAX).min(transfer.len());
                            transfer.payload_mut()[..len].fill(frame);
                            frame = frame.wrapping_add(1);
                            len
                        }
                        Direction::Output => transfer.len(),
                    };

                    if len == 0 && transfer.direction() == Direction::Capture {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        counters.frames.fetch_add(1, Ordering::Relaxed);
                        counters.bytes.fetch_add(len as u64, Ordering::Relaxed);
                    }
                    transfer.complete(len);
                }
                log::debug!("loopback worker for instance {} exiting", instance);
            })?;

        Ok(Worker {
            tx,
            stopping,
            handle,
        })
    }

    /// Count one stream out, taking the worker when it was the last.
    fn release_stream(&self, instance: InstanceId) -> Result<Option<Worker>, EngineError> {
        let mut state = self.lock();
        let inst = state
            .instances
            .get_mut(&instance)
            .ok_or(EngineError::new("stop_streaming", ENOENT))?;
        if inst.streams == 0 {
            return Ok(None);
        }
        inst.streams -= 1;
        if inst.streams > 0 {
            log::debug!(
                "loopback instance {} keeps streaming for {} more",
                instance,
                inst.streams
            );
            return Ok(None);
        }
        Ok(inst.worker.take())
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        let workers: Vec<Worker> = self
            .lock()
            .instances
            .values_mut()
            .filter_map(|inst| inst.worker.take())
            .collect();
        for worker in workers {
            worker.stop();
        }
    }
}

impl Engine for LoopbackEngine {
    fn register_adapter_media(
        &self,
        media: MediaType,
        name: &str,
        device_node: &str,
    ) -> Result<RegistrationId, EngineError> {
        let mut state = self.lock();
        let registration = RegistrationId(state.next_registration);
        state.next_registration += 1;
        state.registrations.insert(registration, media);
        log::debug!(
            "loopback registered {} ({}) at {} as {}",
            name,
            media,
            device_node,
            registration
        );
        Ok(registration)
    }

    fn unregister_adapter_media(&self, registration: RegistrationId) -> Result<(), EngineError> {
        self.lock()
            .registrations
            .remove(&registration)
            .map(|_| ())
            .ok_or(EngineError::new("unregister_adapter_media", ENOENT))
    }

    fn open(
        &self,
        registration: RegistrationId,
        direction: Direction,
    ) -> Result<InstanceId, EngineError> {
        let mut state = self.lock();
        if !state.registrations.contains_key(&registration) {
            return Err(EngineError::new("open", ENOENT));
        }
        let instance = InstanceId(state.next_instance);
        state.next_instance += 1;
        state.instances.insert(
            instance,
            Instance {
                registration,
                direction,
                video: VideoConfig::default(),
                mpeg2ts: Mpeg2tsConfig::default(),
                streams: 0,
                worker: None,
            },
        );
        Ok(instance)
    }

    fn close(&self, instance: InstanceId) -> Result<(), EngineError> {
        let removed = self
            .lock()
            .instances
            .remove(&instance)
            .ok_or(EngineError::new("close", ENOENT))?;
        log::debug!(
            "loopback closed {} instance {} of {}",
            removed.direction,
            instance,
            removed.registration
        );
        if let Some(worker) = removed.worker {
            worker.stop();
        }
        Ok(())
    }

    fn video_config(&self, instance: InstanceId) -> Result<VideoConfig, EngineError> {
        self.lock()
            .instances
            .get(&instance)
            .map(|inst| inst.video)
            .ok_or(EngineError::new("get_video_config", ENOENT))
    }

    fn set_video_config(
        &self,
        instance: InstanceId,
        config: &VideoConfig,
    ) -> Result<(), EngineError> {
        let mut state = self.lock();
        let inst = state
            .instances
            .get_mut(&instance)
            .ok_or(EngineError::new("set_video_config", ENOENT))?;
        inst.video = *config;
        Ok(())
    }

    fn mpeg2ts_config(&self, instance: InstanceId) -> Result<Mpeg2tsConfig, EngineError> {
        self.lock()
            .instances
            .get(&instance)
            .map(|inst| inst.mpeg2ts)
            .ok_or(EngineError::new("get_mpeg2ts_config", ENOENT))
    }

    fn set_mpeg2ts_config(
        &self,
        instance: InstanceId,
        config: &Mpeg2tsConfig,
    ) -> Result<(), EngineError> {
        let mut state = self.lock();
        let inst = state
            .instances
            .get_mut(&instance)
            .ok_or(EngineError::new("set_mpeg2ts_config", ENOENT))?;
        inst.mpeg2ts = *config;
        Ok(())
    }

    fn start_streaming(&self, instance: InstanceId) -> Result<(), EngineError> {
        let mut state = self.lock();
        let inst = state
            .instances
            .get_mut(&instance)
            .ok_or(EngineError::new("start_streaming", ENOENT))?;
        if inst.worker.is_some() {
            inst.streams += 1;
            return Ok(());
        }
        let worker = self.spawn_worker(instance).map_err(|err| {
            log::error!("failed to spawn loopback worker: {}", err);
            EngineError::new("start_streaming", ENOMEM)
        })?;
        inst.worker = Some(worker);
        inst.streams = 1;
        Ok(())
    }

    fn stop_streaming(&self, instance: InstanceId) -> Result<(), EngineError> {
        if let Some(worker) = self.release_stream(instance)? {
            worker.stop();
        }
        Ok(())
    }

    fn start_transmission(
        &self,
        instance: InstanceId,
        transfer: Transfer,
    ) -> Result<(), Rejected> {
        let state = self.lock();
        let Some(worker) = state
            .instances
            .get(&instance)
            .and_then(|inst| inst.worker.as_ref())
        else {
            return Err(Rejected::new(
                EngineError::new("start_transmission", EPIPE),
                transfer,
            ));
        };

        worker.tx.send(transfer).map_err(|SendError(transfer)| {
            Rejected::new(EngineError::new("start_transmission", EPIPE), transfer)
        })
    }
}
