// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! One direction of a device: pending queue, dispatch and session control.
//!
//! A [`Stream`] hands the head of its pending queue to the engine and waits
//! for that transfer to complete before sending the next one. The queue lock
//! is only held for queue and session bookkeeping; engine calls and sink
//! calls always happen with it released, so a completion arriving on an
//! engine thread never waits on a queue-layer operation in progress.

use crate::{
    buffer::{Buffer, BufferSink, BufferState},
    engine::{Engine, InstanceId},
    format::{Direction, Field},
    queue::{PendingQueue, Token},
    transfer::{CompletionTarget, Rejected, Transfer},
    Error,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Minimum number of buffers a queue is set up with: one in flight and one
/// waiting behind it.
pub const MIN_BUFFERS: u32 = 2;

/// Result of [`Stream::queue_setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSetup {
    /// Number of buffers to allocate
    pub count: u32,
    /// Size of each buffer in bytes
    pub plane_size: usize,
}

#[derive(Debug, Default)]
struct Session {
    armed: bool,
    sequence: u32,
    generation: u64,
    instance: Option<InstanceId>,
    field: Field,
}

impl Session {
    fn next_sequence(&mut self) -> u32 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// Give back the last number handed out.
    fn rewind_sequence(&mut self) {
        self.sequence = self.sequence.wrapping_sub(1);
    }
}

#[derive(Debug, Default)]
struct Inner {
    queue: PendingQueue,
    session: Session,
    reserved: u32,
}

struct StreamCore {
    direction: Direction,
    engine: Arc<dyn Engine>,
    sink: Arc<dyn BufferSink>,
    inner: Mutex<Inner>,
}

/// The buffer pipeline of one queue direction.
pub struct Stream {
    core: Arc<StreamCore>,
}

impl Stream {
    pub fn new(direction: Direction, engine: Arc<dyn Engine>, sink: Arc<dyn BufferSink>) -> Self {
        Stream {
            core: Arc::new(StreamCore {
                direction,
                engine,
                sink,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn direction(&self) -> Direction {
        self.core.direction
    }

    /// Whether a session is armed.
    pub fn is_streaming(&self) -> bool {
        self.core.lock().session.armed
    }

    /// Buffers in the queue, including one in flight.
    pub fn queued(&self) -> usize {
        self.core.lock().queue.len()
    }

    /// Queue index of the buffer currently at the engine.
    pub fn in_flight(&self) -> Option<u32> {
        self.core.lock().queue.in_flight().map(|token| token.index)
    }

    /// Number of buffers reserved by [`Stream::queue_setup`].
    pub fn reserved(&self) -> u32 {
        self.core.lock().reserved
    }

    /// A direction with reserved buffers or an armed session can't change
    /// format.
    pub fn is_busy(&self) -> bool {
        let inner = self.core.lock();
        inner.reserved > 0 || inner.session.armed
    }

    /// Negotiate buffer count and size.
    ///
    /// The total reserved count is raised to at least [`MIN_BUFFERS`]. A
    /// caller supplied plane size must hold a full image of `size_image`
    /// bytes.
    pub fn queue_setup(
        &self,
        count: u32,
        plane_size: Option<usize>,
        size_image: usize,
    ) -> Result<QueueSetup, Error> {
        if let Some(size) = plane_size {
            if size < size_image {
                log::error!("sizeimage too small ({} < {})", size, size_image);
                return Err(Error::InvalidArgument(format!(
                    "plane size {} is smaller than the image size {}",
                    size, size_image
                )));
            }
        }

        let mut inner = self.core.lock();
        if inner.session.armed {
            return Err(Error::Busy);
        }
        let count = count.max(MIN_BUFFERS.saturating_sub(inner.reserved));
        inner.reserved = inner.reserved.saturating_add(count);
        log::debug!(
            "{} queue setup: {} buffers ({} reserved)",
            self.core.direction,
            count,
            inner.reserved
        );

        Ok(QueueSetup {
            count,
            plane_size: plane_size.unwrap_or(size_image),
        })
    }

    /// Drop the buffer reservation.
    pub fn release_buffers(&self) -> Result<(), Error> {
        let mut inner = self.core.lock();
        if inner.session.armed {
            return Err(Error::Busy);
        }
        inner.reserved = 0;
        Ok(())
    }

    /// Admission check before a buffer is queued.
    pub fn buffer_prepare(buffer: &Buffer, size_image: usize) -> Result<(), Error> {
        if buffer.capacity() < size_image {
            log::error!("buffer too small ({} < {})", buffer.capacity(), size_image);
            return Err(Error::BufferTooSmall {
                size: buffer.capacity(),
                required: size_image,
            });
        }
        Ok(())
    }

    /// Append a buffer to the pending queue.
    ///
    /// When the session is armed and the queue was empty, the buffer is
    /// dispatched right away. A dispatch failure is returned but the buffer
    /// stays queued.
    pub fn buf_queue(&self, buffer: Buffer) -> Result<(), Error> {
        let index = buffer.index();
        let (was_empty, armed) = {
            let mut inner = self.core.lock();
            (inner.queue.push(buffer), inner.session.armed)
        };

        if !armed {
            log::debug!("buffer {} queued, streaming not started", index);
            return Ok(());
        }
        if !was_empty {
            log::debug!("buffer {} queued behind the head", index);
            return Ok(());
        }
        self.core.dispatch()
    }

    /// Hand every pending buffer back as [`BufferState::Queued`].
    ///
    /// Does nothing while a session is armed.
    pub fn return_queued(&self) {
        if self.is_streaming() {
            return;
        }
        self.core.return_all(BufferState::Queued);
    }

    /// Start a session on `instance` and dispatch the queue head.
    ///
    /// The sequence counter restarts at zero. If there is no instance, or the
    /// engine fails to start or to accept the first buffer, every queued
    /// buffer is returned as [`BufferState::Queued`] and the session stays
    /// disarmed. Starting an armed stream does nothing.
    pub fn start_streaming(&self, instance: Option<InstanceId>, field: Field) -> Result<(), Error> {
        let core = &self.core;
        {
            let mut inner = core.lock();
            if inner.session.armed {
                log::debug!("{} already streaming", core.direction);
                return Ok(());
            }
            let session = &mut inner.session;
            session.sequence = 0;
            session.generation = session.generation.wrapping_add(1);
            session.instance = instance;
            session.field = field;
        }

        let Some(instance) = instance else {
            log::error!("{} start streaming without an engine instance", core.direction);
            core.return_all(BufferState::Queued);
            return Err(Error::NotBound);
        };

        if let Err(err) = core.engine.start_streaming(instance) {
            log::error!("failed to start streaming on {}: {}", instance, err);
            core.return_all(BufferState::Queued);
            return Err(err.into());
        }

        core.lock().session.armed = true;
        log::debug!("{} streaming on instance {}", core.direction, instance);

        if let Err(err) = core.dispatch() {
            core.lock().session.armed = false;
            if let Err(stop) = core.engine.stop_streaming(instance) {
                log::error!("failed to stop streaming on {}: {}", instance, stop);
            }
            core.return_all(BufferState::Queued);
            return Err(err);
        }
        Ok(())
    }

    /// End the session and return every pending buffer as
    /// [`BufferState::Error`].
    ///
    /// A buffer still in flight comes back through its own completion, also
    /// as an error. Engine stop failures are logged only.
    pub fn stop_streaming(&self) {
        let core = &self.core;
        let (armed, instance, drained) = {
            let mut inner = core.lock();
            let armed = std::mem::take(&mut inner.session.armed);
            (armed, inner.session.instance, inner.queue.drain())
        };

        log::debug!(
            "{} stop streaming, returning {} buffers",
            core.direction,
            drained.len()
        );
        for buffer in drained {
            core.sink.buffer_done(buffer, BufferState::Error);
        }

        if let (true, Some(instance)) = (armed, instance) {
            if let Err(err) = core.engine.stop_streaming(instance) {
                log::error!("failed to stop streaming on {}: {}", instance, err);
            }
        }
    }
}

impl StreamCore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn return_all(&self, state: BufferState) {
        let drained = self.lock().queue.drain();
        for buffer in drained {
            self.sink.buffer_done(buffer, state);
        }
    }

    /// Send the queue head to the engine unless it is already in flight.
    fn dispatch(self: &Arc<Self>) -> Result<(), Error> {
        let (instance, token, buffer) = {
            let mut inner = self.lock();
            if !inner.session.armed {
                return Ok(());
            }
            let instance = inner.session.instance.ok_or(Error::NotBound)?;
            let generation = inner.session.generation;
            let Some(mut buffer) = inner.queue.begin_dispatch(generation) else {
                log::debug!("{} nothing to dispatch", self.direction);
                return Ok(());
            };
            if self.direction.is_output() {
                let sequence = inner.session.next_sequence();
                buffer.stamp(sequence, inner.session.field);
            }
            let token = Token {
                index: buffer.index(),
                generation,
            };
            (instance, token, buffer)
        };

        log::debug!(
            "{} dispatch buffer {} ({} bytes) to instance {}",
            self.direction,
            token.index,
            buffer.bytes_used(),
            instance
        );

        let target: Arc<dyn CompletionTarget> = self.clone();
        let transfer = Transfer::new(self.direction, token, buffer, target);
        match self.engine.start_transmission(instance, transfer) {
            Ok(()) => Ok(()),
            Err(Rejected { error, transfer }) => {
                log::error!("failed to start transmission: {}", error);
                let (token, buffer) = transfer.reclaim();
                let restored = {
                    let mut inner = self.lock();
                    let restored = inner.queue.restore(token, buffer);
                    // output numbers are taken at dispatch
                    if restored.is_ok() && self.direction.is_output() {
                        inner.session.rewind_sequence();
                    }
                    restored
                };
                if let Err(buffer) = restored {
                    self.sink.buffer_done(buffer, BufferState::Error);
                }
                Err(error.into())
            }
        }
    }
}

impl CompletionTarget for StreamCore {
    fn transfer_done(self: Arc<Self>, token: Token, mut buffer: Buffer, byte_count: usize) {
        let stamp = {
            let mut inner = self.lock();
            if !inner.queue.complete(token) {
                drop(inner);
                log::warn!(
                    "{} late completion of buffer {} ignored",
                    self.direction,
                    token.index
                );
                self.sink.buffer_done(buffer, BufferState::Error);
                return;
            }
            match self.direction {
                Direction::Output => None,
                Direction::Capture => {
                    Some((inner.session.next_sequence(), inner.session.field))
                }
            }
        };

        let state = match stamp {
            None => BufferState::Done,
            Some((sequence, field)) => {
                buffer.stamp(sequence, field);
                buffer.set_received(byte_count);
                if byte_count == 0 {
                    BufferState::Error
                } else {
                    BufferState::Done
                }
            }
        };

        log::debug!(
            "{} buffer {} complete ({} bytes) {}",
            self.direction,
            token.index,
            byte_count,
            state
        );
        self.sink.buffer_done(buffer, state);

        if let Err(err) = self.dispatch() {
            log::error!("{} failed to dispatch next buffer: {}", self.direction, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::{done_queue, DoneQueue},
        engine::{EngineError, Mpeg2tsConfig, RegistrationId, VideoConfig},
        format::MediaType,
    };

    /// Holds every accepted transfer until the test completes it.
    #[derive(Default)]
    struct HoldEngine {
        held: Mutex<Vec<Transfer>>,
        refuse: Mutex<bool>,
    }

    impl HoldEngine {
        fn take(&self) -> Transfer {
            self.held.lock().unwrap().remove(0)
        }

        fn held(&self) -> usize {
            self.held.lock().unwrap().len()
        }
    }

    impl Engine for HoldEngine {
        fn register_adapter_media(
            &self,
            _media: MediaType,
            _name: &str,
            _device_node: &str,
        ) -> Result<RegistrationId, EngineError> {
            Ok(RegistrationId(0))
        }

        fn unregister_adapter_media(&self, _: RegistrationId) -> Result<(), EngineError> {
            Ok(())
        }

        fn open(&self, _: RegistrationId, _: Direction) -> Result<InstanceId, EngineError> {
            Ok(InstanceId(0))
        }

        fn close(&self, _: InstanceId) -> Result<(), EngineError> {
            Ok(())
        }

        fn video_config(&self, _: InstanceId) -> Result<VideoConfig, EngineError> {
            Ok(VideoConfig::default())
        }

        fn set_video_config(&self, _: InstanceId, _: &VideoConfig) -> Result<(), EngineError> {
            Ok(())
        }

        fn mpeg2ts_config(&self, _: InstanceId) -> Result<Mpeg2tsConfig, EngineError> {
            Ok(Mpeg2tsConfig::default())
        }

        fn set_mpeg2ts_config(&self, _: InstanceId, _: &Mpeg2tsConfig) -> Result<(), EngineError> {
            Ok(())
        }

        fn start_streaming(&self, _: InstanceId) -> Result<(), EngineError> {
            Ok(())
        }

        fn stop_streaming(&self, _: InstanceId) -> Result<(), EngineError> {
            Ok(())
        }

        fn start_transmission(
            &self,
            _: InstanceId,
            transfer: Transfer,
        ) -> Result<(), Rejected> {
            if *self.refuse.lock().unwrap() {
                return Err(Rejected::new(
                    EngineError::new("start_transmission", -16),
                    transfer,
                ));
            }
            self.held.lock().unwrap().push(transfer);
            Ok(())
        }
    }

    fn stream(direction: Direction) -> (Arc<HoldEngine>, Stream, DoneQueue) {
        let engine = Arc::new(HoldEngine::default());
        let (sink, done) = done_queue();
        let stream = Stream::new(direction, engine.clone(), Arc::new(sink));
        (engine, stream, done)
    }

    #[test]
    fn test_queue_setup_minimum() {
        let (_, stream, _) = stream(Direction::Capture);
        let setup = stream.queue_setup(1, None, 1024).unwrap();
        assert_eq!(setup, QueueSetup { count: 2, plane_size: 1024 });

        let setup = stream.queue_setup(1, Some(2048), 1024).unwrap();
        assert_eq!(setup.count, 1);
        assert_eq!(setup.plane_size, 2048);
        assert_eq!(stream.reserved(), 3);

        assert!(stream.queue_setup(4, Some(512), 1024).is_err());
        stream.release_buffers().unwrap();
        assert!(!stream.is_busy());
    }

    #[test]
    fn test_buffer_prepare() {
        assert!(Stream::buffer_prepare(&Buffer::new(0, 100), 100).is_ok());
        assert!(matches!(
            Stream::buffer_prepare(&Buffer::new(0, 99), 100),
            Err(Error::BufferTooSmall { size: 99, required: 100 })
        ));
    }

    #[test]
    fn test_no_dispatch_before_start() {
        let (engine, stream, _) = stream(Direction::Output);
        stream.buf_queue(Buffer::new(0, 8)).unwrap();
        assert_eq!(engine.held(), 0);
        assert_eq!(stream.queued(), 1);
    }

    #[test]
    fn test_completion_dispatches_next() {
        let (engine, stream, done) = stream(Direction::Capture);
        for i in 0..2 {
            stream.buf_queue(Buffer::new(i, 8)).unwrap();
        }
        stream.start_streaming(Some(InstanceId(0)), Field::None).unwrap();
        assert_eq!(stream.in_flight(), Some(0));
        assert_eq!(engine.held(), 1);

        engine.take().complete(5);
        let first = done.try_dequeue().unwrap();
        assert_eq!(first.state, BufferState::Done);
        assert_eq!(first.buffer.bytes_used(), 5);
        assert_eq!(first.buffer.sequence(), 0);
        assert_eq!(stream.in_flight(), Some(1));

        engine.take().complete(0);
        let second = done.try_dequeue().unwrap();
        assert_eq!(second.state, BufferState::Error);
        assert_eq!(second.buffer.sequence(), 1);
        assert_eq!(stream.queued(), 0);
    }

    #[test]
    fn test_refused_dispatch_requeues() {
        let (engine, stream, done) = stream(Direction::Output);
        *engine.refuse.lock().unwrap() = true;
        stream.buf_queue(Buffer::new(0, 8)).unwrap();
        stream.buf_queue(Buffer::new(1, 8)).unwrap();

        let err = stream.start_streaming(Some(InstanceId(0)), Field::None);
        assert!(matches!(err, Err(Error::Engine(_))));
        assert!(!stream.is_streaming());

        let returned = done.drain();
        assert_eq!(returned.len(), 2);
        assert!(returned.iter().all(|c| c.state == BufferState::Queued));
        assert_eq!(returned[0].buffer.index(), 0);
    }

    #[test]
    fn test_refused_output_keeps_sequence() {
        let (engine, stream, done) = stream(Direction::Output);
        stream.buf_queue(Buffer::new(0, 8)).unwrap();
        stream.buf_queue(Buffer::new(1, 8)).unwrap();
        stream.start_streaming(Some(InstanceId(0)), Field::None).unwrap();

        *engine.refuse.lock().unwrap() = true;
        engine.take().complete(8);
        assert_eq!(done.try_dequeue().unwrap().buffer.sequence(), 0);
        assert_eq!(stream.in_flight(), None);
        assert_eq!(stream.queued(), 1);
        assert_eq!(stream.core.lock().session.sequence, 1);

        *engine.refuse.lock().unwrap() = false;
        stream.core.dispatch().unwrap();
        engine.take().complete(8);
        let second = done.try_dequeue().unwrap();
        assert_eq!(second.buffer.index(), 1);
        assert_eq!(second.buffer.sequence(), 1);
    }

    #[test]
    fn test_late_completion_after_stop() {
        let (engine, stream, done) = stream(Direction::Output);
        stream.buf_queue(Buffer::new(0, 8)).unwrap();
        stream.buf_queue(Buffer::new(1, 8)).unwrap();
        stream.start_streaming(Some(InstanceId(0)), Field::None).unwrap();

        stream.stop_streaming();
        let drained = done.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].buffer.index(), 1);

        engine.take().complete(8);
        let late = done.try_dequeue().unwrap();
        assert_eq!(late.buffer.index(), 0);
        assert_eq!(late.state, BufferState::Error);
        assert_eq!(engine.held(), 0);
    }

    #[test]
    fn test_start_without_instance() {
        let (_, stream, done) = stream(Direction::Capture);
        stream.buf_queue(Buffer::new(0, 8)).unwrap();
        assert!(matches!(
            stream.start_streaming(None, Field::None),
            Err(Error::NotBound)
        ));
        assert_eq!(done.try_dequeue().unwrap().state, BufferState::Queued);
    }
}
