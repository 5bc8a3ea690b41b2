// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    binding::{EngineBinding, Lifecycle},
    buffer::{done_queue, Buffer, Completed, DoneQueue},
    engine::{Engine, FrameRate, InstanceId, VideoFormat},
    format::{self, Direction, FormatDesc, Fract, FrameSizeRange, MediaType, PixFormat},
    fourcc::FourCC,
    stream::{QueueSetup, Stream},
    Error,
};
use serde::Serialize;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// Driver name reported by [`Device::capabilities`].
pub const DRIVER_NAME: &str = "mse-adapter";

pub const CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const CAP_VIDEO_OUTPUT: u32 = 0x0000_0002;
pub const CAP_STREAMING: u32 = 0x0400_0000;
pub const CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// Identification and capability flags of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub capabilities: u32,
    pub device_caps: u32,
}

/// A buffer that could not be queued.
///
/// `buffer` is returned when the buffer was refused before it entered the
/// queue. It is `None` when the buffer was accepted and only the dispatch
/// that followed failed; the buffer then stays queued and comes back through
/// the done queue.
pub struct QueueError {
    pub error: Error,
    pub buffer: Option<Buffer>,
}

impl fmt::Debug for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueError")
            .field("error", &self.error)
            .field("buffer", &self.buffer.as_ref().map(Buffer::index))
            .finish()
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Self {
        err.error
    }
}

struct Control {
    format: PixFormat,
    interval: Fract,
    binding: EngineBinding,
}

/// One adapter video device.
///
/// A device owns a capture and an output [`Stream`], the negotiated format and
/// frame interval they share, and the binding to its engine instance. Control
/// operations are serialized by one device lock; buffer completions never
/// take it.
pub struct Device {
    name: String,
    bus_name: String,
    node: u32,
    media: MediaType,
    control: Mutex<Control>,
    capture: Stream,
    output: Stream,
    capture_done: DoneQueue,
    output_done: DoneQueue,
}

impl Device {
    /// Create an unregistered device named `name`, exposed as `/dev/video<node>`.
    pub fn new(
        engine: Arc<dyn Engine>,
        media: MediaType,
        name: impl Into<String>,
        bus_name: impl Into<String>,
        node: u32,
    ) -> Self {
        let (capture_sink, capture_done) = done_queue();
        let (output_sink, output_done) = done_queue();

        Device {
            name: name.into(),
            bus_name: bus_name.into(),
            node,
            media,
            control: Mutex::new(Control {
                format: PixFormat::default_for(media),
                interval: Fract::default(),
                binding: EngineBinding::new(engine.clone(), media),
            }),
            capture: Stream::new(Direction::Capture, engine.clone(), Arc::new(capture_sink)),
            output: Stream::new(Direction::Output, engine, Arc::new(output_sink)),
            capture_done,
            output_done,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media(&self) -> MediaType {
        self.media
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    /// Path registered with the engine.
    pub fn device_node(&self) -> String {
        format!("/dev/video{}", self.node)
    }

    pub fn stream(&self, direction: Direction) -> &Stream {
        match direction {
            Direction::Capture => &self.capture,
            Direction::Output => &self.output,
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn done_queue(&self, direction: Direction) -> &DoneQueue {
        match direction {
            Direction::Capture => &self.capture_done,
            Direction::Output => &self.output_done,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.control().binding.state()
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.control().binding.instance()
    }

    pub fn register_media(&self) -> Result<(), Error> {
        let node = self.device_node();
        self.control().binding.register(&self.name, &node)
    }

    pub fn unregister_media(&self) {
        self.capture.stop_streaming();
        self.output.stop_streaming();
        self.control().binding.unregister();
    }

    /// Open the device node.
    pub fn open(&self) -> Result<(), Error> {
        self.control().binding.open_node().map_err(|err| {
            log::error!("{} is already open or in use", self.name);
            err
        })?;
        log::debug!("{} opened", self.name);
        Ok(())
    }

    /// Release the device node, stopping both streams and closing the
    /// engine instance.
    pub fn release(&self) -> Result<(), Error> {
        if !self.control().binding.is_node_open() {
            log::error!("{} is not open", self.name);
            return Err(Error::PermissionDenied("device is not open"));
        }

        self.capture.stop_streaming();
        self.output.stop_streaming();

        let mut control = self.control();
        control.binding.release_node()?;
        drop(control);

        for direction in [Direction::Capture, Direction::Output] {
            if let Err(err) = self.stream(direction).release_buffers() {
                log::warn!("{} {} buffers not released: {}", self.name, direction, err);
            }
        }
        log::debug!("{} released", self.name);
        Ok(())
    }

    pub fn capabilities(&self) -> Capabilities {
        let device_caps = CAP_VIDEO_CAPTURE | CAP_VIDEO_OUTPUT | CAP_STREAMING;
        Capabilities {
            driver: DRIVER_NAME.to_string(),
            card: self.name.clone(),
            bus_info: format!("platform:{}", self.bus_name),
            capabilities: device_caps | CAP_DEVICE_CAPS,
            device_caps,
        }
    }

    pub fn enum_format(&self, direction: Direction, index: u32) -> Result<FormatDesc, Error> {
        format::enum_format(self.media, direction, index)
    }

    pub fn enum_frame_sizes(&self, pixel_format: FourCC, index: u32) -> Result<FrameSizeRange, Error> {
        format::enum_frame_sizes(self.media, pixel_format, index)
    }

    pub fn format(&self) -> PixFormat {
        self.control().format
    }

    pub fn try_format(&self, fmt: PixFormat) -> PixFormat {
        format::try_format(self.media, fmt)
    }

    /// Adjust and apply a format; the applied format is returned.
    ///
    /// Fails with [`Error::Busy`] when the direction has buffers reserved.
    pub fn set_format(&self, direction: Direction, fmt: PixFormat) -> Result<PixFormat, Error> {
        let fmt = self.try_format(fmt);
        let mut control = self.control();
        if self.stream(direction).is_busy() {
            log::error!("{} {} queue is busy", self.name, direction);
            return Err(Error::Busy);
        }
        control.format = fmt;
        log::info!(
            "{} format={}, width={}, height={}",
            self.name,
            fmt.pixel_format,
            fmt.width,
            fmt.height
        );
        Ok(fmt)
    }

    pub fn frame_interval(&self) -> Fract {
        self.control().interval
    }

    /// Store the time per frame pushed to the engine at the next streamon.
    pub fn set_frame_interval(&self, interval: Fract) {
        self.control().interval = interval;
    }

    /// Negotiate buffers for `direction` against the current image size.
    pub fn queue_setup(
        &self,
        direction: Direction,
        count: u32,
        plane_size: Option<usize>,
    ) -> Result<QueueSetup, Error> {
        let size_image = self.control().format.plane_size();
        self.stream(direction).queue_setup(count, plane_size, size_image)
    }

    pub fn release_buffers(&self, direction: Direction) -> Result<(), Error> {
        self.stream(direction).release_buffers()
    }

    /// Check and queue a buffer.
    pub fn queue_buffer(&self, direction: Direction, buffer: Buffer) -> Result<(), QueueError> {
        let size_image = self.control().format.plane_size();
        if let Err(error) = Stream::buffer_prepare(&buffer, size_image) {
            return Err(QueueError {
                error,
                buffer: Some(buffer),
            });
        }
        self.stream(direction)
            .buf_queue(buffer)
            .map_err(|error| QueueError {
                error,
                buffer: None,
            })
    }

    /// Wait up to `timeout` for a buffer returned on `direction`.
    pub fn dequeue(&self, direction: Direction, timeout: Duration) -> Option<Completed> {
        self.done_queue(direction).dequeue(timeout)
    }

    pub fn try_dequeue(&self, direction: Direction) -> Option<Completed> {
        self.done_queue(direction).try_dequeue()
    }

    /// Every buffer returned on `direction` so far.
    pub fn dequeue_all(&self, direction: Direction) -> Vec<Completed> {
        self.done_queue(direction).drain()
    }

    /// Open the engine if needed, push the stream configuration and start
    /// streaming `direction`.
    ///
    /// When the engine can't be opened or configured the queued buffers are
    /// returned as [`Queued`](crate::buffer::BufferState::Queued).
    pub fn streamon(&self, direction: Direction) -> Result<(), Error> {
        let stream = self.stream(direction);
        if stream.is_streaming() {
            log::debug!("{} {} already streaming", self.name, direction);
            return Ok(());
        }

        let (instance, field) = {
            let mut control = self.control();
            if !control.binding.is_node_open() {
                return Err(Error::PermissionDenied("device is not open"));
            }

            let configured = control
                .binding
                .try_open(direction)
                .and_then(|()| Self::push_config(&control));
            if let Err(err) = configured {
                drop(control);
                log::error!("{} streamon failed: {}", self.name, err);
                stream.return_queued();
                return Err(err);
            }
            (control.binding.instance(), control.format.field)
        };

        stream.start_streaming(instance, field)
    }

    /// Stop streaming `direction`, returning its buffers as errors.
    pub fn streamoff(&self, direction: Direction) -> Result<(), Error> {
        self.stream(direction).stop_streaming();
        Ok(())
    }

    fn push_config(control: &Control) -> Result<(), Error> {
        let Some(instance) = control.binding.instance() else {
            return Ok(());
        };
        let engine = control.binding.engine();

        if control.format.pixel_format == FourCC::MPEG {
            let config = engine.mpeg2ts_config(instance)?;
            engine.set_mpeg2ts_config(instance, &config)?;
            return Ok(());
        }

        let mut config = engine.video_config(instance)?;
        config.format = match control.format.pixel_format {
            FourCC::H264 => VideoFormat::H264ByteStream,
            FourCC::H264_NO_SC => VideoFormat::H264Avc,
            FourCC::MJPEG => VideoFormat::Mjpeg,
            other => {
                log::error!("invalid format={}", other);
                return Err(Error::UnsupportedFormat(other));
            }
        };
        if control.interval.is_valid() {
            config.frame_rate = FrameRate {
                n: control.interval.numerator,
                m: control.interval.denominator,
            };
        }
        engine.set_video_config(instance, &config)?;
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.capture.stop_streaming();
        self.output.stop_streaming();
        if let Err(err) = self.control().binding.try_close() {
            log::warn!("{} dropped with its instance open: {}", self.name, err);
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("node", &self.node)
            .field("media", &self.media)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
