// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::config;
use crate::error::CliError;
use crate::metrics::MetricsCollector;
use crate::utils;
use clap::Args as ClapArgs;
use mse_adapter::{
    adapter::Adapter,
    buffer::Buffer,
    device::Device,
    format::{Direction, Fract, MediaType, PixFormat},
    loopback::LoopbackEngine,
    FourCC,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Queue direction to run (capture or output)
    #[arg(short, long, default_value = "capture")]
    direction: String,

    /// Number of buffers to return before stopping (0 = until Ctrl+C)
    #[arg(short, long, default_value = "100")]
    frames: u64,

    /// Number of buffers to queue
    #[arg(short, long, default_value = "4")]
    buffers: u32,

    /// Pixel format FOURCC (H264, AVC1, MJPG or MPEG)
    #[arg(long, default_value = "H264")]
    format: String,

    /// Resolution (WxH)
    #[arg(short, long, default_value = "640x480")]
    resolution: String,

    /// Frame rate of the loopback engine (0 = as fast as possible)
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Payload bytes per frame; a capture size of 0 fails every receive
    #[arg(long)]
    frame_size: Option<usize>,

    /// JSON configuration file for the device collection
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for a returned buffer
    #[arg(short, long, default_value = "2.0")]
    timeout: f64,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Simulate parameters: {:?}", args);

    let direction = utils::parse_direction(&args.direction)?;
    let fourcc = utils::parse_fourcc(&args.format)?;
    let (width, height) = utils::parse_resolution(&args.resolution)?;
    if args.buffers == 0 {
        return Err(CliError::InvalidArgs(
            "At least one buffer is required".to_string(),
        ));
    }
    if !args.timeout.is_finite() || args.timeout <= 0.0 {
        return Err(CliError::InvalidArgs(format!(
            "Timeout must be positive: {}",
            args.timeout
        )));
    }

    let config = config::load(args.config.as_deref())?;
    let (media, index) = if fourcc == FourCC::MPEG {
        (MediaType::Mpeg2ts, config.video_devices)
    } else {
        (MediaType::Video, 0)
    };
    let available = match media {
        MediaType::Video => config.video_devices,
        MediaType::Mpeg2ts => config.mpeg2ts_devices,
    };
    if available == 0 {
        return Err(CliError::InvalidArgs(format!(
            "Configuration has no {} devices",
            media
        )));
    }

    let mut engine = LoopbackEngine::new();
    if args.fps > 0 {
        engine = engine.with_frame_delay(Duration::from_secs(1) / args.fps);
    }
    if let Some(frame_size) = args.frame_size {
        if direction == Direction::Capture {
            engine = engine.with_frame_size(frame_size);
        }
    }
    let engine = Arc::new(engine);

    // Install signal handler for graceful shutdown
    let term = utils::install_signal_handler()?;

    let adapter = Adapter::new(&config, engine.clone())?;
    let device = adapter.device(index as usize).ok_or_else(|| {
        CliError::General(format!("Device {} was not created", index))
    })?;

    let applied = device.set_format(direction, PixFormat::new(fourcc, width, height))?;
    if applied.pixel_format != fourcc {
        log::warn!(
            "Format {} not supported by {}, using {}",
            fourcc,
            device.name(),
            applied.pixel_format
        );
    }
    if (applied.width, applied.height) != (width, height) {
        log::info!(
            "Resolution adjusted from {}x{} to {}x{}",
            width,
            height,
            applied.width,
            applied.height
        );
    }
    if args.fps > 0 {
        device.set_frame_interval(Fract::new(1, args.fps));
    }

    device.open()?;
    log::info!(
        "Simulating {} on {} ({}) with {} {}x{}",
        direction,
        device.name(),
        device.device_node(),
        applied.pixel_format,
        applied.width,
        applied.height
    );

    let mut metrics = MetricsCollector::new();
    let result = run(device, direction, &args, &term, &mut metrics);
    let released = device.release();
    let returned = result?;
    released?;

    if term.load(Ordering::Relaxed) {
        log::info!("Received Ctrl+C, stopping...");
    }

    let stats = engine.stats();
    log::info!(
        "Returned {} buffers; engine moved {} frames ({} bytes), {} failed receives",
        returned,
        stats.frames,
        stats.bytes,
        stats.failed
    );

    if json {
        metrics
            .print_json()
            .map_err(|e| CliError::General(format!("Failed to output JSON metrics: {}", e)))?;
    } else {
        metrics.print_text();
    }

    Ok(())
}

/// Queue the buffers, stream until `frames` buffers came back, then stop.
fn run(
    device: &Device,
    direction: Direction,
    args: &Args,
    term: &AtomicBool,
    metrics: &mut MetricsCollector,
) -> Result<u64, CliError> {
    let setup = device.queue_setup(direction, args.buffers, None)?;
    log::info!(
        "Queueing {} buffers of {} bytes",
        setup.count,
        setup.plane_size
    );

    for index in 0..setup.count {
        let mut buffer = Buffer::new(index, setup.plane_size);
        if direction.is_output() {
            fill_frame(&mut buffer, args.frame_size, 0)?;
        }
        device
            .queue_buffer(direction, buffer)
            .map_err(|err| CliError::from(err.error))?;
    }

    device.streamon(direction)?;

    let timeout = Duration::from_secs_f64(args.timeout);
    let max_frames = if args.frames == 0 {
        u64::MAX
    } else {
        args.frames
    };
    log::info!(
        "Running {} frames (Ctrl+C to stop)...",
        if max_frames == u64::MAX {
            "unlimited".to_string()
        } else {
            max_frames.to_string()
        }
    );

    let mut returned = 0u64;
    while returned < max_frames && !term.load(Ordering::Relaxed) {
        let Some(done) = device.dequeue(direction, timeout) else {
            device.streamoff(direction)?;
            return Err(CliError::Streaming(format!(
                "No buffer returned within {:.1}s",
                args.timeout
            )));
        };

        metrics.record(&done);
        returned += 1;
        if returned % 30 == 0 {
            log::debug!("Returned {} buffers", returned);
        }

        let mut buffer = done.buffer;
        if direction.is_output() {
            fill_frame(&mut buffer, args.frame_size, returned)?;
        }
        device
            .queue_buffer(direction, buffer)
            .map_err(|err| CliError::from(err.error))?;
    }

    device.streamoff(direction)?;
    let leftover = device.dequeue_all(direction);
    log::debug!("{} buffers returned at stream off", leftover.len());

    Ok(returned)
}

/// Fill an output buffer with a frame pattern.
fn fill_frame(buffer: &mut Buffer, frame_size: Option<usize>, frame: u64) -> Result<(), CliError> {
    let len = frame_size
        .unwrap_or(buffer.capacity())
        .min(buffer.capacity());
    buffer.data_mut()[..len].fill(frame as u8);
    buffer.set_bytes_used(len)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_frame() {
        let mut buffer = Buffer::new(0, 64);
        fill_frame(&mut buffer, None, 3).unwrap();
        assert_eq!(buffer.bytes_used(), 64);
        assert!(buffer.data().iter().all(|b| *b == 3));

        fill_frame(&mut buffer, Some(16), 4).unwrap();
        assert_eq!(buffer.bytes_used(), 16);
        assert_eq!(buffer.payload(), &[4u8; 16][..]);

        fill_frame(&mut buffer, Some(1024), 5).unwrap();
        assert_eq!(buffer.bytes_used(), 64);
    }
}
