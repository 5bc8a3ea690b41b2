// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use mse_adapter::buffer::{BufferState, Completed};
use serde::Serialize;
use std::time::Instant;

/// Buffer pipeline metrics collected during a simulation
#[derive(Debug, Clone, Serialize)]
pub struct StreamMetrics {
    /// Buffers returned with data
    pub frames: u64,
    /// Payload bytes of the returned buffers
    pub bytes: u64,
    /// Buffers returned in the error state
    pub errors: u64,
    /// Sequence numbers skipped between returned buffers
    pub sequence_gaps: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Average throughput in frames per second
    pub throughput_fps: f64,
    /// Average bandwidth in megabits per second
    pub bandwidth_mbps: f64,
}

/// Metrics collector fed with every buffer dequeued from a device
pub struct MetricsCollector {
    start_time: Instant,
    frames: u64,
    bytes: u64,
    errors: u64,
    prev_sequence: Option<u32>,
    sequence_gaps: u64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames: 0,
            bytes: 0,
            errors: 0,
            prev_sequence: None,
            sequence_gaps: 0,
        }
    }

    /// Record one returned buffer.
    pub fn record(&mut self, completed: &Completed) {
        match completed.state {
            BufferState::Done => {
                self.frames += 1;
                self.bytes += completed.buffer.bytes_used() as u64;
            }
            BufferState::Error | BufferState::Queued => self.errors += 1,
        }
        self.track_sequence(completed.buffer.sequence());
    }

    /// Track the buffer sequence number to detect gaps
    /// Returns the number of skipped sequence numbers (0 or N)
    pub fn track_sequence(&mut self, sequence: u32) -> u64 {
        let gaps = match self.prev_sequence {
            Some(prev) => {
                let expected = prev.wrapping_add(1);
                if sequence == expected {
                    0
                } else if sequence > expected {
                    u64::from(sequence - expected)
                } else {
                    log::warn!("Buffer sequence number decreased: {} -> {}", prev, sequence);
                    0
                }
            }
            None => 0,
        };

        self.sequence_gaps += gaps;
        self.prev_sequence = Some(sequence);
        gaps
    }

    /// Forget the previous sequence number; the next session starts at 0.
    pub fn restart(&mut self) {
        self.prev_sequence = None;
    }

    /// Finalize and calculate all metrics
    pub fn finalize(&self) -> StreamMetrics {
        let duration = self.start_time.elapsed();
        let duration_secs = duration.as_secs_f64();

        let (throughput_fps, bandwidth_mbps) = if duration_secs > 0.0 {
            (
                self.frames as f64 / duration_secs,
                (self.bytes as f64 * 8.0) / (duration_secs * 1_000_000.0),
            )
        } else {
            (0.0, 0.0)
        };

        StreamMetrics {
            frames: self.frames,
            bytes: self.bytes,
            errors: self.errors,
            sequence_gaps: self.sequence_gaps,
            duration_ms: duration.as_millis() as u64,
            throughput_fps,
            bandwidth_mbps,
        }
    }

    /// Print metrics in human-readable format
    pub fn print_text(&self) {
        let metrics = self.finalize();
        println!("\n=== Stream Metrics ===");
        println!("Frames:            {}", metrics.frames);
        println!(
            "Bytes:             {} ({:.2} MB)",
            metrics.bytes,
            metrics.bytes as f64 / 1_048_576.0
        );
        println!(
            "Duration:          {:.2} s",
            metrics.duration_ms as f64 / 1000.0
        );
        println!("Throughput:        {:.2} fps", metrics.throughput_fps);
        println!("Bandwidth:         {:.2} Mbps", metrics.bandwidth_mbps);
        println!("Error buffers:     {}", metrics.errors);

        if metrics.sequence_gaps > 0 {
            println!("Sequence gaps:     {}", metrics.sequence_gaps);
        }
    }

    /// Print metrics in JSON format
    pub fn print_json(&self) -> Result<(), serde_json::Error> {
        let json = serde_json::to_string_pretty(&self.finalize())?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mse_adapter::buffer::Buffer;

    fn completed(index: u32, bytes: usize, state: BufferState) -> Completed {
        let mut buffer = Buffer::new(index, 1024);
        buffer.set_bytes_used(bytes).unwrap();
        Completed { buffer, state }
    }

    #[test]
    fn test_sequence_gaps() {
        let mut collector = MetricsCollector::new();

        collector.track_sequence(0);
        collector.track_sequence(1);
        collector.track_sequence(2);

        // skip 3 sequence numbers
        assert_eq!(collector.track_sequence(6), 3);
        assert_eq!(collector.track_sequence(7), 0);
        assert_eq!(collector.sequence_gaps, 3);

        collector.restart();
        assert_eq!(collector.track_sequence(0), 0);
        assert_eq!(collector.sequence_gaps, 3);
    }

    #[test]
    fn test_record_states() {
        let mut collector = MetricsCollector::new();
        collector.record(&completed(0, 100, BufferState::Done));
        collector.record(&completed(1, 200, BufferState::Done));
        collector.record(&completed(2, 0, BufferState::Error));

        let metrics = collector.finalize();
        assert_eq!(metrics.frames, 2);
        assert_eq!(metrics.bytes, 300);
        assert_eq!(metrics.errors, 1);
    }

    #[test]
    fn test_throughput_calculation() {
        let mut collector = MetricsCollector::new();
        for _ in 0..30 {
            collector.record(&completed(0, 1000, BufferState::Done));
        }

        std::thread::sleep(std::time::Duration::from_millis(100));

        let metrics = collector.finalize();
        assert_eq!(metrics.frames, 30);
        assert_eq!(metrics.bytes, 30_000);
        assert!(metrics.throughput_fps > 0.0 && metrics.throughput_fps < 400.0);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = MetricsCollector::new().finalize();
        assert_eq!(metrics.frames, 0);
        assert_eq!(metrics.bytes, 0);
        assert_eq!(metrics.errors, 0);
        assert_eq!(metrics.sequence_gaps, 0);
    }
}
