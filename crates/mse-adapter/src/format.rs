// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Format tables and negotiation.
//!
//! Each adapter device carries either elementary video streams or an MPEG-2
//! transport stream. The tables below list what each kind accepts and the
//! picture size ranges the downstream hardware supports:
//!
//! | Media | FourCC | Description | Width | Height |
//! |-------|--------|-------------|-------|--------|
//! | Video | `H264` | H264 with start codes | 80..3840 step 2 | 80..2160 step 2 |
//! | Video | `AVC1` | H264 without start codes | 80..3840 step 2 | 80..2160 step 2 |
//! | Video | `MJPG` | Motion-JPEG | 8..2040 step 8 | 8..2040 step 8 |
//! | MPEG-2 TS | `MPEG` | MPEG-1/2/4 Multiplexed | 80..3840 step 2 | 80..2160 step 2 |
//!
//! The H.264 and transport stream limits follow the R-Car VCP4 decoder, the
//! MJPEG limits follow the AVTP payload format (RFC 2435 3.1.5, 3.1.6).

use crate::{fourcc::FourCC, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media an adapter device carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Elementary video stream (H.264, Motion-JPEG)
    Video,
    /// MPEG-2 transport stream
    Mpeg2ts,
}

impl MediaType {
    pub fn name(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Mpeg2ts => "mpeg2ts",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Queue direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The device produces data for the queue layer (engine receives)
    Capture,
    /// The queue layer supplies data for the device (engine transmits)
    Output,
}

impl Direction {
    pub fn is_output(&self) -> bool {
        matches!(self, Direction::Output)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Capture => write!(f, "capture"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Field order of the frames in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum Field {
    Any = 0,
    #[default]
    None = 1,
    Top = 2,
    Bottom = 3,
    Interlaced = 4,
    SeqTb = 5,
    SeqBt = 6,
    Alternate = 7,
    InterlacedTb = 8,
    InterlacedBt = 9,
}

/// Pixel format of a device, shared by both queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixFormat {
    pub pixel_format: FourCC,
    pub width: u32,
    pub height: u32,
    pub field: Field,
    pub bytes_per_line: u32,
    pub size_image: u32,
}

impl PixFormat {
    /// Request for a format, sizes are filled in by [`try_format`].
    pub fn new(pixel_format: FourCC, width: u32, height: u32) -> Self {
        PixFormat {
            pixel_format,
            width,
            height,
            field: Field::None,
            bytes_per_line: 0,
            size_image: 0,
        }
    }

    /// The default format for a media type: the first table entry at 640x480.
    pub fn default_for(media: MediaType) -> Self {
        try_format(media, PixFormat::new(formats(media)[0].pixel_format, 640, 480))
    }

    pub fn plane_size(&self) -> usize {
        self.size_image as usize
    }
}

/// Entry of the format table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDesc {
    pub index: u32,
    pub direction: Direction,
    pub description: &'static str,
    pub pixel_format: FourCC,
}

/// Stepwise picture size range for one pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSizeRange {
    pub pixel_format: FourCC,
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl FrameSizeRange {
    /// Clamp a requested size into the range.
    ///
    /// Out of range values are clamped to the nearest bound, in range values
    /// are rounded down to the step.
    pub fn clamp(&self, width: u32, height: u32) -> (u32, u32) {
        (
            clamp_step(width, self.min_width, self.max_width, self.step_width),
            clamp_step(height, self.min_height, self.max_height, self.step_height),
        )
    }
}

fn clamp_step(value: u32, min: u32, max: u32, step: u32) -> u32 {
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value - value % step
    }
}

/// Frame interval in seconds (numerator / denominator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fract {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fract {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Fract {
            numerator,
            denominator,
        }
    }

    /// An interval is only pushed to the engine when both terms are nonzero.
    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }
}

impl fmt::Display for Fract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

struct FormatEntry {
    description: &'static str,
    pixel_format: FourCC,
}

const FORMATS_VIDEO: [FormatEntry; 3] = [
    FormatEntry {
        description: "H264 with start codes",
        pixel_format: FourCC::H264,
    },
    FormatEntry {
        description: "H264 without start codes",
        pixel_format: FourCC::H264_NO_SC,
    },
    FormatEntry {
        description: "Motion-JPEG",
        pixel_format: FourCC::MJPEG,
    },
];

const FORMATS_MPEG: [FormatEntry; 1] = [FormatEntry {
    description: "MPEG-1/2/4 Multiplexed",
    pixel_format: FourCC::MPEG,
}];

const fn vcp4_range(pixel_format: FourCC) -> FrameSizeRange {
    FrameSizeRange {
        pixel_format,
        min_width: 80,
        max_width: 3840,
        step_width: 2,
        min_height: 80,
        max_height: 2160,
        step_height: 2,
    }
}

const SIZES_VIDEO: [FrameSizeRange; 3] = [
    vcp4_range(FourCC::H264),
    vcp4_range(FourCC::H264_NO_SC),
    FrameSizeRange {
        pixel_format: FourCC::MJPEG,
        min_width: 8,
        max_width: 2040,
        step_width: 8,
        min_height: 8,
        max_height: 2040,
        step_height: 8,
    },
];

const SIZES_MPEG: [FrameSizeRange; 1] = [vcp4_range(FourCC::MPEG)];

fn formats(media: MediaType) -> &'static [FormatEntry] {
    match media {
        MediaType::Video => &FORMATS_VIDEO,
        MediaType::Mpeg2ts => &FORMATS_MPEG,
    }
}

/// Picture size ranges for a media type.
pub fn frame_sizes(media: MediaType) -> &'static [FrameSizeRange] {
    match media {
        MediaType::Video => &SIZES_VIDEO,
        MediaType::Mpeg2ts => &SIZES_MPEG,
    }
}

/// Number of formats a media type supports.
pub fn format_count(media: MediaType) -> u32 {
    formats(media).len() as u32
}

/// Format table entry `index` for a queue direction.
pub fn enum_format(media: MediaType, direction: Direction, index: u32) -> Result<FormatDesc, Error> {
    let entry = formats(media).get(index as usize).ok_or_else(|| {
        log::info!(
            "format index {} is equal or bigger than {}",
            index,
            format_count(media)
        );
        Error::InvalidArgument(format!("format index {} out of range", index))
    })?;

    Ok(FormatDesc {
        index,
        direction,
        description: entry.description,
        pixel_format: entry.pixel_format,
    })
}

/// Stepwise size range for a pixel format; only index 0 exists.
pub fn enum_frame_sizes(
    media: MediaType,
    pixel_format: FourCC,
    index: u32,
) -> Result<FrameSizeRange, Error> {
    let range = frame_sizes(media)
        .iter()
        .find(|range| range.pixel_format == pixel_format);

    match range {
        Some(range) if index == 0 => Ok(*range),
        _ => {
            log::info!("no frame size {} for {}", index, pixel_format);
            Err(Error::InvalidArgument(format!(
                "no frame size {} for {}",
                index, pixel_format
            )))
        }
    }
}

/// Adjust a requested format to one the device supports.
///
/// An unknown pixel format is replaced by the first table entry, a field
/// order other than progressive or interlaced becomes progressive, and the
/// picture size is clamped to the format's range. Line and image sizes are
/// derived at two bytes per pixel.
pub fn try_format(media: MediaType, mut fmt: PixFormat) -> PixFormat {
    let table = formats(media);
    if !table.iter().any(|entry| entry.pixel_format == fmt.pixel_format) {
        log::info!("unknown fourcc format {}", fmt.pixel_format);
        fmt.pixel_format = table[0].pixel_format;
    }

    if fmt.field != Field::None && fmt.field != Field::Interlaced {
        fmt.field = Field::None;
    }

    if let Some(range) = frame_sizes(media)
        .iter()
        .find(|range| range.pixel_format == fmt.pixel_format)
    {
        let (width, height) = range.clamp(fmt.width, fmt.height);
        fmt.width = width;
        fmt.height = height;
    }

    fmt.bytes_per_line = fmt.width * 2;
    fmt.size_image = fmt.bytes_per_line * fmt.height;
    fmt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_format() {
        let desc = enum_format(MediaType::Video, Direction::Output, 1).unwrap();
        assert_eq!(desc.pixel_format, FourCC::H264_NO_SC);
        assert_eq!(desc.description, "H264 without start codes");
        assert_eq!(desc.direction, Direction::Output);

        assert!(enum_format(MediaType::Video, Direction::Capture, 3).is_err());
        assert!(enum_format(MediaType::Mpeg2ts, Direction::Capture, 0).is_ok());
        assert!(enum_format(MediaType::Mpeg2ts, Direction::Capture, 1).is_err());
    }

    #[test]
    fn test_try_format_clamps() {
        let fmt = try_format(MediaType::Video, PixFormat::new(FourCC::H264, 5000, 10));
        assert_eq!((fmt.width, fmt.height), (3840, 80));

        let fmt = try_format(MediaType::Video, PixFormat::new(FourCC::MJPEG, 645, 487));
        assert_eq!((fmt.width, fmt.height), (640, 480));
        assert_eq!(fmt.bytes_per_line, 1280);
        assert_eq!(fmt.size_image, 1280 * 480);
    }

    #[test]
    fn test_try_format_unknown_fourcc() {
        let fmt = try_format(MediaType::Video, PixFormat::new(FourCC::MPEG, 1920, 1080));
        assert_eq!(fmt.pixel_format, FourCC::H264);

        let fmt = try_format(MediaType::Mpeg2ts, PixFormat::new(FourCC::MJPEG, 1920, 1080));
        assert_eq!(fmt.pixel_format, FourCC::MPEG);
    }

    #[test]
    fn test_try_format_field() {
        let mut req = PixFormat::new(FourCC::H264, 1920, 1080);
        req.field = Field::Interlaced;
        assert_eq!(try_format(MediaType::Video, req).field, Field::Interlaced);

        req.field = Field::Alternate;
        assert_eq!(try_format(MediaType::Video, req).field, Field::None);
    }

    #[test]
    fn test_enum_frame_sizes() {
        let range = enum_frame_sizes(MediaType::Video, FourCC::MJPEG, 0).unwrap();
        assert_eq!(range.step_width, 8);
        assert_eq!(range.max_height, 2040);

        assert!(enum_frame_sizes(MediaType::Video, FourCC::MJPEG, 1).is_err());
        assert!(enum_frame_sizes(MediaType::Video, FourCC::MPEG, 0).is_err());
    }

    #[test]
    fn test_default_format() {
        let fmt = PixFormat::default_for(MediaType::Mpeg2ts);
        assert_eq!(fmt.pixel_format, FourCC::MPEG);
        assert_eq!(fmt.plane_size(), 640 * 2 * 480);
    }

    #[test]
    fn test_fract_validity() {
        assert!(Fract::new(1, 30).is_valid());
        assert!(!Fract::new(0, 30).is_valid());
        assert!(!Fract::default().is_valid());
        assert_eq!(format!("{}", Fract::new(1001, 30000)), "1001/30000");
    }
}
