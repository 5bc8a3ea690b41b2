// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use clap::Args as ClapArgs;
use mse_adapter::format::{self, Direction, FormatDesc, FrameSizeRange, MediaType, PixFormat};
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Media type to list (video or mpeg2ts); lists both when omitted
    #[arg(short = 't', long = "type")]
    media: Option<String>,
}

#[derive(Debug, Serialize)]
struct MediaFormats {
    media: MediaType,
    formats: Vec<FormatEntry>,
    default: PixFormat,
}

#[derive(Debug, Serialize)]
struct FormatEntry {
    #[serde(flatten)]
    desc: FormatDesc,
    frame_sizes: FrameSizeRange,
}

fn parse_media(s: &str) -> Result<MediaType, CliError> {
    match s.to_ascii_lowercase().as_str() {
        "video" => Ok(MediaType::Video),
        "mpeg2ts" | "ts" => Ok(MediaType::Mpeg2ts),
        _ => Err(CliError::InvalidArgs(format!(
            "Invalid media type (expected video or mpeg2ts): {}",
            s
        ))),
    }
}

fn collect(media: MediaType) -> Result<MediaFormats, CliError> {
    let mut formats = Vec::new();
    for index in 0..format::format_count(media) {
        let desc = format::enum_format(media, Direction::Capture, index)?;
        let frame_sizes = format::enum_frame_sizes(media, desc.pixel_format, 0)?;
        formats.push(FormatEntry { desc, frame_sizes });
    }

    Ok(MediaFormats {
        media,
        formats,
        default: PixFormat::default_for(media),
    })
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let media = match args.media.as_deref() {
        Some(name) => vec![parse_media(name)?],
        None => vec![MediaType::Video, MediaType::Mpeg2ts],
    };

    let tables = media
        .into_iter()
        .map(collect)
        .collect::<Result<Vec<_>, _>>()?;

    if json {
        let json = serde_json::to_string_pretty(&tables)
            .map_err(|e| CliError::General(format!("Failed to output JSON: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    for table in &tables {
        println!("{} formats:", table.media);
        for entry in &table.formats {
            let sizes = &entry.frame_sizes;
            println!(
                "  [{}] {} ({})  {}-{} step {} x {}-{} step {}",
                entry.desc.index,
                entry.desc.pixel_format,
                entry.desc.description,
                sizes.min_width,
                sizes.max_width,
                sizes.step_width,
                sizes.min_height,
                sizes.max_height,
                sizes.step_height
            );
        }
        println!(
            "  default: {} {}x{} ({} bytes per image)",
            table.default.pixel_format,
            table.default.width,
            table.default.height,
            table.default.size_image
        );
    }

    Ok(())
}
