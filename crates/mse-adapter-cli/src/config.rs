// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use clap::Args as ClapArgs;
use mse_adapter::adapter::AdapterConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DeviceEntry {
    index: u32,
    name: String,
    media: &'static str,
    device_node: String,
}

/// Load the adapter configuration, falling back to the defaults.
pub fn load(path: Option<&Path>) -> Result<AdapterConfig, CliError> {
    let config = match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            AdapterConfig::from_file(path)?
        }
        None => AdapterConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn devices(config: &AdapterConfig) -> Vec<DeviceEntry> {
    (0..config.total_devices())
        .map(|index| DeviceEntry {
            index,
            name: format!("{} {}", config.name_prefix, index),
            media: if index < config.video_devices {
                "video"
            } else {
                "mpeg2ts"
            },
            device_node: format!("/dev/video{}", config.first_node + index),
        })
        .collect()
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let config = load(args.config.as_deref())?;
    let devices = devices(&config);

    if json {
        let output = serde_json::json!({
            "config": config,
            "devices": devices,
        });
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::General(format!("Failed to output JSON: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    println!("Configuration is valid");
    println!("  video devices:   {}", config.video_devices);
    println!("  mpeg2ts devices: {}", config.mpeg2ts_devices);
    println!("  max devices:     {}", config.max_devices);
    for device in &devices {
        println!(
            "  {} {:<16} {:<8} {}",
            device.index, device.name, device.media, device.device_node
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_devices() {
        let config = load(None).unwrap();
        let devices = devices(&config);
        assert_eq!(devices.len(), 4);
        assert_eq!(devices[1].media, "video");
        assert_eq!(devices[2].media, "mpeg2ts");
        assert_eq!(devices[3].name, "MSE Adapter 3");
        assert_eq!(devices[3].device_node, "/dev/video3");
    }

    #[test]
    fn test_missing_file() {
        let err = load(Some(Path::new("/nonexistent/mse-adapter.json"))).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgs(_)));
    }
}
