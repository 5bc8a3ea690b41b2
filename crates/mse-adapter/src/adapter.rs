// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{device::Device, engine::Engine, format::MediaType, Error};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};

/// Device collection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// Number of elementary video devices, created first
    pub video_devices: u32,
    /// Number of MPEG-2 transport stream devices
    pub mpeg2ts_devices: u32,
    /// Upper bound on the total device count
    pub max_devices: u32,
    /// Node number of the first device (`/dev/video<first_node>`)
    pub first_node: u32,
    /// Device names are `<name_prefix> <n>`
    pub name_prefix: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            video_devices: 2,
            mpeg2ts_devices: 2,
            max_devices: 16,
            first_node: 0,
            name_prefix: "MSE Adapter".to_string(),
        }
    }
}

impl AdapterConfig {
    /// Load a JSON configuration file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            Error::InvalidArgument(format!("cannot read {}: {}", path.display(), err))
        })?;
        let config: AdapterConfig = serde_json::from_str(&text).map_err(|err| {
            Error::InvalidArgument(format!("cannot parse {}: {}", path.display(), err))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn total_devices(&self) -> u32 {
        self.video_devices.saturating_add(self.mpeg2ts_devices)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let total = self.total_devices();
        if total == 0 {
            return Err(Error::InvalidArgument(format!(
                "invalid devices, {} (video={} mpeg2ts={})",
                total, self.video_devices, self.mpeg2ts_devices
            )));
        }
        if total > self.max_devices {
            return Err(Error::InvalidArgument(format!(
                "too many devices, {} (video={} mpeg2ts={}, max {})",
                total, self.video_devices, self.mpeg2ts_devices, self.max_devices
            )));
        }
        if self.first_node.checked_add(total - 1).is_none() {
            return Err(Error::InvalidArgument(format!(
                "device nodes overflow, first node {} with {} devices",
                self.first_node, total
            )));
        }
        Ok(())
    }

    fn media(&self, index: u32) -> MediaType {
        if index < self.video_devices {
            MediaType::Video
        } else {
            MediaType::Mpeg2ts
        }
    }
}

/// The registered set of adapter devices.
///
/// Dropping the adapter unregisters every device from the engine.
pub struct Adapter {
    devices: Vec<Device>,
}

impl Adapter {
    /// Create and register the configured devices.
    ///
    /// If any device fails to register, every device created so far is
    /// unregistered and the error is returned.
    pub fn new(config: &AdapterConfig, engine: Arc<dyn Engine>) -> Result<Self, Error> {
        config.validate()?;

        let mut adapter = Adapter {
            devices: Vec::with_capacity(config.total_devices() as usize),
        };

        for index in 0..config.total_devices() {
            let media = config.media(index);
            let device = Device::new(
                engine.clone(),
                media,
                format!("{} {}", config.name_prefix, index),
                format!("MSE Device {}", index),
                config.first_node + index,
            );
            let registered = device.register_media();
            adapter.devices.push(device);
            if let Err(err) = registered {
                log::error!("failed creating device={}: {}", index, err);
                adapter.shutdown();
                return Err(err);
            }
        }

        log::info!(
            "adapter started with {} devices (video={} mpeg2ts={})",
            adapter.devices.len(),
            config.video_devices,
            config.mpeg2ts_devices
        );
        Ok(adapter)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Unregister every device; the adapter is empty afterwards.
    pub fn shutdown(&mut self) {
        for device in self.devices.drain(..) {
            device.unregister_media();
        }
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackEngine;

    #[test]
    fn test_config_defaults() {
        let config: AdapterConfig = serde_json::from_str("{\"video_devices\": 1}").unwrap();
        assert_eq!(config.video_devices, 1);
        assert_eq!(config.mpeg2ts_devices, 2);
        assert_eq!(config.max_devices, 16);
        assert_eq!(config.name_prefix, "MSE Adapter");
        assert!(serde_json::from_str::<AdapterConfig>("{\"bogus\": 1}").is_err());
    }

    #[test]
    fn test_config_validate() {
        assert!(AdapterConfig::default().validate().is_ok());

        let none = AdapterConfig {
            video_devices: 0,
            mpeg2ts_devices: 0,
            ..Default::default()
        };
        assert!(matches!(none.validate(), Err(Error::InvalidArgument(_))));

        let many = AdapterConfig {
            video_devices: 10,
            mpeg2ts_devices: 7,
            ..Default::default()
        };
        assert!(many.validate().is_err());

        let last = AdapterConfig {
            video_devices: 1,
            mpeg2ts_devices: 0,
            first_node: u32::MAX,
            ..Default::default()
        };
        assert!(last.validate().is_ok());

        let overflow = AdapterConfig {
            first_node: u32::MAX - 2,
            ..Default::default()
        };
        assert!(matches!(overflow.validate(), Err(Error::InvalidArgument(_))));
        assert!(Adapter::new(&overflow, Arc::new(LoopbackEngine::new())).is_err());
    }

    #[test]
    fn test_adapter_devices() {
        let engine = Arc::new(LoopbackEngine::new());
        let config = AdapterConfig {
            video_devices: 1,
            mpeg2ts_devices: 2,
            first_node: 4,
            ..Default::default()
        };
        let adapter = Adapter::new(&config, engine.clone()).unwrap();
        assert_eq!(adapter.len(), 3);
        assert_eq!(adapter.device(0).unwrap().media(), MediaType::Video);
        assert_eq!(adapter.device(2).unwrap().media(), MediaType::Mpeg2ts);
        assert_eq!(adapter.device(2).unwrap().device_node(), "/dev/video6");
        assert_eq!(adapter.device(1).unwrap().name(), "MSE Adapter 1");
        assert_eq!(engine.registrations(), 3);

        drop(adapter);
        assert_eq!(engine.registrations(), 0);
    }
}
