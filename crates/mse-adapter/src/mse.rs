// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    engine::{
        Engine, EngineError, FrameRate, InstanceId, Mpeg2tsConfig, RegistrationId, VideoConfig,
        VideoFormat,
    },
    format::{Direction, MediaType},
    transfer::{Rejected, Transfer},
    Error,
};
use mse_sys::{
    mse_fraction, mse_mpeg2ts_config, mse_video_config, MseLibrary,
    MSE_TYPE_MSE_TYPE_ADAPTER_MPEG2TS, MSE_TYPE_MSE_TYPE_ADAPTER_VIDEO,
    MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_AVC,
    MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_BYTE_STREAM,
    MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_MJPEG, MSE_VIDEO_FORMAT_TYPE,
};
use std::{
    ffi::CString,
    os::raw::{c_int, c_void},
};

const EINVAL: c_int = -22;

/// Call an engine library function, mapping a negative status to
/// [`EngineError`].
macro_rules! mse {
    ($lib:expr, $fn_name:ident($($args:expr),*)) => {{
        #[allow(clippy::macro_metavars_in_unsafe)]
        let status = unsafe { $lib.$fn_name($($args),*) };
        if status < 0 {
            log::error!("{} failed: {}", stringify!($fn_name), status);
            Err(EngineError::new(stringify!($fn_name), status))
        } else {
            Ok(status)
        }
    }};
}

/// The Media Streaming Engine, loaded at runtime from `libmse.so`.
///
/// Each accepted transfer is boxed and passed to the engine as the opaque
/// completion handle; the completion trampoline turns it back into the
/// transfer and completes it.
pub struct MseEngine {
    lib: &'static MseLibrary,
}

impl MseEngine {
    /// Load the engine library (see [`mse_sys::init`]).
    pub fn new() -> Result<Self, Error> {
        Ok(MseEngine {
            lib: mse_sys::init()?,
        })
    }

    pub fn from_library(lib: &'static MseLibrary) -> Self {
        MseEngine { lib }
    }
}

fn index(call: &'static str, id: u32) -> Result<c_int, EngineError> {
    c_int::try_from(id).map_err(|_| EngineError::new(call, EINVAL))
}

fn media_type(media: MediaType) -> mse_sys::MSE_TYPE {
    match media {
        MediaType::Video => MSE_TYPE_MSE_TYPE_ADAPTER_VIDEO,
        MediaType::Mpeg2ts => MSE_TYPE_MSE_TYPE_ADAPTER_MPEG2TS,
    }
}

fn video_format(format: VideoFormat) -> MSE_VIDEO_FORMAT_TYPE {
    match format {
        VideoFormat::H264ByteStream => MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_BYTE_STREAM,
        VideoFormat::H264Avc => MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_AVC,
        VideoFormat::Mjpeg => MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_MJPEG,
    }
}

impl TryFrom<mse_video_config> for VideoConfig {
    type Error = EngineError;

    fn try_from(raw: mse_video_config) -> Result<Self, Self::Error> {
        let format = match raw.format {
            MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_BYTE_STREAM => VideoFormat::H264ByteStream,
            MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_AVC => VideoFormat::H264Avc,
            MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_MJPEG => VideoFormat::Mjpeg,
            _ => return Err(EngineError::new("mse_get_video_config", EINVAL)),
        };
        Ok(VideoConfig {
            format,
            bitrate: raw.bitrate,
            frame_rate: FrameRate {
                n: raw.fps.n,
                m: raw.fps.m,
            },
            bytes_per_frame: raw.bytes_per_frame,
            class_interval_frames: raw.class_interval_frames,
            max_payload_size: raw.max_payload_size,
        })
    }
}

impl From<&VideoConfig> for mse_video_config {
    fn from(config: &VideoConfig) -> Self {
        mse_video_config {
            format: video_format(config.format),
            bitrate: config.bitrate,
            fps: mse_fraction {
                n: config.frame_rate.n,
                m: config.frame_rate.m,
            },
            bytes_per_frame: config.bytes_per_frame,
            class_interval_frames: config.class_interval_frames,
            max_payload_size: config.max_payload_size,
        }
    }
}

impl From<mse_mpeg2ts_config> for Mpeg2tsConfig {
    fn from(raw: mse_mpeg2ts_config) -> Self {
        Mpeg2tsConfig {
            tspackets_per_frame: raw.tspackets_per_frame,
            bitrate: raw.bitrate,
            pcr_pid: raw.pcr_pid,
        }
    }
}

impl From<&Mpeg2tsConfig> for mse_mpeg2ts_config {
    fn from(config: &Mpeg2tsConfig) -> Self {
        mse_mpeg2ts_config {
            tspackets_per_frame: config.tspackets_per_frame,
            bitrate: config.bitrate,
            pcr_pid: config.pcr_pid,
        }
    }
}

/// Completion entry point handed to the engine with every transmission.
///
/// # Safety
///
/// `priv_` must be the handle passed to the accepted `mse_start_transmission`
/// call and the engine must call this once per accepted call.
unsafe extern "C" fn completion_trampoline(priv_: *mut c_void, size: c_int) -> c_int {
    if priv_.is_null() {
        log::error!("completion called without private data");
        return EINVAL;
    }

    // SAFETY: priv_ was leaked from a Box<Transfer> by start_transmission and
    // ownership returns here exactly once.
    let transfer = unsafe { Box::from_raw(priv_ as *mut Transfer) };
    transfer.complete(usize::try_from(size).unwrap_or(0));
    0
}

impl Engine for MseEngine {
    fn register_adapter_media(
        &self,
        media: MediaType,
        name: &str,
        device_node: &str,
    ) -> Result<RegistrationId, EngineError> {
        let invalid = |_| EngineError::new("mse_register_adapter_media", EINVAL);
        let name = CString::new(name).map_err(invalid)?;
        let device_node = CString::new(device_node).map_err(invalid)?;

        let index = mse!(
            self.lib,
            mse_register_adapter_media(media_type(media), name.as_ptr(), device_node.as_ptr())
        )?;
        Ok(RegistrationId(index as u32))
    }

    fn unregister_adapter_media(&self, registration: RegistrationId) -> Result<(), EngineError> {
        let index = index("mse_unregister_adapter_media", registration.0)?;
        mse!(self.lib, mse_unregister_adapter_media(index))?;
        Ok(())
    }

    fn open(
        &self,
        registration: RegistrationId,
        direction: Direction,
    ) -> Result<InstanceId, EngineError> {
        let index_media = index("mse_open", registration.0)?;
        let instance = mse!(self.lib, mse_open(index_media, direction.is_output()))?;
        Ok(InstanceId(instance as u32))
    }

    fn close(&self, instance: InstanceId) -> Result<(), EngineError> {
        let index = index("mse_close", instance.0)?;
        mse!(self.lib, mse_close(index))?;
        Ok(())
    }

    fn video_config(&self, instance: InstanceId) -> Result<VideoConfig, EngineError> {
        let index = index("mse_get_video_config", instance.0)?;
        let mut raw = mse_video_config::default();
        mse!(self.lib, mse_get_video_config(index, &mut raw))?;
        VideoConfig::try_from(raw)
    }

    fn set_video_config(
        &self,
        instance: InstanceId,
        config: &VideoConfig,
    ) -> Result<(), EngineError> {
        let index = index("mse_set_video_config", instance.0)?;
        let mut raw = mse_video_config::from(config);
        mse!(self.lib, mse_set_video_config(index, &mut raw))?;
        Ok(())
    }

    fn mpeg2ts_config(&self, instance: InstanceId) -> Result<Mpeg2tsConfig, EngineError> {
        let index = index("mse_get_mpeg2ts_config", instance.0)?;
        let mut raw = mse_mpeg2ts_config::default();
        mse!(self.lib, mse_get_mpeg2ts_config(index, &mut raw))?;
        Ok(raw.into())
    }

    fn set_mpeg2ts_config(
        &self,
        instance: InstanceId,
        config: &Mpeg2tsConfig,
    ) -> Result<(), EngineError> {
        let index = index("mse_set_mpeg2ts_config", instance.0)?;
        let mut raw = mse_mpeg2ts_config::from(config);
        mse!(self.lib, mse_set_mpeg2ts_config(index, &mut raw))?;
        Ok(())
    }

    fn start_streaming(&self, instance: InstanceId) -> Result<(), EngineError> {
        let index = index("mse_start_streaming", instance.0)?;
        mse!(self.lib, mse_start_streaming(index))?;
        Ok(())
    }

    fn stop_streaming(&self, instance: InstanceId) -> Result<(), EngineError> {
        let index = index("mse_stop_streaming", instance.0)?;
        mse!(self.lib, mse_stop_streaming(index))?;
        Ok(())
    }

    fn start_transmission(
        &self,
        instance: InstanceId,
        mut transfer: Transfer,
    ) -> Result<(), Rejected> {
        let index = match index("mse_start_transmission", instance.0) {
            Ok(index) => index,
            Err(err) => return Err(Rejected::new(err, transfer)),
        };

        let buffer = transfer.as_mut_ptr() as *mut c_void;
        let size = transfer.len();
        let handle = Box::into_raw(Box::new(transfer));

        let status = mse!(
            self.lib,
            mse_start_transmission(
                index,
                buffer,
                size,
                handle as *mut c_void,
                Some(completion_trampoline)
            )
        );

        status.map(|_| ()).map_err(|err| {
            // SAFETY: the engine refused the call and keeps no reference to
            // the handle.
            let transfer = unsafe { Box::from_raw(handle) };
            Rejected::new(err, *transfer)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_config_conversion() {
        let config = VideoConfig {
            format: VideoFormat::Mjpeg,
            bitrate: 8_000_000,
            frame_rate: FrameRate { n: 1, m: 30 },
            bytes_per_frame: 0,
            class_interval_frames: 4,
            max_payload_size: 1500,
        };
        let raw = mse_video_config::from(&config);
        assert_eq!(raw.format, MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_MJPEG);
        assert_eq!(raw.fps.m, 30);
        assert_eq!(VideoConfig::try_from(raw).unwrap(), config);

        let bogus = mse_video_config {
            format: 9,
            ..Default::default()
        };
        assert!(VideoConfig::try_from(bogus).is_err());
    }

    #[test]
    fn test_mpeg2ts_config_conversion() {
        let config = Mpeg2tsConfig {
            tspackets_per_frame: 7,
            bitrate: 0,
            pcr_pid: 0x1000,
        };
        let raw = mse_mpeg2ts_config::from(&config);
        assert_eq!(Mpeg2tsConfig::from(raw), config);
    }

    #[test]
    fn test_media_type() {
        assert_eq!(media_type(MediaType::Video), 0x0001_0000);
        assert_eq!(media_type(MediaType::Mpeg2ts), 0x0002_0000);
    }

    #[test]
    fn test_trampoline_null_handle() {
        let status = unsafe { completion_trampoline(std::ptr::null_mut(), 16) };
        assert_eq!(status, EINVAL);
    }

    #[test]
    fn test_index_range() {
        assert_eq!(index("mse_close", 3).unwrap(), 3);
        let err = index("mse_close", u32::MAX).unwrap_err();
        assert_eq!(err.call(), "mse_close");
        assert_eq!(err.code(), EINVAL);
    }
}
