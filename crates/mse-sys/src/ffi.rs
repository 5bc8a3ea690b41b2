// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

// Runtime bindings for the Media Streaming Engine adapter API (libmse.so).
// Layout follows the bindgen dynamic-loading style used by the other -sys
// crates so the engine can be loaded without link-time dependencies.

use std::os::raw::{c_char, c_int, c_uint, c_void};

pub const MSE_INDEX_UNDEFINED: c_int = -1;
pub const MSE_NAME_LEN_MAX: usize = 64;

pub type MSE_TYPE = c_uint;
pub const MSE_TYPE_MSE_TYPE_ADAPTER_AUDIO: MSE_TYPE = 0x0000_0000;
pub const MSE_TYPE_MSE_TYPE_ADAPTER_VIDEO: MSE_TYPE = 0x0001_0000;
pub const MSE_TYPE_MSE_TYPE_ADAPTER_MPEG2TS: MSE_TYPE = 0x0002_0000;

pub type MSE_VIDEO_FORMAT_TYPE = c_uint;
pub const MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_BYTE_STREAM: MSE_VIDEO_FORMAT_TYPE = 0;
pub const MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_H264_AVC: MSE_VIDEO_FORMAT_TYPE = 1;
pub const MSE_VIDEO_FORMAT_TYPE_MSE_VIDEO_FORMAT_MJPEG: MSE_VIDEO_FORMAT_TYPE = 2;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct mse_fraction {
    pub n: c_uint,
    pub m: c_uint,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct mse_video_config {
    pub format: MSE_VIDEO_FORMAT_TYPE,
    pub bitrate: c_uint,
    pub fps: mse_fraction,
    pub bytes_per_frame: c_uint,
    pub class_interval_frames: c_uint,
    pub max_payload_size: c_uint,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct mse_mpeg2ts_config {
    pub tspackets_per_frame: c_uint,
    pub bitrate: c_uint,
    pub pcr_pid: c_uint,
}

pub type mse_completion_fn =
    Option<unsafe extern "C" fn(priv_: *mut c_void, size: c_int) -> c_int>;

pub struct MseLibrary {
    __library: ::libloading::Library,
    pub mse_register_adapter_media: unsafe extern "C" fn(
        type_: MSE_TYPE,
        name: *const c_char,
        device_name: *const c_char,
    ) -> c_int,
    pub mse_unregister_adapter_media: unsafe extern "C" fn(index: c_int) -> c_int,
    pub mse_open: unsafe extern "C" fn(index_media: c_int, tx: bool) -> c_int,
    pub mse_close: unsafe extern "C" fn(index: c_int) -> c_int,
    pub mse_get_video_config:
        unsafe extern "C" fn(index: c_int, config: *mut mse_video_config) -> c_int,
    pub mse_set_video_config:
        unsafe extern "C" fn(index: c_int, config: *mut mse_video_config) -> c_int,
    pub mse_get_mpeg2ts_config:
        unsafe extern "C" fn(index: c_int, config: *mut mse_mpeg2ts_config) -> c_int,
    pub mse_set_mpeg2ts_config:
        unsafe extern "C" fn(index: c_int, config: *mut mse_mpeg2ts_config) -> c_int,
    pub mse_start_streaming: unsafe extern "C" fn(index: c_int) -> c_int,
    pub mse_stop_streaming: unsafe extern "C" fn(index: c_int) -> c_int,
    pub mse_start_transmission: unsafe extern "C" fn(
        index: c_int,
        buffer: *mut c_void,
        buffer_size: usize,
        priv_: *mut c_void,
        mse_completion: mse_completion_fn,
    ) -> c_int,
}

impl MseLibrary {
    pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
    where
        P: AsRef<::std::ffi::OsStr> + ::libloading::AsFilename,
    {
        let library = ::libloading::Library::new(path)?;
        Self::from_library(library)
    }

    pub unsafe fn from_library<L>(library: L) -> Result<Self, ::libloading::Error>
    where
        L: Into<::libloading::Library>,
    {
        let __library = library.into();
        let mse_register_adapter_media = *__library.get(b"mse_register_adapter_media\0")?;
        let mse_unregister_adapter_media = *__library.get(b"mse_unregister_adapter_media\0")?;
        let mse_open = *__library.get(b"mse_open\0")?;
        let mse_close = *__library.get(b"mse_close\0")?;
        let mse_get_video_config = *__library.get(b"mse_get_video_config\0")?;
        let mse_set_video_config = *__library.get(b"mse_set_video_config\0")?;
        let mse_get_mpeg2ts_config = *__library.get(b"mse_get_mpeg2ts_config\0")?;
        let mse_set_mpeg2ts_config = *__library.get(b"mse_set_mpeg2ts_config\0")?;
        let mse_start_streaming = *__library.get(b"mse_start_streaming\0")?;
        let mse_stop_streaming = *__library.get(b"mse_stop_streaming\0")?;
        let mse_start_transmission = *__library.get(b"mse_start_transmission\0")?;
        Ok(MseLibrary {
            __library,
            mse_register_adapter_media,
            mse_unregister_adapter_media,
            mse_open,
            mse_close,
            mse_get_video_config,
            mse_set_video_config,
            mse_get_mpeg2ts_config,
            mse_set_mpeg2ts_config,
            mse_start_streaming,
            mse_stop_streaming,
            mse_start_transmission,
        })
    }

    pub unsafe fn mse_register_adapter_media(
        &self,
        type_: MSE_TYPE,
        name: *const c_char,
        device_name: *const c_char,
    ) -> c_int {
        (self.mse_register_adapter_media)(type_, name, device_name)
    }

    pub unsafe fn mse_unregister_adapter_media(&self, index: c_int) -> c_int {
        (self.mse_unregister_adapter_media)(index)
    }

    pub unsafe fn mse_open(&self, index_media: c_int, tx: bool) -> c_int {
        (self.mse_open)(index_media, tx)
    }

    pub unsafe fn mse_close(&self, index: c_int) -> c_int {
        (self.mse_close)(index)
    }

    pub unsafe fn mse_get_video_config(&self, index: c_int, config: *mut mse_video_config) -> c_int {
        (self.mse_get_video_config)(index, config)
    }

    pub unsafe fn mse_set_video_config(&self, index: c_int, config: *mut mse_video_config) -> c_int {
        (self.mse_set_video_config)(index, config)
    }

    pub unsafe fn mse_get_mpeg2ts_config(
        &self,
        index: c_int,
        config: *mut mse_mpeg2ts_config,
    ) -> c_int {
        (self.mse_get_mpeg2ts_config)(index, config)
    }

    pub unsafe fn mse_set_mpeg2ts_config(
        &self,
        index: c_int,
        config: *mut mse_mpeg2ts_config,
    ) -> c_int {
        (self.mse_set_mpeg2ts_config)(index, config)
    }

    pub unsafe fn mse_start_streaming(&self, index: c_int) -> c_int {
        (self.mse_start_streaming)(index)
    }

    pub unsafe fn mse_stop_streaming(&self, index: c_int) -> c_int {
        (self.mse_stop_streaming)(index)
    }

    pub unsafe fn mse_start_transmission(
        &self,
        index: c_int,
        buffer: *mut c_void,
        buffer_size: usize,
        priv_: *mut c_void,
        mse_completion: mse_completion_fn,
    ) -> c_int {
        (self.mse_start_transmission)(index, buffer, buffer_size, priv_, mse_completion)
    }
}
