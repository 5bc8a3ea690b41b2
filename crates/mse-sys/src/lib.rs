// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::too_many_arguments)]

mod ffi;

pub use ffi::*;

// Re-export libloading for error handling
pub use libloading;

use std::sync::{Mutex, OnceLock};

static LIBRARY: OnceLock<MseLibrary> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Default engine library searched in the standard system paths.
pub const DEFAULT_LIBRARY: &str = "libmse.so";

/// Load the Media Streaming Engine library.
///
/// The first successful call loads the library and caches it for the
/// lifetime of the process; later calls return the cached handle. A failed
/// load is not cached so a later call can retry once the engine is installed.
///
/// The environment variable `MSE_LIBRARY` can be used to specify a custom
/// path to the library.
pub fn init() -> Result<&'static MseLibrary, libloading::Error> {
    if let Some(lib) = LIBRARY.get() {
        return Ok(lib);
    }

    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    // Double-check after acquiring lock
    if let Some(lib) = LIBRARY.get() {
        return Ok(lib);
    }

    let lib_path = std::env::var("MSE_LIBRARY").unwrap_or_else(|_| DEFAULT_LIBRARY.to_string());

    let lib = unsafe { MseLibrary::new(lib_path.as_str())? };

    Ok(LIBRARY.get_or_init(|| lib))
}

/// Try to get a reference to the loaded library without loading it
pub fn try_library() -> Option<&'static MseLibrary> {
    LIBRARY.get()
}
