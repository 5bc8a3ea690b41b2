// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments or configuration
    InvalidArgs(String),
    /// Streaming engine library or instance not available
    EngineUnavailable(String),
    /// Streaming could not be started or stalled
    Streaming(String),
    /// General error from the adapter library
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::EngineUnavailable(msg) => write!(f, "Engine unavailable: {}", msg),
            CliError::Streaming(msg) => write!(f, "Streaming failed: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            CliError::InvalidArgs(_) => 2,
            CliError::EngineUnavailable(_) => 3,
            CliError::Streaming(_) => 4,
            CliError::General(_) => 1,
        }
    }
}

/// Map mse_adapter::Error to CliError with appropriate exit codes
impl From<mse_adapter::Error> for CliError {
    fn from(err: mse_adapter::Error) -> Self {
        use mse_adapter::Error;

        match err {
            Error::LibraryNotLoaded(lib_err) => {
                CliError::EngineUnavailable(format!("Failed to load library: {}", lib_err))
            }
            Error::NotBound => CliError::EngineUnavailable("No engine instance bound".to_string()),

            Error::Engine(engine_err) => CliError::Streaming(engine_err.to_string()),

            Error::InvalidArgument(msg) => CliError::InvalidArgs(msg),
            Error::UnsupportedFormat(fourcc) => {
                CliError::InvalidArgs(format!("Unsupported format: {}", fourcc))
            }
            err @ Error::BufferTooSmall { .. } => CliError::InvalidArgs(err.to_string()),

            err @ (Error::Busy | Error::PermissionDenied(_)) => {
                CliError::General(err.to_string())
            }
        }
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
