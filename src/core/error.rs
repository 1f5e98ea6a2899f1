// This module defines the error types for the instrumentation driver using the thiserror
// crate. ConfigError covers everything that can be wrong with the `compileOption` section
// of input.yaml: missing keys, unknown selection methods, missing method-specific fields,
// values of the wrong shape, and the cross-reference between a register selector named
// "Automatic" and the custom instruction selector it borrows its name from. DriverError is
// the top-level error returned by the driver: it wraps ConfigError and adds the file system
// failures around the working directory and the two stage-failure kinds reported by the
// orchestrator. DriverError::exit_code maps every variant onto the process exit status the
// driver terminates with, propagating the failing tool's own status for stage failures.

//! Error types for the instrumentation driver.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::stage::Stage;

/// Validation errors for the decoded configuration document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Please include a '{key}' key value pair under compileOption in input.yaml")]
    MissingKey { key: &'static str },

    #[error("Unknown {what} selection method '{method}' in input.yaml")]
    UnknownMethod { what: &'static str, method: String },

    #[error("A '{field}' entry must be present for the {method} method in input.yaml")]
    MissingField { method: String, field: &'static str },

    #[error("'{key}' in input.yaml must be {expected}")]
    InvalidType {
        key: String,
        expected: &'static str,
    },

    #[error("'instSelMethod' in input.yaml must list at least one selection method")]
    EmptySelection,

    #[error(
        "Only one customInstselector may be configured in input.yaml; \
         use a batch instrumentation run to apply a list of fault models"
    )]
    MultipleCustomSelectors,

    #[error(
        "Cannot resolve the '{name}' register selector: no customInstselector \
         with an 'include' entry is configured under instSelMethod"
    )]
    UnresolvableAutomaticSelector { name: String },

    #[error("Invalid injection trace '{value}' in input.yaml (forward/backward allowed)")]
    InvalidTraceDirection { value: String },

    #[error("maxTrace must be an integer greater than 0 in input.yaml, got '{value}'")]
    InvalidMaxTrace { value: String },
}

/// Result type alias for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level driver error.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No input.yaml file in the {dir} directory")]
    ConfigFileMissing { dir: PathBuf },

    #[error("input.yaml is not formatted in proper YAML (reminder: use spaces, not tabs): {0}")]
    MalformedConfig(#[from] serde_yaml::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "{name} already exists under {parent}, you can either specify a different \
         directory for --dir or remove {name} from {parent}"
    )]
    OutputDirExists { name: String, parent: PathBuf },

    #[error("Cannot use '{name}' for --dir: {reason}")]
    InvalidOutputDir { name: String, reason: &'static str },

    #[error("Platform '{platform}' is not supported; pass --pass-plugin explicitly")]
    UnsupportedPlatform { platform: &'static str },

    #[error(
        "There was an error during the {stage} stage (exit status {status}), \
         please follow the provided instructions for instrument"
    )]
    StageFailed { stage: Stage, status: i32 },

    #[error(
        "There was an error during the {stage} stage (exit status {status}) while \
         generating executables. Please take {} and {} and generate the executables \
         manually (linking the runtime in directory {})",
        .profiling_ir.display(),
        .fault_injection_ir.display(),
        .runtime_dir.display()
    )]
    BuildFailed {
        stage: Stage,
        status: i32,
        profiling_ir: PathBuf,
        fault_injection_ir: PathBuf,
        runtime_dir: PathBuf,
    },
}

impl DriverError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit status the driver process terminates with.
    ///
    /// Stage failures propagate the tool's own status; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::StageFailed { status, .. } | DriverError::BuildFailed { status, .. }
                if *status != 0 =>
            {
                *status
            }
            _ => 1,
        }
    }
}

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
