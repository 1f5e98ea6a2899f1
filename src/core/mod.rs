// This module groups the infrastructure shared by every part of the instrumentation driver:
// the error taxonomy (configuration errors, stage failures and the exit codes they map to)
// and the working-directory session that owns every artifact a run produces.

//! Core driver infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - `ConfigError` for invalid `compileOption` sections
//! - `DriverError` for everything the driver can terminate with
//!
//! ## Session (`session`)
//! - Creates the output directory once, never reusing an existing one
//! - Discards partial output when a run fails

pub mod error;
pub mod session;

pub use error::{ConfigError, ConfigResult, DriverError, DriverResult};
pub use session::{Workspace, DEFAULT_OUTPUT_DIR};
