//! Fault-injection instrumentation driver.
//!
//! Turns one LLVM IR file into a profiling variant and a fault-injection variant of the
//! program. The `compileOption` section of the `input.yaml` next to the IR file is
//! validated, translated into pass flags, and fed to the external pass runner, code
//! generator and linker front ends.
//!
//! # Primary Usage
//!
//! ```ignore
//! use fi_instrument::{CompileOptions, Configuration, Pipeline, SystemInvoker};
//!
//! let config = fi_instrument::config::load_from_dir(source_dir)?;
//! let options = CompileOptions::translate(&config)?;
//! let mut pipeline = Pipeline::new(&toolchain, &pipeline_options, &workspace, SystemInvoker::new());
//! let report = pipeline.run(&options)?;
//! ```
//!
//! # Architecture
//!
//! - [`config`] - Typed configuration model and structural validation
//! - [`compile_options`] - Configuration to pass-flag translation
//! - [`stage`] - External tool invocation and toolchain paths
//! - [`pipeline`] - Stage sequencing, cleanup and link fallback
//! - [`core`] - Errors and the working directory session
//! - [`cli`] - The `instrument` command line

pub mod cli;
pub mod compile_options;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod stage;

pub use compile_options::CompileOptions;
pub use config::Configuration;
pub use crate::core::{ConfigError, DriverError, DriverResult, Workspace};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport, Variant};
pub use stage::{Invocation, Invoker, Stage, SystemInvoker, Toolchain};
