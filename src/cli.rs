// This module holds the command line of the `instrument` binary and the glue that turns it
// into one pipeline run: resolve the source IR file and the toolchain, create the working
// directory next to the source, load and translate input.yaml, then hand everything to the
// orchestrator. A configuration failure removes the freshly created working directory before
// the error is returned, so a rejected configuration never leaves partial output behind.

//! Driver command line.

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::LevelFilter;

use crate::compile_options::CompileOptions;
use crate::config;
use crate::core::error::{DriverError, DriverResult};
use crate::core::session::{Workspace, DEFAULT_OUTPUT_DIR};
use crate::pipeline::{Pipeline, PipelineOptions, PipelineReport};
use crate::stage::toolchain::ToolchainOverrides;
use crate::stage::{Invoker, SystemInvoker, Toolchain};

/// Generate profiling and fault-injection variants of an LLVM IR file.
///
/// input.yaml must be present in the same directory as the source IR file.
#[derive(Parser, Debug, Clone)]
#[command(name = "instrument", version)]
pub struct Cli {
    /// Source IR file.
    pub source: PathBuf,

    /// Directory created next to the source file for the generated files.
    #[arg(long = "dir", value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub dir: String,

    /// Add a directory to the library search path.
    #[arg(short = 'L', value_name = "LIB_DIR")]
    pub lib_dirs: Vec<PathBuf>,

    /// Link a library.
    #[arg(short = 'l', value_name = "LIB")]
    pub libs: Vec<String>,

    /// Generate human-readable IR files.
    #[arg(long)]
    pub readable: bool,

    /// Only generate the instrumented IR files.
    #[arg(long = "IRonly")]
    pub ir_only: bool,

    /// Show verbose information.
    #[arg(long)]
    pub verbose: bool,

    /// Link the fault-injection executable against the ML-specific runtime.
    #[arg(long = "use-ml-specific-rt")]
    pub use_ml_specific_rt: bool,

    /// LLVM installation holding bin/opt and bin/llc.
    #[arg(long, env = "LLVM_DST_ROOT", value_name = "DIR")]
    pub llvm_root: Option<PathBuf>,

    /// Directory holding clang and clang++.
    #[arg(long, env = "LLVM_GXX_BIN_DIR", value_name = "DIR")]
    pub llvm_gxx_bin_dir: Option<PathBuf>,

    /// Pass plugin loaded by opt.
    #[arg(long, env = "FI_PASS_PLUGIN", value_name = "FILE")]
    pub pass_plugin: Option<PathBuf>,

    /// Directory holding the fault-injection runtime libraries.
    #[arg(long, env = "FI_RUNTIME_LIB_DIR", value_name = "DIR")]
    pub runtime_lib_dir: Option<PathBuf>,
}

impl Cli {
    /// Run the pipeline with real processes.
    pub fn run(&self) -> DriverResult<PipelineReport> {
        self.run_with(SystemInvoker::new())
    }

    /// Run the pipeline with the given invoker.
    pub fn run_with<I: Invoker>(&self, invoker: I) -> DriverResult<PipelineReport> {
        let cwd = env::current_dir().map_err(|err| DriverError::io(".", err))?;
        let source = absolute(&cwd, &self.source);
        let source_dir = source.parent().unwrap_or(cwd.as_path()).to_path_buf();

        let toolchain =
            Toolchain::resolve(&self.toolchain_overrides(), &Toolchain::install_root()?)?;
        let workspace = Workspace::create(&source_dir, &self.dir)?;

        let compile_options = match load_compile_options(&source_dir) {
            Ok(options) => options,
            Err(err) => {
                workspace.discard();
                return Err(err);
            }
        };

        let options = PipelineOptions {
            source,
            readable: self.readable,
            ir_only: self.ir_only,
            ml_runtime: self.use_ml_specific_rt,
            lib_dirs: self.lib_dirs.iter().map(|dir| absolute(&cwd, dir)).collect(),
            libs: self.libs.clone(),
        };

        Pipeline::new(&toolchain, &options, &workspace, invoker).run(&compile_options)
    }

    fn toolchain_overrides(&self) -> ToolchainOverrides {
        ToolchainOverrides {
            llvm_root: self.llvm_root.clone(),
            gxx_bin_dir: self.llvm_gxx_bin_dir.clone(),
            pass_plugin: self.pass_plugin.clone(),
            runtime_lib_dir: self.runtime_lib_dir.clone(),
        }
    }
}

fn load_compile_options(source_dir: &Path) -> DriverResult<CompileOptions> {
    let configuration = config::load_from_dir(source_dir)?;
    Ok(CompileOptions::translate(&configuration)?)
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Install the env_logger backend; `--verbose` lowers the default filter to debug.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_filter);
    logging_builder(env, verbose).init();
}

/// `--verbose` keeps this crate at debug level even when `RUST_LOG` asks for less.
fn logging_builder(env: env_logger::Env<'_>, verbose: bool) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(env);
    if verbose {
        builder.filter_module("fi_instrument", LevelFilter::Debug);
    }
    builder.format_timestamp(None).format_target(false);
    builder
}
