//! Paths of the external tools the pipeline drives.
//!
//! `opt` and `llc` come from the LLVM installation, the two linker front ends from the
//! directory holding `clang`/`clang++`, and the pass plugin and runtime library from the
//! driver's own installation unless overridden.

use std::env;
use std::path::{Path, PathBuf};

use crate::core::error::{DriverError, DriverResult};

/// Linker front end. C is tried first, C++ once as a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    C,
    Cxx,
}

impl Frontend {
    /// The front end to retry with after this one failed.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Frontend::C => Some(Frontend::Cxx),
            Frontend::Cxx => None,
        }
    }
}

/// User-provided overrides; anything left `None` gets its default.
#[derive(Debug, Clone, Default)]
pub struct ToolchainOverrides {
    pub llvm_root: Option<PathBuf>,
    pub gxx_bin_dir: Option<PathBuf>,
    pub pass_plugin: Option<PathBuf>,
    pub runtime_lib_dir: Option<PathBuf>,
}

/// Resolved tool paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub opt: PathBuf,
    pub llc: PathBuf,
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub pass_plugin: PathBuf,
    pub runtime_lib_dir: PathBuf,
}

impl Toolchain {
    /// Resolve tool paths against `install_root`, the driver's installation prefix.
    pub fn resolve(overrides: &ToolchainOverrides, install_root: &Path) -> DriverResult<Self> {
        let llvm_tool = |name: &str| match &overrides.llvm_root {
            Some(root) => root.join("bin").join(name),
            None => PathBuf::from(name),
        };
        let frontend = |name: &str| match &overrides.gxx_bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };

        let pass_plugin = match &overrides.pass_plugin {
            Some(path) => path.clone(),
            None => install_root
                .join("llvm_passes")
                .join(format!("llfi-passes.{}", plugin_extension()?)),
        };
        let runtime_lib_dir = overrides
            .runtime_lib_dir
            .clone()
            .unwrap_or_else(|| install_root.join("runtime_lib"));

        let toolchain = Self {
            opt: llvm_tool("opt"),
            llc: llvm_tool("llc"),
            cc: frontend("clang"),
            cxx: frontend("clang++"),
            pass_plugin,
            runtime_lib_dir,
        };
        log::debug!("{:?}", toolchain);
        Ok(toolchain)
    }

    /// Installation prefix: the parent of the directory holding the running executable.
    pub fn install_root() -> DriverResult<PathBuf> {
        let exe = env::current_exe().map_err(|err| DriverError::io("current executable", err))?;
        let bin_dir = exe.parent().unwrap_or(Path::new("."));
        Ok(bin_dir.parent().unwrap_or(bin_dir).to_path_buf())
    }

    pub fn frontend(&self, frontend: Frontend) -> &Path {
        match frontend {
            Frontend::C => &self.cc,
            Frontend::Cxx => &self.cxx,
        }
    }
}

fn plugin_extension() -> DriverResult<&'static str> {
    if cfg!(target_os = "linux") {
        Ok("so")
    } else if cfg!(target_os = "macos") {
        Ok("dylib")
    } else {
        Err(DriverError::UnsupportedPlatform {
            platform: env::consts::OS,
        })
    }
}
