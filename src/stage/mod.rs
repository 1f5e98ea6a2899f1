// This module wraps the invocation of one external tool (the pass runner, the code generator
// or a linker front end). An Invocation is the tool path plus its argument list; an Invoker
// runs it synchronously and reports the exit status. The system invoker spawns the process,
// waits for it, and writes the command line to the debug log so `--verbose` shows every
// step. There is no retry at this layer; the orchestrator decides what a failure means.
// The Invoker trait is the seam the orchestrator is generic over, which lets tests script
// exit statuses without spawning processes.

//! External stage invocation.

pub mod toolchain;

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

pub use toolchain::{Frontend, Toolchain};

/// Exit status used when the tool cannot be spawned at all.
pub const SPAWN_FAILURE_STATUS: i32 = 127;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Index,
    Profiling,
    FaultInjection,
    CompileProfiling,
    CompileFaultInjection,
    LinkProfiling,
    LinkFaultInjection,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Index => "index",
            Stage::Profiling => "profiling instrumentation",
            Stage::FaultInjection => "fault injection instrumentation",
            Stage::CompileProfiling => "profiling object compilation",
            Stage::CompileFaultInjection => "fault injection object compilation",
            Stage::LinkProfiling => "profiling link",
            Stage::LinkFaultInjection => "fault injection link",
        })
    }
}

/// One external tool command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Index of `flag` in the argument list.
    pub fn position(&self, flag: &str) -> Option<usize> {
        self.args.iter().position(|arg| arg == flag)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs external tools on behalf of the orchestrator.
pub trait Invoker {
    /// Run `invocation` to completion and return its exit status (0 is success).
    fn invoke(&mut self, stage: Stage, invocation: &Invocation) -> i32;
}

impl<T: Invoker + ?Sized> Invoker for &mut T {
    fn invoke(&mut self, stage: Stage, invocation: &Invocation) -> i32 {
        (**self).invoke(stage, invocation)
    }
}

/// Spawns real processes.
#[derive(Debug, Default)]
pub struct SystemInvoker;

impl SystemInvoker {
    pub fn new() -> Self {
        Self
    }
}

impl Invoker for SystemInvoker {
    fn invoke(&mut self, stage: Stage, invocation: &Invocation) -> i32 {
        log::debug!("{}", invocation);

        let status = match Command::new(&invocation.tool)
            .args(&invocation.args)
            .status()
        {
            Ok(status) => status,
            Err(err) => {
                log::error!(
                    "Failed to run {} for the {} stage: {}",
                    invocation.tool.display(),
                    stage,
                    err
                );
                return SPAWN_FAILURE_STATUS;
            }
        };

        match status.code() {
            Some(code) => code,
            None => {
                log::error!("{} was terminated by a signal", invocation.tool.display());
                1
            }
        }
    }
}
