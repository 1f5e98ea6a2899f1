// This module sequences the stages of one instrumentation run. The three IR stages (index,
// profiling instrumentation, fault-injection instrumentation) run the pass plugin through
// `opt`; both instrumentation stages receive the identical compile-option list so the two
// variants stay structurally consistent. Unless only IR was requested, each variant is then
// compiled to an object file with `llc` and linked against the fault-injection runtime.
// Any non-zero status stops the run. A failing IR stage discards the whole working
// directory; a failing build stage keeps the instrumented IR, removes the object files and
// reports where the IR is so the user can link manually. Linking is the only step that is
// retried: a failed C front end link is attempted once more with the C++ front end.

//! Multi-stage pipeline orchestration.

use std::path::{Path, PathBuf};

use crate::compile_options::CompileOptions;
use crate::core::error::{DriverError, DriverResult};
use crate::core::session::Workspace;
use crate::stage::{Frontend, Invocation, Invoker, Stage, Toolchain};

/// Runtime library linked into both executables by default.
pub const DEFAULT_RUNTIME_LIB: &str = "llfi-rt";

/// Runtime library for the fault-injection executable with `--use-ml-specific-rt`.
pub const ML_RUNTIME_LIB: &str = "ml-lltfi-rt";

/// Libraries every link needs.
pub const DEFAULT_LINK_LIBS: &[&str] = &["pthread"];

/// Per-run settings coming from the command line.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Absolute path of the source IR file.
    pub source: PathBuf,
    /// Emit textual IR (`.ll`) instead of bitcode.
    pub readable: bool,
    /// Stop after the IR stages.
    pub ir_only: bool,
    /// Link the fault-injection variant against the ML-specific runtime.
    pub ml_runtime: bool,
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
}

/// The two instrumented variants of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Profiling,
    FaultInjection,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Profiling, Variant::FaultInjection];

    fn file_suffix(self) -> &'static str {
        match self {
            Variant::Profiling => "-profiling",
            Variant::FaultInjection => "-faultinjection",
        }
    }

    fn pass_flag(self) -> &'static str {
        match self {
            Variant::Profiling => "-profilingpass",
            Variant::FaultInjection => "-faultinjectionpass",
        }
    }

    fn instrument_stage(self) -> Stage {
        match self {
            Variant::Profiling => Stage::Profiling,
            Variant::FaultInjection => Stage::FaultInjection,
        }
    }

    fn compile_stage(self) -> Stage {
        match self {
            Variant::Profiling => Stage::CompileProfiling,
            Variant::FaultInjection => Stage::CompileFaultInjection,
        }
    }

    fn link_stage(self) -> Stage {
        match self {
            Variant::Profiling => Stage::LinkProfiling,
            Variant::FaultInjection => Stage::LinkFaultInjection,
        }
    }
}

/// File names of everything a run produces inside the working directory.
#[derive(Debug, Clone)]
pub struct Artifacts {
    base: PathBuf,
    ir_extension: &'static str,
}

impl Artifacts {
    pub fn new(workspace: &Workspace, source: &Path, readable: bool) -> Self {
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "a".to_string());
        Self {
            base: workspace.artifact(&stem),
            ir_extension: if readable { ".ll" } else { ".bc" },
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn indexed_ir(&self) -> PathBuf {
        self.with_suffix(&format!("-llfi_index{}", self.ir_extension))
    }

    pub fn ir(&self, variant: Variant) -> PathBuf {
        self.with_suffix(&format!("{}{}", variant.file_suffix(), self.ir_extension))
    }

    pub fn object(&self, variant: Variant) -> PathBuf {
        self.with_suffix(&format!("{}.o", variant.file_suffix()))
    }

    pub fn executable(&self, variant: Variant) -> PathBuf {
        self.with_suffix(&format!("{}.exe", variant.file_suffix()))
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub profiling_ir: PathBuf,
    pub fault_injection_ir: PathBuf,
    /// `None` in IR-only mode.
    pub executables: Option<(PathBuf, PathBuf)>,
}

/// A stage that returned a non-zero status.
type Halt = (Stage, i32);

/// Stage orchestrator for one run.
pub struct Pipeline<'a, I: Invoker> {
    toolchain: &'a Toolchain,
    options: &'a PipelineOptions,
    workspace: &'a Workspace,
    artifacts: Artifacts,
    invoker: I,
}

impl<'a, I: Invoker> Pipeline<'a, I> {
    pub fn new(
        toolchain: &'a Toolchain,
        options: &'a PipelineOptions,
        workspace: &'a Workspace,
        invoker: I,
    ) -> Self {
        let artifacts = Artifacts::new(workspace, &options.source, options.readable);
        Self {
            toolchain,
            options,
            workspace,
            artifacts,
            invoker,
        }
    }

    /// Run every stage, cleaning up according to where a failure happened.
    pub fn run(&mut self, compile_options: &CompileOptions) -> DriverResult<PipelineReport> {
        if let Err((stage, status)) = self.instrument(compile_options) {
            log::error!("The {} stage exited with status {}", stage, status);
            self.workspace.discard();
            return Err(DriverError::StageFailed { stage, status });
        }

        let mut report = PipelineReport {
            profiling_ir: self.artifacts.ir(Variant::Profiling),
            fault_injection_ir: self.artifacts.ir(Variant::FaultInjection),
            executables: None,
        };
        if self.options.ir_only {
            return Ok(report);
        }

        if let Err((stage, status)) = self.build() {
            return Err(DriverError::BuildFailed {
                stage,
                status,
                profiling_ir: report.profiling_ir,
                fault_injection_ir: report.fault_injection_ir,
                runtime_dir: self.toolchain.runtime_lib_dir.clone(),
            });
        }

        report.executables = Some((
            self.artifacts.executable(Variant::Profiling),
            self.artifacts.executable(Variant::FaultInjection),
        ));
        Ok(report)
    }

    fn instrument(&mut self, compile_options: &CompileOptions) -> Result<(), Halt> {
        let mut stages = vec![(
            Stage::Index,
            self.index_invocation(compile_options.generate_dot_graph()),
        )];
        for variant in Variant::ALL {
            stages.push((
                variant.instrument_stage(),
                self.instrument_invocation(variant, compile_options),
            ));
        }

        for (stage, invocation) in &stages {
            self.run_stage(*stage, invocation)?;
        }
        Ok(())
    }

    fn build(&mut self) -> Result<(), Halt> {
        let mut objects = Vec::new();
        let result = self.compile_and_link(&mut objects);
        self.workspace.remove_files(&objects);
        result
    }

    fn compile_and_link(&mut self, objects: &mut Vec<PathBuf>) -> Result<(), Halt> {
        for variant in Variant::ALL {
            objects.push(self.artifacts.object(variant));
            let invocation = self.compile_invocation(variant);
            self.run_stage(variant.compile_stage(), &invocation)?;
        }
        for variant in Variant::ALL {
            self.link(variant)?;
        }
        Ok(())
    }

    /// Link one variant, falling back from the C to the C++ front end once.
    fn link(&mut self, variant: Variant) -> Result<(), Halt> {
        let stage = variant.link_stage();
        let mut frontend = Frontend::C;
        loop {
            let invocation = self.link_invocation(variant, frontend);
            let status = self.invoker.invoke(stage, &invocation);
            if status == 0 {
                return Ok(());
            }
            match frontend.fallback() {
                Some(next) => {
                    log::warn!(
                        "...Error linking with {}, trying with {}.",
                        file_name(self.toolchain.frontend(frontend)),
                        file_name(self.toolchain.frontend(next))
                    );
                    frontend = next;
                }
                None => return Err((stage, status)),
            }
        }
    }

    fn run_stage(&mut self, stage: Stage, invocation: &Invocation) -> Result<(), Halt> {
        log::debug!("Running {} stage", stage);
        match self.invoker.invoke(stage, invocation) {
            0 => Ok(()),
            status => Err((stage, status)),
        }
    }

    fn pass_runner(&self) -> Invocation {
        Invocation::new(&self.toolchain.opt)
            .arg("-load-pass-plugin")
            .arg(path_arg(&self.toolchain.pass_plugin))
    }

    fn index_invocation(&self, dot_graph: bool) -> Invocation {
        let mut invocation = self
            .pass_runner()
            .arg("-genllfiindexpass")
            .arg("-o")
            .arg(path_arg(&self.artifacts.indexed_ir()))
            .arg(path_arg(&self.options.source));
        if self.options.readable {
            invocation = invocation.arg("-S");
        }
        if dot_graph {
            invocation = invocation.arg("-dotgraphpass");
        }
        invocation
    }

    fn instrument_invocation(
        &self,
        variant: Variant,
        compile_options: &CompileOptions,
    ) -> Invocation {
        let mut invocation = self
            .pass_runner()
            .arg(variant.pass_flag())
            .args(compile_options)
            .arg("-o")
            .arg(path_arg(&self.artifacts.ir(variant)))
            .arg(path_arg(&self.artifacts.indexed_ir()));
        if self.options.readable {
            invocation = invocation.arg("-S");
        }
        invocation
    }

    fn compile_invocation(&self, variant: Variant) -> Invocation {
        Invocation::new(&self.toolchain.llc)
            .arg("-filetype=obj")
            .arg("-o")
            .arg(path_arg(&self.artifacts.object(variant)))
            .arg(path_arg(&self.artifacts.ir(variant)))
    }

    fn link_invocation(&self, variant: Variant, frontend: Frontend) -> Invocation {
        let runtime = match variant {
            Variant::FaultInjection if self.options.ml_runtime => ML_RUNTIME_LIB,
            _ => DEFAULT_RUNTIME_LIB,
        };
        let runtime_dir = path_arg(&self.toolchain.runtime_lib_dir);

        let mut invocation = Invocation::new(self.toolchain.frontend(frontend))
            .arg("-o")
            .arg(path_arg(&self.artifacts.executable(variant)))
            .arg(path_arg(&self.artifacts.object(variant)))
            .arg(format!("-L{}", runtime_dir))
            .arg(format!("-l{}", runtime))
            .args(DEFAULT_LINK_LIBS.iter().map(|lib| format!("-l{}", lib)));
        for dir in &self.options.lib_dirs {
            invocation = invocation.arg("-L").arg(path_arg(dir));
        }
        invocation
            .args(self.options.libs.iter().map(|lib| format!("-l{}", lib)))
            .arg("-no-pie")
            .arg(format!("-Wl,-rpath,{}", runtime_dir))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_arg(path))
}
