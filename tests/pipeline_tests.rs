//! End-to-end pipeline tests driven through a scripted invoker.
//!
//! The invoker records every stage invocation, creates the `-o` output file of stages that
//! succeed, and returns scripted exit statuses for the stages a test wants to fail.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use fi_instrument::cli::Cli;
use fi_instrument::{DriverError, Invocation, Invoker, Stage};
use tempfile::TempDir;

const MINIMAL_CONFIG: &str = r#"
compileOption:
  instSelMethod:
    - insttype:
        include:
          - all
  regSelMethod: regloc
  regloc: dst
"#;

#[derive(Default)]
struct ScriptedInvoker {
    failures: HashMap<Stage, VecDeque<i32>>,
    calls: Vec<(Stage, Invocation)>,
}

impl ScriptedInvoker {
    fn failing(mut self, stage: Stage, statuses: &[i32]) -> Self {
        self.failures
            .entry(stage)
            .or_default()
            .extend(statuses.iter().copied());
        self
    }

    fn stages(&self) -> Vec<Stage> {
        self.calls.iter().map(|(stage, _)| *stage).collect()
    }

    fn calls_for(&self, stage: Stage) -> Vec<&Invocation> {
        self.calls
            .iter()
            .filter(|(called, _)| *called == stage)
            .map(|(_, invocation)| invocation)
            .collect()
    }
}

impl Invoker for ScriptedInvoker {
    fn invoke(&mut self, stage: Stage, invocation: &Invocation) -> i32 {
        self.calls.push((stage, invocation.clone()));
        let status = self
            .failures
            .get_mut(&stage)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0);
        if status == 0 {
            if let Some(pos) = invocation.position("-o") {
                fs::write(&invocation.args[pos + 1], b"").unwrap();
            }
        }
        status
    }
}

struct Fixture {
    tmp: TempDir,
    source: PathBuf,
}

impl Fixture {
    fn new(config: Option<&str>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("prog.ll");
        fs::write(&source, "define i32 @main() {\n  ret i32 0\n}\n").unwrap();
        if let Some(config) = config {
            fs::write(tmp.path().join("input.yaml"), config).unwrap();
        }
        Self { tmp, source }
    }

    fn out_dir(&self) -> PathBuf {
        self.tmp.path().join("llfi")
    }

    fn out(&self, name: &str) -> PathBuf {
        self.out_dir().join(name)
    }

    fn cli(&self, extra: &[&str]) -> Cli {
        let mut args = vec![
            "instrument".to_string(),
            "--llvm-root".to_string(),
            "/opt/llvm".to_string(),
            "--llvm-gxx-bin-dir".to_string(),
            "/opt/llvm/bin".to_string(),
            "--pass-plugin".to_string(),
            "/opt/fi/llfi-passes.so".to_string(),
            "--runtime-lib-dir".to_string(),
            "/opt/fi/runtime_lib".to_string(),
        ];
        args.extend(extra.iter().map(|arg| arg.to_string()));
        args.push(self.source.display().to_string());
        Cli::try_parse_from(args).unwrap()
    }
}

fn flags_between(invocation: &Invocation, pass: &str) -> Vec<String> {
    let start = invocation.position(pass).unwrap() + 1;
    let end = invocation.position("-o").unwrap();
    invocation.args[start..end].to_vec()
}

fn objects_in(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("o"))
        .collect()
}

#[test]
fn ir_only_produces_two_instrumented_ir_files() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default();

    let report = fixture.cli(&["--IRonly"]).run_with(&mut invoker).unwrap();

    assert_eq!(
        invoker.stages(),
        [Stage::Index, Stage::Profiling, Stage::FaultInjection]
    );
    assert_eq!(report.profiling_ir, fixture.out("prog-profiling.bc"));
    assert_eq!(report.fault_injection_ir, fixture.out("prog-faultinjection.bc"));
    assert!(report.executables.is_none());
    assert!(report.profiling_ir.exists());
    assert!(report.fault_injection_ir.exists());
    assert!(objects_in(&fixture.out_dir()).is_empty());
    assert!(!fixture.out("prog-profiling.exe").exists());
}

#[test]
fn stage_command_lines_follow_the_tool_contract() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default();
    fixture.cli(&["--IRonly"]).run_with(&mut invoker).unwrap();

    let index = invoker.calls_for(Stage::Index)[0];
    assert_eq!(index.tool, Path::new("/opt/llvm/bin/opt"));
    assert_eq!(
        index.args,
        [
            "-load-pass-plugin".to_string(),
            "/opt/fi/llfi-passes.so".to_string(),
            "-genllfiindexpass".to_string(),
            "-o".to_string(),
            fixture.out("prog-llfi_index.bc").display().to_string(),
            fixture.source.display().to_string(),
        ]
    );

    let profiling = invoker.calls_for(Stage::Profiling)[0];
    assert_eq!(
        flags_between(profiling, "-profilingpass"),
        ["-insttype", "-includeinst=all", "-regloc", "-dst"]
    );
    assert_eq!(
        profiling.args.last().unwrap(),
        &fixture.out("prog-llfi_index.bc").display().to_string()
    );
}

#[test]
fn both_instrumentation_stages_receive_identical_options() {
    let fixture = Fixture::new(Some(
        r#"
compileOption:
  instSelMethod:
    - customInstselector:
        include: [BitFlip-Res]
        options: [-fidatamodel=1]
  regSelMethod: customregselector
  customRegSelector: Automatic
  customRegSelectorOption: [-fiexcludeloads]
  includeInjectionTrace: [forward, backward]
  tracingPropagation: True
  tracingPropagationOption:
    maxTrace: 5
"#,
    ));
    let mut invoker = ScriptedInvoker::default();
    fixture.cli(&["--IRonly"]).run_with(&mut invoker).unwrap();

    let profiling = flags_between(invoker.calls_for(Stage::Profiling)[0], "-profilingpass");
    let fault_injection = flags_between(
        invoker.calls_for(Stage::FaultInjection)[0],
        "-faultinjectionpass",
    );
    assert_eq!(profiling, fault_injection);
    assert_eq!(
        profiling,
        [
            "-custominstselector",
            "-fiinstselectorname=BitFlip-Res",
            "-fidatamodel=1",
            "-customregselector",
            "-firegselectorname=BitFlip-Res",
            "-fiexcludeloads",
            "-includeforwardtrace",
            "-includebackwardtrace",
            "-insttracepass",
            "-maxtrace",
            "5",
        ]
    );
}

#[test]
fn readable_and_dot_graph_flags_reach_the_index_stage() {
    let fixture = Fixture::new(Some(
        r#"
compileOption:
  instSelMethod:
    - funcname:
        include: [compute]
  regSelMethod: regloc
  regloc: dstreg
  tracingPropagation: true
  tracingPropagationOption:
    generateCDFG: "True"
"#,
    ));
    let mut invoker = ScriptedInvoker::default();
    let report = fixture
        .cli(&["--IRonly", "--readable"])
        .run_with(&mut invoker)
        .unwrap();

    let index = invoker.calls_for(Stage::Index)[0];
    assert!(index.position("-S").is_some());
    assert!(index.position("-dotgraphpass").is_some());
    assert_eq!(report.profiling_ir, fixture.out("prog-profiling.ll"));
    assert_eq!(
        invoker.calls_for(Stage::FaultInjection)[0].args.last().unwrap(),
        "-S"
    );
}

#[test]
fn index_failure_removes_the_working_directory() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default().failing(Stage::Index, &[3]);

    let err = fixture.cli(&[]).run_with(&mut invoker).unwrap_err();

    assert!(matches!(
        err,
        DriverError::StageFailed {
            stage: Stage::Index,
            status: 3
        }
    ));
    assert_eq!(err.exit_code(), 3);
    assert!(!fixture.out_dir().exists());
    assert_eq!(invoker.stages(), [Stage::Index]);
}

#[test]
fn fault_injection_failure_removes_the_working_directory() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default().failing(Stage::FaultInjection, &[2]);

    let err = fixture.cli(&[]).run_with(&mut invoker).unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(!fixture.out_dir().exists());
    assert!(invoker.calls_for(Stage::CompileProfiling).is_empty());
}

#[test]
fn full_build_links_both_executables_and_removes_objects() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default();

    let report = fixture
        .cli(&["-L", "vendor/lib", "-lm"])
        .run_with(&mut invoker)
        .unwrap();

    assert_eq!(
        invoker.stages(),
        [
            Stage::Index,
            Stage::Profiling,
            Stage::FaultInjection,
            Stage::CompileProfiling,
            Stage::CompileFaultInjection,
            Stage::LinkProfiling,
            Stage::LinkFaultInjection,
        ]
    );
    let (profiling_exe, fault_injection_exe) = report.executables.unwrap();
    assert!(profiling_exe.exists());
    assert!(fault_injection_exe.exists());
    assert!(objects_in(&fixture.out_dir()).is_empty());

    let compile = invoker.calls_for(Stage::CompileProfiling)[0];
    assert_eq!(compile.tool, Path::new("/opt/llvm/bin/llc"));
    assert_eq!(compile.args[0], "-filetype=obj");

    let link = invoker.calls_for(Stage::LinkProfiling)[0];
    assert_eq!(link.tool, Path::new("/opt/llvm/bin/clang"));
    assert_eq!(link.args[0], "-o");
    assert_eq!(link.args[1], profiling_exe.display().to_string());
    for expected in [
        "-L/opt/fi/runtime_lib",
        "-lllfi-rt",
        "-lpthread",
        "-lm",
        "-no-pie",
        "-Wl,-rpath,/opt/fi/runtime_lib",
    ] {
        assert!(
            link.position(expected).is_some(),
            "missing {} in {}",
            expected,
            link
        );
    }
    let lib_dir = link.position("-L").unwrap();
    assert!(link.args[lib_dir + 1].ends_with("vendor/lib"));
    assert!(Path::new(&link.args[lib_dir + 1]).is_absolute());
}

#[test]
fn ml_runtime_only_applies_to_the_fault_injection_link() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default();
    fixture
        .cli(&["--use-ml-specific-rt"])
        .run_with(&mut invoker)
        .unwrap();

    let profiling = invoker.calls_for(Stage::LinkProfiling)[0];
    let fault_injection = invoker.calls_for(Stage::LinkFaultInjection)[0];
    assert!(profiling.position("-lllfi-rt").is_some());
    assert!(profiling.position("-lml-lltfi-rt").is_none());
    assert!(fault_injection.position("-lml-lltfi-rt").is_some());
    assert!(fault_injection.position("-lllfi-rt").is_none());
}

#[test]
fn link_falls_back_to_the_cxx_frontend_once() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default().failing(Stage::LinkProfiling, &[1]);

    let report = fixture.cli(&[]).run_with(&mut invoker).unwrap();

    let attempts = invoker.calls_for(Stage::LinkProfiling);
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].tool, Path::new("/opt/llvm/bin/clang"));
    assert_eq!(attempts[1].tool, Path::new("/opt/llvm/bin/clang++"));
    assert_eq!(attempts[0].args, attempts[1].args);

    // The fault-injection link starts over with the C front end.
    let fault_injection = invoker.calls_for(Stage::LinkFaultInjection);
    assert_eq!(fault_injection.len(), 1);
    assert_eq!(fault_injection[0].tool, Path::new("/opt/llvm/bin/clang"));

    let (profiling_exe, fault_injection_exe) = report.executables.unwrap();
    assert!(profiling_exe.exists());
    assert!(fault_injection_exe.exists());
}

#[test]
fn link_failure_with_both_frontends_keeps_the_ir() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default().failing(Stage::LinkFaultInjection, &[1, 4]);

    let err = fixture.cli(&[]).run_with(&mut invoker).unwrap_err();

    assert_eq!(invoker.calls_for(Stage::LinkFaultInjection).len(), 2);
    assert_eq!(err.exit_code(), 4);
    let message = err.to_string();
    assert!(message.contains(&fixture.out("prog-profiling.bc").display().to_string()));
    assert!(message.contains(&fixture.out("prog-faultinjection.bc").display().to_string()));
    assert!(fixture.out("prog-profiling.bc").exists());
    assert!(fixture.out("prog-faultinjection.bc").exists());
    assert!(objects_in(&fixture.out_dir()).is_empty());
}

#[test]
fn object_compile_failure_skips_linking_and_keeps_the_ir() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default().failing(Stage::CompileFaultInjection, &[5]);

    let err = fixture.cli(&[]).run_with(&mut invoker).unwrap_err();

    assert!(matches!(
        err,
        DriverError::BuildFailed {
            stage: Stage::CompileFaultInjection,
            status: 5,
            ..
        }
    ));
    assert!(invoker.calls_for(Stage::LinkProfiling).is_empty());
    assert!(fixture.out("prog-profiling.bc").exists());
    assert!(!fixture.out("prog-profiling.o").exists());
}

#[test]
fn configuration_errors_remove_the_working_directory() {
    let fixture = Fixture::new(Some(
        r#"
compileOption:
  instSelMethod:
    - insttype:
        include: [all]
  regSelMethod: customregselector
  customRegSelector: Automatic
"#,
    ));
    let mut invoker = ScriptedInvoker::default();

    let err = fixture.cli(&[]).run_with(&mut invoker).unwrap_err();

    assert!(matches!(err, DriverError::Config(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(!fixture.out_dir().exists());
    assert!(invoker.calls.is_empty());
}

#[test]
fn missing_configuration_file_removes_the_working_directory() {
    let fixture = Fixture::new(None);
    let mut invoker = ScriptedInvoker::default();

    let err = fixture.cli(&[]).run_with(&mut invoker).unwrap_err();

    assert!(matches!(err, DriverError::ConfigFileMissing { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(!fixture.out_dir().exists());
}

#[test]
fn existing_output_directory_is_never_reused() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    fs::create_dir(fixture.out_dir()).unwrap();
    fs::write(fixture.out("keep.txt"), b"previous run").unwrap();
    let mut invoker = ScriptedInvoker::default();

    let err = fixture.cli(&[]).run_with(&mut invoker).unwrap_err();

    assert!(matches!(err, DriverError::OutputDirExists { .. }));
    assert!(fixture.out("keep.txt").exists());
    assert!(invoker.calls.is_empty());
}

#[test]
fn custom_output_directory_name() {
    let fixture = Fixture::new(Some(MINIMAL_CONFIG));
    let mut invoker = ScriptedInvoker::default();

    let report = fixture
        .cli(&["--dir", "fi-out", "--IRonly"])
        .run_with(&mut invoker)
        .unwrap();

    assert_eq!(
        report.profiling_ir,
        fixture.tmp.path().join("fi-out").join("prog-profiling.bc")
    );
    assert!(!fixture.out_dir().exists());
}
