// This module translates a validated Configuration into the ordered list of pass flags that
// the profiling and fault-injection stages receive. The translation is a pure function of
// the configuration: four groups are appended in a fixed order (instruction selection,
// register selection, injection trace, tracing propagation) because the instrumentation
// passes read some flags positionally (`-maxtrace` is followed by its bound) and let later
// duplicates win. The only cross-field rule lives here too: a custom register selector named
// "Automatic" or "SoftwareFault" borrows the name of the custom instruction selector. Besides
// the flags, the translation reports whether the index stage should emit a dot graph.

//! Compile-option translation.

use std::fmt;

use crate::config::{
    Configuration, InstructionSelection, RegSelectorName, RegisterSelection, SelectionKind,
    TraceDirection, TracingPropagation,
};
use crate::core::error::{ConfigError, ConfigResult};

/// Flags shared verbatim by the profiling and fault-injection stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    flags: Vec<String>,
    generate_dot_graph: bool,
}

impl CompileOptions {
    /// Translate a configuration into stage flags.
    pub fn translate(config: &Configuration) -> ConfigResult<Self> {
        let mut options = CompileOptions::default();

        options.push_instruction_selection(&config.instruction_selection);
        options.push_register_selection(config)?;
        options.push_injection_trace(&config.injection_trace);
        if let Some(tracing) = &config.tracing_propagation {
            options.push_tracing_propagation(tracing);
        }

        log::debug!("Compile options: {}", options);
        Ok(options)
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Whether the index stage should also run the dot graph pass.
    pub fn generate_dot_graph(&self) -> bool {
        self.generate_dot_graph
    }

    fn push(&mut self, flag: impl Into<String>) {
        self.flags.push(flag.into());
    }

    fn push_instruction_selection(&mut self, selection: &InstructionSelection) {
        let rule = selection.active();

        match rule.kind {
            SelectionKind::InstType | SelectionKind::FuncName => {
                let target = if rule.kind == SelectionKind::InstType {
                    "inst"
                } else {
                    "func"
                };
                self.push(format!("-{}", rule.kind.tag()));
                for entry in &rule.include {
                    self.push(format!("-include{}={}", target, entry));
                }
                for entry in rule.exclude.iter().flatten() {
                    self.push(format!("-exclude{}={}", target, entry));
                }
            }
            SelectionKind::CustomInstSelector => {
                self.push("-custominstselector");
                // Only the first entry names the selector; exclude has no meaning here.
                if let Some(name) = rule.include.first() {
                    self.push(format!("-fiinstselectorname={}", name));
                }
            }
        }

        self.flags.extend(rule.extra_options.iter().cloned());
    }

    fn push_register_selection(&mut self, config: &Configuration) -> ConfigResult<()> {
        match &config.register_selection {
            RegisterSelection::RegLoc { location } => {
                self.push("-regloc");
                self.push(format!("-{}", location));
            }
            RegisterSelection::Custom {
                name,
                extra_options,
            } => {
                self.push("-customregselector");
                let name = resolve_register_selector(name, &config.instruction_selection)?;
                self.push(format!("-firegselectorname={}", name));
                self.flags.extend(extra_options.iter().cloned());
            }
        }
        Ok(())
    }

    fn push_injection_trace(&mut self, directions: &[TraceDirection]) {
        for direction in directions {
            self.push(match direction {
                TraceDirection::Forward => "-includeforwardtrace",
                TraceDirection::Backward => "-includebackwardtrace",
            });
        }
    }

    fn push_tracing_propagation(&mut self, tracing: &TracingPropagation) {
        log::warn!(
            "You enabled 'tracingPropagation' in input.yaml. The generated executables will \
             be able to output dynamic values for instructions, but they take longer to \
             execute. If you don't want the trace, disable the option and re-run instrument."
        );

        self.push("-insttracepass");
        if tracing.debug_trace {
            self.push("-debugtrace");
        }
        if let Some(bound) = tracing.max_trace {
            self.push("-maxtrace");
            self.push(bound.to_string());
        }
        if tracing.generate_cdfg {
            self.generate_dot_graph = true;
        }
    }
}

impl fmt::Display for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flags.join(" "))
    }
}

impl<'a> IntoIterator for &'a CompileOptions {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.iter()
    }
}

/// Resolve the register selector name, following the custom instruction selector for
/// `Automatic` and `SoftwareFault`.
pub fn resolve_register_selector(
    name: &RegSelectorName,
    selection: &InstructionSelection,
) -> ConfigResult<String> {
    match name {
        RegSelectorName::Named(name) => Ok(name.clone()),
        RegSelectorName::Automatic | RegSelectorName::SoftwareFault => selection
            .custom_rule()
            .and_then(|rule| rule.include.first())
            .cloned()
            .ok_or_else(|| ConfigError::UnresolvableAutomaticSelector {
                name: name.to_string(),
            }),
    }
}
