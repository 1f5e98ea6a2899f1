// This module turns the configuration document that sits next to the source IR file into a
// strongly-typed Configuration. The document is first decoded by serde_yaml into a generic
// value tree; Configuration::from_document then walks the `compileOption` section and checks
// it structurally: the selection method tags must be known, method-specific fields must be
// present, and values must have the expected shape. Every failure becomes one ConfigError
// variant instead of an ad hoc message at the point of lookup. Semantic checks that need the
// whole configuration (resolving an "Automatic" register selector) happen in the translator.

//! Configuration loading and structural validation.

pub mod model;

use std::fs;
use std::io;
use std::num::NonZeroU64;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::core::error::{ConfigError, ConfigResult, DriverError, DriverResult};

pub use model::{
    Configuration, InstructionSelection, RegSelectorName, RegisterSelection, SelectionKind,
    SelectionRule, TraceDirection, TracingPropagation,
};

/// File name of the configuration document, colocated with the source IR file.
pub const CONFIG_FILE_NAME: &str = "input.yaml";

/// Read and validate `input.yaml` from `dir`.
pub fn load_from_dir(dir: &Path) -> DriverResult<Configuration> {
    let path = dir.join(CONFIG_FILE_NAME);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DriverError::ConfigFileMissing {
                dir: dir.to_path_buf(),
            })
        }
        Err(err) => return Err(DriverError::io(path, err)),
    };

    let document: Value = serde_yaml::from_str(&text)?;
    if log::log_enabled!(log::Level::Debug) {
        if let Ok(dump) = serde_yaml::to_string(&document) {
            log::debug!("{}:\n{}", path.display(), dump);
        }
    }

    Ok(Configuration::from_document(&document)?)
}

impl Configuration {
    /// Validate a decoded document holding a `compileOption` section.
    pub fn from_document(document: &Value) -> ConfigResult<Self> {
        let options = document.get("compileOption").ok_or(ConfigError::MissingKey {
            key: "compileOption",
        })?;
        Self::from_compile_option(options)
    }

    /// Validate the `compileOption` mapping itself.
    pub fn from_compile_option(options: &Value) -> ConfigResult<Self> {
        let options = options.as_mapping().ok_or_else(|| ConfigError::InvalidType {
            key: "compileOption".to_string(),
            expected: "a mapping",
        })?;

        let instruction_selection = parse_instruction_selection(options)?;
        let register_selection = parse_register_selection(options)?;
        let injection_trace = parse_injection_trace(options)?;
        let tracing_propagation = parse_tracing_propagation(options)?;

        Ok(Self {
            instruction_selection,
            register_selection,
            injection_trace,
            tracing_propagation,
        })
    }
}

fn parse_instruction_selection(options: &Mapping) -> ConfigResult<InstructionSelection> {
    let methods = options
        .get("instSelMethod")
        .ok_or(ConfigError::MissingKey {
            key: "instSelMethod",
        })?
        .as_sequence()
        .ok_or_else(|| ConfigError::InvalidType {
            key: "instSelMethod".to_string(),
            expected: "a list of selection methods",
        })?;

    if methods.is_empty() {
        return Err(ConfigError::EmptySelection);
    }

    let rules = methods
        .iter()
        .map(parse_selection_rule)
        .collect::<ConfigResult<Vec<_>>>()?;

    let custom_rules = rules
        .iter()
        .filter(|rule| rule.kind == SelectionKind::CustomInstSelector)
        .count();
    if custom_rules > 1 {
        return Err(ConfigError::MultipleCustomSelectors);
    }

    if rules.len() > 1 {
        log::warn!(
            "instSelMethod lists {} selection methods; only the last one ({}) is used",
            rules.len(),
            rules[rules.len() - 1].kind
        );
    }

    Ok(InstructionSelection::new(rules))
}

fn parse_selection_rule(entry: &Value) -> ConfigResult<SelectionRule> {
    let mapping = entry.as_mapping().ok_or_else(|| ConfigError::InvalidType {
        key: "instSelMethod".to_string(),
        expected: "a list of single-key mappings",
    })?;
    let (tag, body) = mapping.iter().next().ok_or_else(|| ConfigError::InvalidType {
        key: "instSelMethod".to_string(),
        expected: "a list of single-key mappings",
    })?;

    let tag = scalar_string(tag).unwrap_or_default();
    let kind = SelectionKind::from_tag(&tag).ok_or(ConfigError::UnknownMethod {
        what: "instruction",
        method: tag,
    })?;

    let missing_include = || ConfigError::MissingField {
        method: kind.tag().to_string(),
        field: "include",
    };
    let include = body.get("include").ok_or_else(missing_include)?;
    let include = string_list(include, "include")?;
    if kind == SelectionKind::CustomInstSelector && include.is_empty() {
        return Err(missing_include());
    }

    let exclude = body
        .get("exclude")
        .map(|value| string_list(value, "exclude"))
        .transpose()?;
    let extra_options = body
        .get("options")
        .map(|value| string_list(value, "options"))
        .transpose()?
        .unwrap_or_default();

    Ok(SelectionRule {
        kind,
        include,
        exclude,
        extra_options,
    })
}

fn parse_register_selection(options: &Mapping) -> ConfigResult<RegisterSelection> {
    let method = options.get("regSelMethod").ok_or(ConfigError::MissingKey {
        key: "regSelMethod",
    })?;
    let method = scalar_string(method).ok_or_else(|| ConfigError::InvalidType {
        key: "regSelMethod".to_string(),
        expected: "a string",
    })?;

    match method.as_str() {
        "regloc" => {
            let location = options.get("regloc").ok_or_else(|| ConfigError::MissingField {
                method: method.clone(),
                field: "regloc",
            })?;
            let location = scalar_string(location).ok_or_else(|| ConfigError::InvalidType {
                key: "regloc".to_string(),
                expected: "a string",
            })?;
            Ok(RegisterSelection::RegLoc { location })
        }
        "customregselector" => {
            let name = options
                .get("customRegSelector")
                .ok_or_else(|| ConfigError::MissingField {
                    method: method.clone(),
                    field: "customRegSelector",
                })?;
            let name = scalar_string(name).ok_or_else(|| ConfigError::InvalidType {
                key: "customRegSelector".to_string(),
                expected: "a string",
            })?;
            let extra_options = options
                .get("customRegSelectorOption")
                .map(|value| string_list(value, "customRegSelectorOption"))
                .transpose()?
                .unwrap_or_default();
            Ok(RegisterSelection::Custom {
                name: RegSelectorName::parse(&name),
                extra_options,
            })
        }
        _ => Err(ConfigError::UnknownMethod {
            what: "register",
            method: method.clone(),
        }),
    }
}

fn parse_injection_trace(options: &Mapping) -> ConfigResult<Vec<TraceDirection>> {
    let Some(traces) = options.get("includeInjectionTrace") else {
        return Ok(Vec::new());
    };
    string_list(traces, "includeInjectionTrace")?
        .into_iter()
        .map(|value| {
            TraceDirection::parse(&value).ok_or(ConfigError::InvalidTraceDirection { value })
        })
        .collect()
}

fn parse_tracing_propagation(options: &Mapping) -> ConfigResult<Option<TracingPropagation>> {
    let enabled = options
        .get("tracingPropagation")
        .map(is_true)
        .unwrap_or(false);
    if !enabled {
        return Ok(None);
    }

    let Some(extra) = options.get("tracingPropagationOption") else {
        return Ok(Some(TracingPropagation::default()));
    };

    let max_trace = extra.get("maxTrace").map(parse_max_trace).transpose()?;

    Ok(Some(TracingPropagation {
        debug_trace: extra.get("debugTrace").map(is_true).unwrap_or(false),
        max_trace,
        generate_cdfg: extra.get("generateCDFG").map(is_true).unwrap_or(false),
    }))
}

fn parse_max_trace(value: &Value) -> ConfigResult<NonZeroU64> {
    value
        .as_u64()
        .and_then(NonZeroU64::new)
        .ok_or_else(|| ConfigError::InvalidMaxTrace {
            value: describe(value),
        })
}

/// YAML booleans, the number 1, or strings spelling "true" in any case.
fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64() == Some(1.0),
        Value::String(text) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value, key: &str) -> ConfigResult<Vec<String>> {
    let invalid = || ConfigError::InvalidType {
        key: key.to_string(),
        expected: "a list of strings",
    };
    value
        .as_sequence()
        .ok_or_else(invalid)?
        .iter()
        .map(|item| scalar_string(item).ok_or_else(invalid))
        .collect()
}

fn describe(value: &Value) -> String {
    scalar_string(value).unwrap_or_else(|| format!("{:?}", value))
}
