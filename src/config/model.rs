//! Typed configuration model.
//!
//! The `compileOption` section of input.yaml decoded into tagged variants. Values of this
//! module are constructed once per run by [`super::Configuration::from_document`] and
//! are read-only afterwards.

use std::fmt;
use std::num::NonZeroU64;

/// Instruction selection method tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    InstType,
    FuncName,
    CustomInstSelector,
}

impl SelectionKind {
    /// Parse the YAML tag of a selection rule.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "insttype" => Some(SelectionKind::InstType),
            "funcname" => Some(SelectionKind::FuncName),
            "customInstselector" => Some(SelectionKind::CustomInstSelector),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            SelectionKind::InstType => "insttype",
            SelectionKind::FuncName => "funcname",
            SelectionKind::CustomInstSelector => "customInstselector",
        }
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One entry of `instSelMethod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRule {
    pub kind: SelectionKind,
    pub include: Vec<String>,
    pub exclude: Option<Vec<String>>,
    /// Appended to the pass flags verbatim.
    pub extra_options: Vec<String>,
}

/// The ordered, non-empty `instSelMethod` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSelection {
    rules: Vec<SelectionRule>,
}

impl InstructionSelection {
    /// Callers guarantee `rules` is non-empty.
    pub(crate) fn new(rules: Vec<SelectionRule>) -> Self {
        debug_assert!(!rules.is_empty());
        Self { rules }
    }

    pub fn rules(&self) -> &[SelectionRule] {
        &self.rules
    }

    /// The rule that decides the selection method: the last one listed.
    pub fn active(&self) -> &SelectionRule {
        &self.rules[self.rules.len() - 1]
    }

    /// The `customInstselector` rule, if one is configured.
    pub fn custom_rule(&self) -> Option<&SelectionRule> {
        self.rules
            .iter()
            .find(|rule| rule.kind == SelectionKind::CustomInstSelector)
    }
}

/// Name given to `customRegSelector`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegSelectorName {
    /// Borrow the name of the custom instruction selector.
    Automatic,
    /// Same resolution as `Automatic`.
    SoftwareFault,
    Named(String),
}

impl RegSelectorName {
    pub fn parse(name: &str) -> Self {
        match name {
            "Automatic" => RegSelectorName::Automatic,
            "SoftwareFault" => RegSelectorName::SoftwareFault,
            other => RegSelectorName::Named(other.to_string()),
        }
    }
}

impl fmt::Display for RegSelectorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegSelectorName::Automatic => f.write_str("Automatic"),
            RegSelectorName::SoftwareFault => f.write_str("SoftwareFault"),
            RegSelectorName::Named(name) => f.write_str(name),
        }
    }
}

/// `regSelMethod` together with its method-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterSelection {
    RegLoc {
        location: String,
    },
    Custom {
        name: RegSelectorName,
        extra_options: Vec<String>,
    },
}

/// Direction of an injection trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    Forward,
    Backward,
}

impl TraceDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "forward" => Some(TraceDirection::Forward),
            "backward" => Some(TraceDirection::Backward),
            _ => None,
        }
    }
}

/// Options of an enabled `tracingPropagation`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracingPropagation {
    pub debug_trace: bool,
    pub max_trace: Option<NonZeroU64>,
    /// Ask the index stage for a control/data-flow graph.
    pub generate_cdfg: bool,
}

/// The validated `compileOption` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub instruction_selection: InstructionSelection,
    pub register_selection: RegisterSelection,
    pub injection_trace: Vec<TraceDirection>,
    /// `None` unless `tracingPropagation` is enabled.
    pub tracing_propagation: Option<TracingPropagation>,
}
