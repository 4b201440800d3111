//! Static catalog of node kinds.
//!
//! Everything the rest of the editor knows about a node type (port
//! arity, display label, icon, configuration fields) comes from this
//! module. Adding a new kind means adding a variant here; the exhaustive
//! matches force every accessor to be updated at compile time.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The closed set of node kinds the editor can place on a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Llm,
    Script,
    Condition,
    Input,
    Output,
}

/// Number of input/output connection points a node kind exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub inputs: u8,
    pub outputs: u8,
}

impl PortSpec {
    const fn new(inputs: u8, outputs: u8) -> Self {
        PortSpec { inputs, outputs }
    }
}

/// Control type backing a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Select,
    Textarea,
}

/// One entry in a node kind's configuration form.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub default: Option<&'static str>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub options: &'static [&'static str],
    pub required: bool,
    /// Field holds an expression that should parse under the condition
    /// grammar. Validated client-side only.
    pub expression: bool,
}

impl FieldDescriptor {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        FieldDescriptor {
            name,
            label,
            kind,
            default: None,
            min: None,
            max: None,
            step: None,
            options: &[],
            required: false,
            expression: false,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn with_default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    const fn with_options(mut self, options: &'static [&'static str]) -> Self {
        self.options = options;
        self
    }

    const fn with_bounds(mut self, min: f64, max: f64, step: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.step = Some(step);
        self
    }

    const fn expression(mut self) -> Self {
        self.expression = true;
        self
    }
}

const LLM_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("model", "Model", FieldKind::Select)
        .with_options(&["gpt-3.5-turbo", "gpt-4", "deepseek-chat"])
        .with_default("gpt-3.5-turbo")
        .required(),
    FieldDescriptor::new("prompt", "Prompt", FieldKind::Textarea).required(),
    FieldDescriptor::new("temperature", "Temperature", FieldKind::Number)
        .with_bounds(0.0, 2.0, 0.1)
        .with_default("0.7"),
];

const SCRIPT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("language", "Language", FieldKind::Select)
        .with_options(&["python", "javascript", "bash"])
        .with_default("python")
        .required(),
    FieldDescriptor::new("code", "Code", FieldKind::Textarea).required(),
];

const CONDITION_FIELDS: &[FieldDescriptor] = &[FieldDescriptor::new(
    "condition",
    "Condition expression",
    FieldKind::Textarea,
)
.required()
.expression()];

const INPUT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("variable", "Variable name", FieldKind::Text).required(),
    FieldDescriptor::new("default", "Default value", FieldKind::Text),
];

const OUTPUT_FIELDS: &[FieldDescriptor] =
    &[FieldDescriptor::new("variable", "Variable name", FieldKind::Text).required()];

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Start,
        NodeKind::End,
        NodeKind::Llm,
        NodeKind::Script,
        NodeKind::Condition,
        NodeKind::Input,
        NodeKind::Output,
    ];

    /// Resolve a wire tag. Unknown tags yield `None`, never a panic.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "start" => Some(NodeKind::Start),
            "end" => Some(NodeKind::End),
            "llm" => Some(NodeKind::Llm),
            "script" => Some(NodeKind::Script),
            "condition" => Some(NodeKind::Condition),
            "input" => Some(NodeKind::Input),
            "output" => Some(NodeKind::Output),
            _ => None,
        }
    }

    /// Closest known kind for a mistyped tag, accepting small edit
    /// distances only.
    pub fn suggest(tag: &str) -> Option<Self> {
        let mut best: Option<(NodeKind, usize)> = None;
        for kind in NodeKind::ALL {
            let d = strsim::levenshtein(tag, kind.tag());
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((kind, d));
            }
        }
        best.and_then(|(kind, d)| (d <= 3).then_some(kind))
    }

    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Llm => "llm",
            NodeKind::Script => "script",
            NodeKind::Condition => "condition",
            NodeKind::Input => "input",
            NodeKind::Output => "output",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::End => "End",
            NodeKind::Llm => "LLM",
            NodeKind::Script => "Script",
            NodeKind::Condition => "Condition",
            NodeKind::Input => "Input",
            NodeKind::Output => "Output",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            NodeKind::Start => "fas fa-play-circle",
            NodeKind::End => "fas fa-stop-circle",
            NodeKind::Llm => "fas fa-brain",
            NodeKind::Script => "fas fa-code",
            NodeKind::Condition => "fas fa-code-branch",
            NodeKind::Input => "fas fa-keyboard",
            NodeKind::Output => "fas fa-terminal",
        }
    }

    /// Accent color used when rendering the node header.
    pub fn color(self) -> &'static str {
        match self {
            NodeKind::Start => "#10a37f",
            NodeKind::End => "#ef4146",
            NodeKind::Llm => "#19c37d",
            NodeKind::Script => "#f4a261",
            NodeKind::Condition => "#9d4edd",
            NodeKind::Input => "#4cc9f0",
            NodeKind::Output => "#f72585",
        }
    }

    pub fn ports(self) -> PortSpec {
        match self {
            NodeKind::Start => PortSpec::new(0, 1),
            NodeKind::End => PortSpec::new(1, 0),
            NodeKind::Llm => PortSpec::new(1, 1),
            NodeKind::Script => PortSpec::new(1, 1),
            NodeKind::Condition => PortSpec::new(1, 2),
            NodeKind::Input => PortSpec::new(0, 1),
            NodeKind::Output => PortSpec::new(1, 0),
        }
    }

    pub fn config_fields(self) -> &'static [FieldDescriptor] {
        match self {
            NodeKind::Start | NodeKind::End => &[],
            NodeKind::Llm => LLM_FIELDS,
            NodeKind::Script => SCRIPT_FIELDS,
            NodeKind::Condition => CONDITION_FIELDS,
            NodeKind::Input => INPUT_FIELDS,
            NodeKind::Output => OUTPUT_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldDescriptor> {
        self.config_fields().iter().find(|f| f.name == name)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_for_every_kind() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::parse(kind.tag()), Some(kind));
        }
        assert_eq!(NodeKind::parse("subflow"), None);
    }

    #[test]
    fn suggestions_accept_near_misses_only() {
        assert_eq!(NodeKind::suggest("scirpt"), Some(NodeKind::Script));
        assert_eq!(NodeKind::suggest("condtion"), Some(NodeKind::Condition));
        assert_eq!(NodeKind::suggest("frobnicator"), None);
    }

    #[test]
    fn branching_kinds_expose_two_outputs() {
        assert_eq!(NodeKind::Condition.ports().outputs, 2);
        assert_eq!(NodeKind::End.ports().outputs, 0);
        assert_eq!(NodeKind::Start.ports().inputs, 0);
    }

    #[test]
    fn numeric_fields_carry_defaults() {
        let temp = NodeKind::Llm.field("temperature").unwrap();
        assert_eq!(temp.default, Some("0.7"));
        assert_eq!(temp.min, Some(0.0));
        assert_eq!(temp.max, Some(2.0));
    }
}
