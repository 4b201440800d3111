//! Dynamic configuration forms.
//!
//! A form is generated from the node kind's field descriptors and edited
//! through named controls; it never learns about presentation. Both the
//! inline properties panel and the modal dialog build one of these over
//! the same node, so whichever saves last wins.

use std::collections::BTreeMap;

use crate::graph::Node;
use crate::registry::{FieldDescriptor, FieldKind, NodeKind};

/// One rendered control: the descriptor it came from plus the current
/// edit buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FormControl {
    pub field: &'static FieldDescriptor,
    pub value: String,
}

/// A client-side validation finding. None of these block persistence on
/// their own; callers decide which ones to enforce.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldIssue {
    Missing { field: &'static str },
    NotNumeric { field: &'static str, value: String },
    OutOfRange { field: &'static str, min: f64, max: f64 },
    BadExpression { field: &'static str, message: String },
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldIssue::Missing { field } => write!(f, "{field} is required"),
            FieldIssue::NotNumeric { field, value } => {
                write!(f, "{field} must be a number, got `{value}`")
            }
            FieldIssue::OutOfRange { field, min, max } => {
                write!(f, "{field} must be between {min} and {max}")
            }
            FieldIssue::BadExpression { field, message } => {
                write!(f, "{field} does not parse: {message}")
            }
        }
    }
}

/// Editable form over one node's configuration payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigForm {
    kind: NodeKind,
    controls: Vec<FormControl>,
}

impl ConfigForm {
    /// Build the form for a node, prefilled from its current
    /// configuration, falling back to descriptor defaults. Returns `None`
    /// for kinds with no configuration fields; the modal path shows a
    /// notice instead of an empty form.
    pub fn for_node(node: &Node) -> Option<Self> {
        Self::with_values(node.kind, &node.config)
    }

    pub fn with_values(kind: NodeKind, current: &BTreeMap<String, String>) -> Option<Self> {
        let fields = kind.config_fields();
        if fields.is_empty() {
            return None;
        }
        let controls = fields
            .iter()
            .map(|field| FormControl {
                field,
                value: current
                    .get(field.name)
                    .cloned()
                    .or_else(|| field.default.map(str::to_string))
                    .unwrap_or_default(),
            })
            .collect();
        Some(ConfigForm { kind, controls })
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn controls(&self) -> &[FormControl] {
        &self.controls
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.controls
            .iter()
            .find(|c| c.field.name == name)
            .map(|c| c.value.as_str())
    }

    /// Update one control's edit buffer. Names outside the descriptor
    /// list are a logged no-op; the form only ever writes known keys.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.controls.iter_mut().find(|c| c.field.name == name) {
            Some(control) => control.value = value.into(),
            None => tracing::warn!(field = name, kind = self.kind.tag(), "ignoring unknown field"),
        }
    }

    /// The mapping a save writes back: exactly the descriptor-defined
    /// names, empty string for anything the user left blank.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.controls
            .iter()
            .map(|c| (c.field.name.to_string(), c.value.clone()))
            .collect()
    }

    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        for control in &self.controls {
            let field = control.field;
            let value = control.value.trim();
            if field.required && value.is_empty() {
                issues.push(FieldIssue::Missing { field: field.name });
                continue;
            }
            if value.is_empty() {
                continue;
            }
            if field.kind == FieldKind::Number {
                match value.parse::<f64>() {
                    Ok(number) => {
                        let below = field.min.map_or(false, |min| number < min);
                        let above = field.max.map_or(false, |max| number > max);
                        if below || above {
                            issues.push(FieldIssue::OutOfRange {
                                field: field.name,
                                min: field.min.unwrap_or(f64::NEG_INFINITY),
                                max: field.max.unwrap_or(f64::INFINITY),
                            });
                        }
                    }
                    Err(_) => issues.push(FieldIssue::NotNumeric {
                        field: field.name,
                        value: control.value.clone(),
                    }),
                }
            }
            if field.expression {
                if let Err(err) = evalexpr::build_operator_tree::<evalexpr::DefaultNumericTypes>(value) {
                    issues.push(FieldIssue::BadExpression {
                        field: field.name,
                        message: err.to_string(),
                    });
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefills_from_config_then_defaults_then_empty() {
        let mut current = BTreeMap::new();
        current.insert("prompt".to_string(), "Summarize {input}".to_string());
        let form = ConfigForm::with_values(NodeKind::Llm, &current).unwrap();
        assert_eq!(form.value("prompt"), Some("Summarize {input}"));
        assert_eq!(form.value("temperature"), Some("0.7"));
        assert_eq!(form.value("model"), Some("gpt-3.5-turbo"));
    }

    #[test]
    fn zero_field_kinds_have_no_form() {
        assert!(ConfigForm::with_values(NodeKind::Start, &BTreeMap::new()).is_none());
        assert!(ConfigForm::with_values(NodeKind::End, &BTreeMap::new()).is_none());
    }

    #[test]
    fn unknown_keys_are_never_written() {
        let mut current = BTreeMap::new();
        current.insert("stray".to_string(), "value".to_string());
        let mut form = ConfigForm::with_values(NodeKind::Output, &current).unwrap();
        form.set("stray", "still ignored");
        let values = form.values();
        assert!(!values.contains_key("stray"));
        assert_eq!(values.get("variable").map(String::as_str), Some(""));
    }

    #[test]
    fn validation_flags_required_numeric_and_expression_problems() {
        let mut form = ConfigForm::with_values(NodeKind::Llm, &BTreeMap::new()).unwrap();
        form.set("prompt", "");
        form.set("temperature", "7.5");
        let issues = form.validate();
        assert!(issues.contains(&FieldIssue::Missing { field: "prompt" }));
        assert!(issues
            .iter()
            .any(|i| matches!(i, FieldIssue::OutOfRange { field: "temperature", .. })));

        let mut form = ConfigForm::with_values(NodeKind::Condition, &BTreeMap::new()).unwrap();
        form.set("condition", "x > ");
        assert!(form
            .validate()
            .iter()
            .any(|i| matches!(i, FieldIssue::BadExpression { field: "condition", .. })));

        form.set("condition", "x > 5");
        assert!(form.validate().is_empty());
    }
}
