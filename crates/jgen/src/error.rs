use std::{error, fmt};

use serde_json::Value;

/// A fatal problem in the grammar source. Compilation stops at the first one.
#[derive(Debug)]
pub enum GrammarError {
    /// The grammar text is not valid JSON.
    Json(serde_json::Error),
    /// The top level value is not a dict of rules.
    NotADictionary,
    UndeclaredRule {
        rule: Option<String>,
        name: String,
    },
    MalformedRange {
        rule: String,
        value: String,
        reason: &'static str,
    },
    InvalidRange {
        rule: String,
        value: String,
    },
    MalformedMatcher {
        rule: String,
        value: String,
        reason: &'static str,
    },
    UnexpectedShape {
        rule: String,
        value: String,
        expected: &'static str,
    },
    UnknownOperator {
        rule: String,
        operator: String,
    },
    MalformedDict {
        rule: String,
        value: String,
        reason: &'static str,
    },
    MalformedParameters {
        rule: String,
        value: String,
    },
    ArityMismatch {
        rule: String,
        callee: String,
        expected: usize,
        provided: usize,
    },
    UnknownVariable {
        rule: String,
        variable: String,
    },
    MalformedCase {
        rule: String,
        value: String,
        reason: &'static str,
    },
    MissingCasePolicy {
        rule: String,
    },
    EmptySubtract {
        rule: String,
    },
}

impl GrammarError {
    /// Name of the rule whose body contains the offending construct.
    pub fn rule(&self) -> Option<&str> {
        match self {
            GrammarError::Json(_) | GrammarError::NotADictionary => None,
            GrammarError::UndeclaredRule { rule, .. } => rule.as_deref(),
            GrammarError::MalformedRange { rule, .. }
            | GrammarError::InvalidRange { rule, .. }
            | GrammarError::MalformedMatcher { rule, .. }
            | GrammarError::UnexpectedShape { rule, .. }
            | GrammarError::UnknownOperator { rule, .. }
            | GrammarError::MalformedDict { rule, .. }
            | GrammarError::MalformedParameters { rule, .. }
            | GrammarError::ArityMismatch { rule, .. }
            | GrammarError::UnknownVariable { rule, .. }
            | GrammarError::MalformedCase { rule, .. }
            | GrammarError::MissingCasePolicy { rule }
            | GrammarError::EmptySubtract { rule } => Some(rule),
        }
    }
}

impl error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            GrammarError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = self.rule() {
            write!(f, "in rule `{rule}`: ")?;
        }
        match self {
            GrammarError::Json(e) => write!(f, "Invalid grammar JSON\n{e}"),
            GrammarError::NotADictionary => {
                write!(f, "The grammar must be a dict from rule names to expressions")
            }
            GrammarError::UndeclaredRule { name, .. } => {
                write!(f, "Reference to undeclared rule `{name}`")
            }
            GrammarError::MalformedRange { value, reason, .. } => {
                write!(f, "Malformed range {value}: {reason}")
            }
            GrammarError::InvalidRange { value, .. } => {
                write!(f, "Range {value} has a lower bound above its upper bound")
            }
            GrammarError::MalformedMatcher { value, reason, .. } => {
                write!(f, "Malformed character matcher {value}: {reason}")
            }
            GrammarError::UnexpectedShape {
                value, expected, ..
            } => write!(f, "Unexpected {value}, expected {expected}"),
            GrammarError::UnknownOperator { operator, .. } => {
                write!(f, "Unknown operator `{operator}`")
            }
            GrammarError::MalformedDict { value, reason, .. } => {
                write!(f, "Malformed dict {value}: {reason}")
            }
            GrammarError::MalformedParameters { value, .. } => write!(
                f,
                "Malformed parameter declaration {value}, expected a name or a list of distinct names"
            ),
            GrammarError::ArityMismatch {
                callee,
                expected,
                provided,
                ..
            } => write!(
                f,
                "Rule `{callee}` expects {expected} arguments, got {provided}"
            ),
            GrammarError::UnknownVariable { variable, .. } => {
                write!(f, "`{variable}` is not a parameter of this rule")
            }
            GrammarError::MalformedCase { value, reason, .. } => {
                write!(f, "Malformed (case) {value}: {reason}")
            }
            GrammarError::MissingCasePolicy { .. } => write!(
                f,
                "(case) needs an explicit policy for values without a label, set `unmatched_case`"
            ),
            GrammarError::EmptySubtract { .. } => write!(f, "(---) needs at least one operand"),
        }
    }
}

impl From<serde_json::Error> for GrammarError {
    fn from(value: serde_json::Error) -> Self {
        GrammarError::Json(value)
    }
}

/// Compact rendering of a JSON value for diagnostics.
pub(crate) fn snippet(value: &Value) -> String {
    const MAX: usize = 80;

    let mut string = value.to_string();
    if string.len() > MAX {
        let mut end = MAX;
        while !string.is_char_boundary(end) {
            end -= 1;
        }
        string.truncate(end);
        string.push_str("...");
    }
    string
}

#[test]
fn test_error_display() {
    let err = GrammarError::ArityMismatch {
        rule: "s-indent-le".into(),
        callee: "s-indent".into(),
        expected: 1,
        provided: 2,
    };
    assert_eq!(
        err.to_string(),
        "in rule `s-indent-le`: Rule `s-indent` expects 1 arguments, got 2"
    );

    let err = GrammarError::UndeclaredRule {
        rule: None,
        name: "l-yaml-stream".into(),
    };
    assert_eq!(
        err.to_string(),
        "Reference to undeclared rule `l-yaml-stream`"
    );
}

#[test]
fn test_snippet_truncates() {
    let long = Value::String("a".repeat(200));
    let short = snippet(&long);
    assert!(short.ends_with("..."));
    assert_eq!(short.len(), 83);
    assert_eq!(snippet(&Value::from(vec!["a", "z"])), r#"["a","z"]"#);
}
