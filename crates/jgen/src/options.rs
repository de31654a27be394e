use std::{fmt::Display, str::FromStr};

/// What a `(case)` does when the parameter value has no matching label.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CasePolicy {
    /// The switch fails like any other mismatch.
    Fail,
    /// The switch panics through `jgen_runtime::unmatched_case`.
    Panic,
}

impl FromStr for CasePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(CasePolicy::Fail),
            "panic" => Ok(CasePolicy::Panic),
            other => Err(format!(
                "Unknown policy `{other}`, expected `fail` or `panic`"
            )),
        }
    }
}

impl Display for CasePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CasePolicy::Fail => f.write_str("fail"),
            CasePolicy::Panic => f.write_str("panic"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Rule the generated parser starts from.
    pub start: String,
    /// Required as soon as a reachable rule uses `(case)`.
    pub unmatched_case: Option<CasePolicy>,
    /// Shown in the header of the generated file.
    pub source_name: Option<String>,
}

impl CompileOptions {
    pub const DEFAULT_START: &'static str = "l-yaml-stream";

    pub fn with_start(start: impl Into<String>) -> CompileOptions {
        CompileOptions {
            start: start.into(),
            ..Default::default()
        }
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            start: Self::DEFAULT_START.to_owned(),
            unmatched_case: None,
            source_name: None,
        }
    }
}

#[test]
fn test_case_policy_from_str() {
    assert_eq!("fail".parse(), Ok(CasePolicy::Fail));
    assert_eq!("panic".parse(), Ok(CasePolicy::Panic));
    assert!("ignore".parse::<CasePolicy>().is_err());
    assert_eq!(CasePolicy::Panic.to_string(), "panic");
}
