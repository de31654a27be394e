//! Compiler from JSON encoded grammars to backtracking recursive descent parsers.
//!
//! The grammar is a dict from rule name to expression. Compilation resolves the
//! rules reachable from a start rule into a [`Program`] and emits Rust source
//! that runs on top of the `jgen-runtime` crate.

pub mod build;
pub mod document;
pub mod emit;
pub mod error;
pub mod expr;
pub mod literal;
pub mod options;
pub mod resolve;

pub use document::GrammarDocument;
pub use error::GrammarError;
pub use expr::{CaseLabel, Expression, Term};
pub use options::{CasePolicy, CompileOptions};
pub use resolve::{Compiler, Program, Rule, RuleHandle};

/// Compiles grammar text all the way to Rust source.
pub fn compile(source: &str, options: &CompileOptions) -> Result<String, GrammarError> {
    let document = GrammarDocument::from_str(source)?;
    let program = Program::compile(&document, options)?;
    Ok(emit::emit(&program, options))
}

#[test]
fn test_compile() {
    let code = compile(
        r#"{"l-yaml-stream": {"(***)": "l-document"}, "l-document": {"(+++)": ["a", "z"]}}"#,
        &CompileOptions::default(),
    )
    .unwrap();
    assert!(code.contains("fn l_yaml_stream(&mut self) -> bool;"));
    assert!(code.contains("cur.star(|cur| cur.l_document())"));
    assert!(code.contains("cur.plus(|cur| cur.range(0x61, 0x7a))"));

    let err = compile("{\"l-yaml-stream\": ", &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, GrammarError::Json(_)));
}
