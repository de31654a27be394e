use std::path::PathBuf;

use jgen::{CasePolicy, CompileOptions};

const GRAMMAR: &str = "grammar/yaml-lite.json";

fn main() {
    println!("cargo:rerun-if-changed={GRAMMAR}");

    let src = std::fs::read_to_string(GRAMMAR)
        .unwrap_or_else(|e| panic!("Failed to read `{GRAMMAR}`: {e}"));

    let options = CompileOptions {
        start: "l-yaml-stream".to_owned(),
        unmatched_case: Some(CasePolicy::Fail),
        source_name: Some("yaml-lite.json".to_owned()),
    };
    let code = jgen::compile(&src, &options).unwrap_or_else(|e| panic!("{GRAMMAR}: {e}"));

    let out_dir = std::env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo");
    let out = PathBuf::from(out_dir).join("yaml_lite.rs");
    std::fs::write(&out, code).unwrap_or_else(|e| panic!("Failed to write `{}`: {e}", out.display()));
}
