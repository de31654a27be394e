//! Parser for a small indentation based YAML-like language.
//!
//! The code in [`yaml_lite`] is generated at build time from
//! `grammar/yaml-lite.json`. Plain scalars, block mappings and block sequences
//! indented by at most eight spaces are recognized, as well as comments and
//! blank lines.

pub mod yaml_lite {
    include!(concat!(env!("OUT_DIR"), "/yaml_lite.rs"));
}

/// Whether the whole of `input` is a valid document.
pub fn accepts(input: &str) -> bool {
    yaml_lite::parse(input.as_bytes()) == Some(input.len())
}
