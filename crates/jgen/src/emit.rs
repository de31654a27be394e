//! Rust source generation.
//!
//! The generated file declares every reachable rule as a method of a `Rules`
//! trait and implements the trait for `jgen_runtime::Cursor`. Declarations are
//! written in a preorder walk from the start rule, implementations in a
//! postorder walk, each walk with its own visited set.

use std::{
    collections::HashSet,
    fmt::{self, Write},
};

use cranelift_entity::{EntityRef, EntitySet, SecondaryMap};

use crate::{
    expr::{CaseLabel, Expression},
    literal::display_byte_string,
    options::{CasePolicy, CompileOptions},
    resolve::{Program, RuleHandle},
};

/// Name of the cursor variable in generated method bodies.
pub const CURSOR: &str = "cur";

const INDENT: &str = "    ";

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Methods callable on a cursor that a rule method would clash with.
const CURSOR_METHODS: &[&str] = &[
    "new", "position", "remaining", "is_eof", "last_byte", "save_position", "restore_position",
    "take", "peek", "match_byte", "backtrack", "all", "star", "plus", "opt", "group", "not",
    "literal", "range", "start_of_line", "end_of_stream", "empty", "unsupported",
    // prelude traits
    "into", "try_into", "from", "try_from", "borrow", "borrow_mut", "type_id", "to_owned",
    "clone_into",
];

/// Turns a grammar name into a Rust identifier.
///
/// `-`, `.`, `/` and spaces become `_`, `+` becomes `p`, `?` becomes `q` and
/// `*` becomes `s`; any other character that can't appear in an identifier is
/// replaced by `_`.
pub fn sanitize(name: &str) -> String {
    let mut ident = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => ident.push(c),
            '+' => ident.push('p'),
            '?' => ident.push('q'),
            '*' => ident.push('s'),
            _ => ident.push('_'),
        }
    }

    let prefix = ident.is_empty()
        || ident == "_"
        || ident.starts_with(|c: char| c.is_ascii_digit())
        || KEYWORDS.contains(&ident.as_str())
        || CURSOR_METHODS.contains(&ident.as_str());

    if prefix {
        ident.insert_str(0, "r_");
    }
    ident
}

/// Generates the complete Rust source for `program`.
pub fn emit(program: &Program, options: &CompileOptions) -> String {
    let mut buf = String::new();
    emit_into(program, options, &mut buf).expect("Formatting into a String cannot fail");
    buf
}

pub fn emit_into(
    program: &Program,
    options: &CompileOptions,
    buf: &mut dyn Write,
) -> fmt::Result {
    let emitter = Emitter::new(program);

    emitter.header(buf, options)?;
    emitter.declarations(buf)?;
    writeln!(buf)?;
    emitter.implementations(buf)?;
    emitter.entry_point(buf)?;

    log::info!("Emitted {} rules", program.len());
    Ok(())
}

struct Emitter<'a> {
    program: &'a Program,
    idents: SecondaryMap<RuleHandle, String>,
    params: SecondaryMap<RuleHandle, Vec<String>>,
}

impl<'a> Emitter<'a> {
    fn new(program: &'a Program) -> Emitter<'a> {
        let mut idents: SecondaryMap<RuleHandle, String> =
            SecondaryMap::with_capacity(program.len());
        let mut params: SecondaryMap<RuleHandle, Vec<String>> =
            SecondaryMap::with_capacity(program.len());
        let mut taken = HashSet::new();

        for (handle, rule) in program.iter() {
            let mut ident = sanitize(&rule.name);
            while !taken.insert(ident.clone()) {
                ident = format!("{ident}_{}", handle.index());
            }
            idents[handle] = ident;

            let mut rule_params: Vec<String> = Vec::with_capacity(rule.params.len());
            for (i, name) in rule.params.iter().enumerate() {
                let mut ident = sanitize(name);
                if ident == CURSOR || ident == "unmatched_case" {
                    ident.push('_');
                }
                while rule_params.contains(&ident) {
                    ident = format!("{ident}_{i}");
                }
                rule_params.push(ident);
            }
            params[handle] = rule_params;
        }

        Emitter {
            program,
            idents,
            params,
        }
    }

    fn header(&self, buf: &mut dyn Write, options: &CompileOptions) -> fmt::Result {
        let start = self.program.start().name(self.program);
        match &options.source_name {
            Some(source) => writeln!(buf, "// Generated by jgen from `{source}`, start rule `{start}`.")?,
            None => writeln!(buf, "// Generated by jgen, start rule `{start}`.")?,
        }
        writeln!(buf, "// Do not edit, change the grammar and regenerate instead.")?;
        writeln!(buf)?;
        writeln!(buf, "use jgen_runtime::*;")?;
        writeln!(buf)
    }

    fn walk(
        &self,
        handle: RuleHandle,
        visited: &mut EntitySet<RuleHandle>,
        pre: &mut dyn FnMut(RuleHandle) -> fmt::Result,
        post: &mut dyn FnMut(RuleHandle) -> fmt::Result,
    ) -> fmt::Result {
        if visited.contains(handle) {
            return Ok(());
        }
        visited.insert(handle);

        pre(handle)?;

        let mut callees = Vec::new();
        self.program.rule(handle).body.visit(|expr| {
            if let Expression::RuleCall { rule, .. } = expr {
                callees.push(*rule);
            }
        });
        for callee in callees {
            self.walk(callee, visited, pre, post)?;
        }

        post(handle)
    }

    fn signature(&self, buf: &mut dyn Write, handle: RuleHandle) -> fmt::Result {
        write!(buf, "fn {}(&mut self", self.idents[handle])?;
        for param in &self.params[handle] {
            write!(buf, ", {param}: Arg")?;
        }
        write!(buf, ") -> bool")
    }

    fn declarations(&self, buf: &mut dyn Write) -> fmt::Result {
        writeln!(buf, "#[allow(non_snake_case)]")?;
        writeln!(buf, "pub trait Rules {{")?;

        let mut visited = EntitySet::with_capacity(self.program.len());
        self.walk(
            self.program.start(),
            &mut visited,
            &mut |handle| {
                write!(buf, "{INDENT}")?;
                self.signature(buf, handle)?;
                writeln!(buf, ";")
            },
            &mut |_| Ok(()),
        )?;

        writeln!(buf, "}}")
    }

    fn implementations(&self, buf: &mut dyn Write) -> fmt::Result {
        writeln!(
            buf,
            "#[allow(non_snake_case, unused_parens, unused_variables, clippy::all)]"
        )?;
        writeln!(buf, "impl Rules for Cursor<'_> {{")?;

        let mut first = true;
        let mut visited = EntitySet::with_capacity(self.program.len());
        self.walk(
            self.program.start(),
            &mut visited,
            &mut |_| Ok(()),
            &mut |handle| {
                log::trace!("Emitting `{}`", handle.name(self.program));
                if !first {
                    writeln!(buf)?;
                }
                first = false;

                write!(buf, "{INDENT}")?;
                self.signature(buf, handle)?;
                writeln!(buf, " {{")?;
                writeln!(buf, "{INDENT}{INDENT}let {CURSOR} = self;")?;
                write!(buf, "{INDENT}{INDENT}")?;
                self.expr(buf, handle, &self.program.rule(handle).body, 2)?;
                writeln!(buf)?;
                writeln!(buf, "{INDENT}}}")
            },
        )?;

        writeln!(buf, "}}")
    }

    fn entry_point(&self, buf: &mut dyn Write) -> fmt::Result {
        let start = self.program.start();
        if !self.program.rule(start).params.is_empty() {
            return Ok(());
        }

        writeln!(buf)?;
        writeln!(
            buf,
            "/// Runs `{}` on `input`, returning the number of bytes it matched.",
            start.name(self.program)
        )?;
        writeln!(buf, "pub fn parse(input: &[u8]) -> Option<usize> {{")?;
        writeln!(buf, "{INDENT}let mut {CURSOR} = Cursor::new(input);")?;
        writeln!(buf, "{INDENT}match {CURSOR}.{}() {{", self.idents[start])?;
        writeln!(buf, "{INDENT}{INDENT}true => Some({CURSOR}.position()),")?;
        writeln!(buf, "{INDENT}{INDENT}false => None,")?;
        writeln!(buf, "{INDENT}}}")?;
        writeln!(buf, "}}")
    }

    fn newline(buf: &mut dyn Write, indent: usize) -> fmt::Result {
        writeln!(buf)?;
        for _ in 0..indent {
            buf.write_str(INDENT)?;
        }
        Ok(())
    }

    fn param(&self, rule: RuleHandle, name: &str) -> &str {
        let position = self
            .program
            .rule(rule)
            .params
            .iter()
            .position(|param| param == name);
        match position {
            Some(i) => &self.params[rule][i],
            None => unreachable!("`{name}` is not a parameter of `{}`", rule.name(self.program)),
        }
    }

    /// Writes a conjunction of `items`, one per line.
    fn chain(
        &self,
        buf: &mut dyn Write,
        rule: RuleHandle,
        items: &mut dyn Iterator<Item = (bool, &Expression)>,
        indent: usize,
    ) -> fmt::Result {
        write!(buf, "{CURSOR}.all(|{CURSOR}| {{")?;
        for (i, (negated, item)) in items.enumerate() {
            Self::newline(buf, indent + 1)?;
            if i > 0 {
                write!(buf, "&& ")?;
            }
            if negated {
                write!(buf, "{CURSOR}.not(|{CURSOR}| ")?;
                self.expr(buf, rule, item, indent + 1)?;
                write!(buf, ")")?;
            } else {
                self.expr(buf, rule, item, indent + 1)?;
            }
        }
        Self::newline(buf, indent)?;
        write!(buf, "}})")
    }

    fn expr(
        &self,
        buf: &mut dyn Write,
        rule: RuleHandle,
        expr: &Expression,
        indent: usize,
    ) -> fmt::Result {
        match expr {
            Expression::Literal(bytes) => match **bytes {
                [byte] => write!(buf, "{CURSOR}.match_byte({byte:#04x})"),
                _ => write!(buf, "{CURSOR}.literal({})", display_byte_string(bytes)),
            },
            Expression::Range { min, max, wide } => {
                write!(buf, "{CURSOR}.range({min:#04x}, {max:#04x})")?;
                if *wide {
                    write!(buf, " /* wide range clamped */")?;
                }
                Ok(())
            }
            Expression::Sequence(items) => match items.as_slice() {
                [] => write!(buf, "{CURSOR}.empty()"),
                [single] => self.expr(buf, rule, single, indent),
                _ => self.chain(buf, rule, &mut items.iter().map(|item| (false, item)), indent),
            },
            Expression::Alternative(items) => match items.as_slice() {
                [] => write!(buf, "false"),
                [single] => self.expr(buf, rule, single, indent),
                [first, rest @ ..] => {
                    write!(buf, "(")?;
                    self.expr(buf, rule, first, indent + 1)?;
                    for item in rest {
                        Self::newline(buf, indent + 1)?;
                        write!(buf, "|| ")?;
                        self.expr(buf, rule, item, indent + 1)?;
                    }
                    write!(buf, ")")
                }
            },
            Expression::Subtract(items) => match items.as_slice() {
                [] => unreachable!("Empty subtraction is rejected while building"),
                [single] => self.expr(buf, rule, single, indent),
                [base, excluded @ ..] => {
                    let mut items = excluded
                        .iter()
                        .map(|item| (true, item))
                        .chain(std::iter::once((false, base)));
                    self.chain(buf, rule, &mut items, indent)
                }
            },
            Expression::Plus(inner) => self.repeat(buf, rule, "plus", inner, indent),
            Expression::Star(inner) => self.repeat(buf, rule, "star", inner, indent),
            Expression::Opt(inner) => self.repeat(buf, rule, "opt", inner, indent),
            Expression::Exclude(_) => write!(buf, "{CURSOR}.unsupported(\"(exclude)\")"),
            Expression::Unsupported(tag) => write!(buf, "{CURSOR}.unsupported({tag:?})"),
            Expression::StartOfLine => write!(buf, "{CURSOR}.start_of_line()"),
            Expression::EndOfStream => write!(buf, "{CURSOR}.end_of_stream()"),
            Expression::Empty => write!(buf, "{CURSOR}.empty()"),
            Expression::Switch {
                variable,
                cases,
                policy,
            } => {
                let var = self.param(rule, variable);
                write!(buf, "(match {var} {{")?;
                for (label, body) in cases {
                    Self::newline(buf, indent + 1)?;
                    match label {
                        CaseLabel::Int(int) => write!(buf, "Arg::Int({int}) => ")?,
                        CaseLabel::Name(name) => write!(buf, "Arg::Name({name:?}) => ")?,
                    }
                    self.expr(buf, rule, body, indent + 1)?;
                    write!(buf, ",")?;
                }
                Self::newline(buf, indent + 1)?;
                match policy {
                    CasePolicy::Fail => write!(buf, "_ => false,")?,
                    CasePolicy::Panic => write!(
                        buf,
                        "other => unmatched_case({:?}, {variable:?}, other),",
                        rule.name(self.program)
                    )?,
                }
                Self::newline(buf, indent)?;
                write!(buf, "}})")
            }
            Expression::RuleCall { rule: callee, args } => {
                write!(buf, "{CURSOR}.{}(", self.idents[*callee])?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(buf, ", ")?;
                    }
                    self.arg(buf, rule, arg)?;
                }
                write!(buf, ")")
            }
            Expression::Var(_)
            | Expression::Number(_)
            | Expression::Constant(_)
            | Expression::Sum(_) => {
                unreachable!("Argument expression {expr:?} in matcher position")
            }
        }
    }

    fn repeat(
        &self,
        buf: &mut dyn Write,
        rule: RuleHandle,
        combinator: &str,
        inner: &Expression,
        indent: usize,
    ) -> fmt::Result {
        write!(buf, "{CURSOR}.{combinator}(|{CURSOR}| ")?;
        self.expr(buf, rule, inner, indent)?;
        write!(buf, ")")
    }

    fn arg(&self, buf: &mut dyn Write, rule: RuleHandle, arg: &Expression) -> fmt::Result {
        match arg {
            Expression::Var(name) => write!(buf, "{}", self.param(rule, name)),
            Expression::Number(value) => write!(buf, "Arg::Int({value})"),
            Expression::Constant(name) => write!(buf, "Arg::Name({name:?})"),
            Expression::Sum(terms) => {
                write!(buf, "Arg::Int(")?;
                for (i, term) in terms.iter().enumerate() {
                    match (i, term.negated) {
                        (0, false) => {}
                        (0, true) => write!(buf, "-")?,
                        (_, false) => write!(buf, " + ")?,
                        (_, true) => write!(buf, " - ")?,
                    }
                    match &term.value {
                        Expression::Var(name) => write!(buf, "{}.int()", self.param(rule, name))?,
                        Expression::Number(value) => write!(buf, "{value}")?,
                        other => unreachable!("Sum term {other:?} should have been folded"),
                    }
                }
                write!(buf, ")")
            }
            other => unreachable!("Matcher {other:?} in argument position"),
        }
    }
}
