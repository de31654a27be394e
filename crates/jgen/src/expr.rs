use std::fmt::Write;

use crate::{
    options::CasePolicy,
    resolve::{Program, RuleHandle},
};

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Expression {
    /// Atomic match of one or more exact bytes.
    Literal(Box<[u8]>),
    /// One byte in `min..=max`. A `wide` range had a bound clamped to 0xFF.
    Range {
        min: u8,
        max: u8,
        wide: bool,
    },
    Sequence(Vec<Expression>),
    Alternative(Vec<Expression>),
    /// The first item, as long as none of the rest match at the same position.
    Subtract(Vec<Expression>),
    Plus(Box<Expression>),
    Star(Box<Expression>),
    Opt(Box<Expression>),
    Exclude(Box<Expression>),
    StartOfLine,
    EndOfStream,
    Empty,
    // argument expressions
    Var(String),
    Number(i64),
    Constant(String),
    Sum(Vec<Term>),
    Switch {
        variable: String,
        cases: Vec<(CaseLabel, Expression)>,
        policy: CasePolicy,
    },
    RuleCall {
        rule: RuleHandle,
        args: Vec<Expression>,
    },
    Unsupported(&'static str),
}

/// A signed operand of [`Expression::Sum`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Term {
    pub negated: bool,
    pub value: Expression,
}

impl Term {
    pub fn positive(value: Expression) -> Term {
        Term {
            negated: false,
            value,
        }
    }
    pub fn negative(value: Expression) -> Term {
        Term {
            negated: true,
            value,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum CaseLabel {
    Int(i64),
    Name(String),
}

impl CaseLabel {
    pub fn parse(label: &str) -> CaseLabel {
        match label.parse() {
            Ok(int) => CaseLabel::Int(int),
            Err(_) => CaseLabel::Name(label.to_owned()),
        }
    }
}

impl Expression {
    fn visit_impl<'a>(&'a self, f: &mut dyn FnMut(&'a Expression)) {
        f(self);
        self.visit_children(&mut |child| child.visit_impl(f));
    }
    /// Preorder walk over this expression and everything nested in it.
    ///
    /// Does not follow [`Expression::RuleCall`] into the callee.
    pub fn visit<'a>(&'a self, mut f: impl FnMut(&'a Expression)) {
        self.visit_impl(&mut f)
    }
    pub fn visit_children<'a>(&'a self, f: &mut dyn FnMut(&'a Expression)) {
        match self {
            Expression::Sequence(items)
            | Expression::Alternative(items)
            | Expression::Subtract(items) => items.iter().for_each(f),
            Expression::Plus(inner)
            | Expression::Star(inner)
            | Expression::Opt(inner)
            | Expression::Exclude(inner) => f(inner.as_ref()),
            Expression::Sum(terms) => terms.iter().for_each(|term| f(&term.value)),
            Expression::Switch { cases, .. } => cases.iter().for_each(|(_, body)| f(body)),
            Expression::RuleCall { args, .. } => args.iter().for_each(f),
            Expression::Literal(_)
            | Expression::Range { .. }
            | Expression::StartOfLine
            | Expression::EndOfStream
            | Expression::Empty
            | Expression::Var(_)
            | Expression::Number(_)
            | Expression::Constant(_)
            | Expression::Unsupported(_) => {}
        }
    }
    pub fn display_into_indent(
        &self,
        buf: &mut dyn Write,
        cx: &Program,
        indent: u32,
    ) -> std::fmt::Result {
        for _ in 0..indent {
            write!(buf, "  ")?;
        }
        match self {
            Expression::Literal(bytes) => {
                write!(buf, "Literal({})", crate::literal::display_byte_string(bytes))?
            }
            Expression::Range { min, max, wide } => {
                write!(buf, "Range({min:#04x}, {max:#04x})")?;
                if *wide {
                    write!(buf, " wide")?;
                }
            }
            Expression::Sequence(_) => write!(buf, "Sequence")?,
            Expression::Alternative(_) => write!(buf, "Alternative")?,
            Expression::Subtract(_) => write!(buf, "Subtract")?,
            Expression::Plus(_) => write!(buf, "Plus")?,
            Expression::Star(_) => write!(buf, "Star")?,
            Expression::Opt(_) => write!(buf, "Opt")?,
            Expression::Exclude(_) => write!(buf, "Exclude")?,
            Expression::StartOfLine => write!(buf, "StartOfLine")?,
            Expression::EndOfStream => write!(buf, "EndOfStream")?,
            Expression::Empty => write!(buf, "Empty")?,
            Expression::Var(name) => write!(buf, "Var({name})")?,
            Expression::Number(value) => write!(buf, "Number({value})")?,
            Expression::Constant(name) => write!(buf, "Constant({name})")?,
            Expression::Sum(terms) => {
                write!(buf, "Sum(")?;
                for (i, term) in terms.iter().enumerate() {
                    match (i, term.negated) {
                        (0, false) => {}
                        (0, true) => write!(buf, "-")?,
                        (_, false) => write!(buf, " + ")?,
                        (_, true) => write!(buf, " - ")?,
                    }
                    match &term.value {
                        Expression::Var(name) => write!(buf, "{name}")?,
                        Expression::Number(value) => write!(buf, "{value}")?,
                        other => write!(buf, "{other:?}")?,
                    }
                }
                write!(buf, ")")?;
            }
            Expression::Switch {
                variable, policy, ..
            } => write!(buf, "Switch({variable}, {policy})")?,
            Expression::RuleCall { rule, .. } => write!(buf, "RuleCall({})", rule.name(cx))?,
            Expression::Unsupported(tag) => write!(buf, "Unsupported({tag})")?,
        }
        writeln!(buf)?;

        match self {
            Expression::Switch { cases, .. } => {
                for (label, body) in cases {
                    for _ in 0..(indent + 1) {
                        write!(buf, "  ")?;
                    }
                    match label {
                        CaseLabel::Int(int) => writeln!(buf, "{int} =>")?,
                        CaseLabel::Name(name) => writeln!(buf, "{name} =>")?,
                    }
                    body.display_into_indent(buf, cx, indent + 2)?;
                }
            }
            // terms are already shown inline
            Expression::Sum(_) => {}
            _ => {
                let mut result = Ok(());
                self.visit_children(&mut |child| {
                    if result.is_ok() {
                        result = child.display_into_indent(buf, cx, indent + 1);
                    }
                });
                result?;
            }
        }

        Ok(())
    }
    pub fn display_into(&self, buf: &mut dyn Write, cx: &Program) -> std::fmt::Result {
        self.display_into_indent(buf, cx, 0)
    }
}

#[test]
fn test_case_label_parse() {
    assert_eq!(CaseLabel::parse("1"), CaseLabel::Int(1));
    assert_eq!(CaseLabel::parse("-2"), CaseLabel::Int(-2));
    assert_eq!(
        CaseLabel::parse("block-in"),
        CaseLabel::Name("block-in".to_owned())
    );
}

#[test]
fn test_visit_preorder() {
    let expr = Expression::Sequence(vec![
        Expression::Star(Box::new(Expression::Literal(Box::from(&b" "[..])))),
        Expression::Alternative(vec![Expression::StartOfLine, Expression::EndOfStream]),
    ]);

    let mut seen = Vec::new();
    expr.visit(|e| {
        seen.push(match e {
            Expression::Sequence(_) => "seq",
            Expression::Star(_) => "star",
            Expression::Literal(_) => "lit",
            Expression::Alternative(_) => "alt",
            Expression::StartOfLine => "sol",
            Expression::EndOfStream => "eos",
            _ => "other",
        })
    });
    assert_eq!(seen, ["seq", "star", "lit", "alt", "sol", "eos"]);
}
