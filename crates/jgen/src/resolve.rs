use std::collections::HashMap;

use cranelift_entity::{entity_impl, EntityRef, PrimaryMap, SecondaryMap};

use crate::{
    document::GrammarDocument,
    error::GrammarError,
    expr::{Expression, Term},
    options::CompileOptions,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleHandle(u32);

entity_impl! { RuleHandle }

impl RuleHandle {
    pub fn name(self, cx: &Program) -> &str {
        &cx.rules[self].name
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Rule {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expression,
}

/// Formal parameters in scope while building a rule body.
pub(crate) struct Scope<'a> {
    pub rule: &'a str,
    pub params: &'a [String],
}

impl Scope<'_> {
    pub fn is_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }
}

/// Owns the rule registry for a single compilation.
///
/// A rule is claimed the first time it is referenced, its body is expanded
/// exactly once, and every reference, including recursive ones reached while
/// the body is still being built, becomes a [`Expression::RuleCall`].
pub struct Compiler<'a> {
    pub(crate) document: &'a GrammarDocument,
    pub(crate) options: &'a CompileOptions,
    claimed: HashMap<String, RuleHandle>,
    names: PrimaryMap<RuleHandle, String>,
    rules: SecondaryMap<RuleHandle, Option<Rule>>,
    start: Option<RuleHandle>,
}

impl<'a> Compiler<'a> {
    pub fn new(document: &'a GrammarDocument, options: &'a CompileOptions) -> Compiler<'a> {
        Compiler {
            document,
            options,
            claimed: HashMap::new(),
            names: PrimaryMap::new(),
            rules: SecondaryMap::new(),
            start: None,
        }
    }

    pub fn resolve_start(&mut self) -> Result<RuleHandle, GrammarError> {
        let start = self.options.start.as_str();
        if !self.document.contains(start) {
            return Err(GrammarError::UndeclaredRule {
                rule: None,
                name: start.to_owned(),
            });
        }
        // the caller of the generated code supplies the start rule's arguments
        let handle = self.expand(start)?;
        self.start = Some(handle);
        Ok(handle)
    }

    /// Returns a call to `name`, expanding the rule if this is its first reference.
    pub(crate) fn resolve(
        &mut self,
        name: &str,
        args: Vec<Expression>,
    ) -> Result<Expression, GrammarError> {
        let rule = self.expand(name)?;
        Ok(Expression::RuleCall { rule, args })
    }

    fn expand(&mut self, name: &str) -> Result<RuleHandle, GrammarError> {
        if let Some(&handle) = self.claimed.get(name) {
            return Ok(handle);
        }

        let document = self.document;
        let Some(body) = document.get(name) else {
            return Err(GrammarError::UndeclaredRule {
                rule: None,
                name: name.to_owned(),
            });
        };

        let handle = self.names.push(name.to_owned());
        self.claimed.insert(name.to_owned(), handle);
        log::debug!("Claimed rule `{name}` as {}", handle.index());

        let params = document.parameters(name)?;
        let scope = Scope {
            rule: name,
            params: &params,
        };
        let body = self.build_body(body, &scope)?;

        log::debug!("Registered rule `{name}`");
        self.rules[handle] = Some(Rule {
            name: name.to_owned(),
            params,
            body,
        });

        Ok(handle)
    }

    pub fn finish(self) -> Program {
        let start = self
            .start
            .expect("Compiler::resolve_start must succeed before Compiler::finish");

        let mut rules = PrimaryMap::with_capacity(self.names.len());
        let mut bodies = self.rules;
        for (handle, name) in self.names.iter() {
            let Some(rule) = bodies[handle].take() else {
                unreachable!("Rule `{name}` was claimed but never registered");
            };
            let pushed = rules.push(rule);
            debug_assert_eq!(pushed, handle);
        }

        log::info!(
            "Resolved {} rules reachable from `{}`",
            rules.len(),
            rules[start].name
        );

        Program { start, rules }
    }
}

/// Every rule reachable from the start rule, in the order they were first referenced.
#[derive(Clone, Debug)]
pub struct Program {
    start: RuleHandle,
    rules: PrimaryMap<RuleHandle, Rule>,
}

impl Program {
    pub fn compile(
        document: &GrammarDocument,
        options: &CompileOptions,
    ) -> Result<Program, GrammarError> {
        let mut compiler = Compiler::new(document, options);
        compiler.resolve_start()?;
        Ok(compiler.finish())
    }
    pub fn start(&self) -> RuleHandle {
        self.start
    }
    pub fn rule(&self, handle: RuleHandle) -> &Rule {
        &self.rules[handle]
    }
    pub fn get(&self, name: &str) -> Option<RuleHandle> {
        self.rules
            .iter()
            .find(|(_, rule)| rule.name == name)
            .map(|(handle, _)| handle)
    }
    pub fn iter(&self) -> impl Iterator<Item = (RuleHandle, &Rule)> + '_ {
        self.rules.iter()
    }
    pub fn len(&self) -> usize {
        self.rules.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
    pub fn display_rules(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        for (_, rule) in self.rules.iter() {
            write!(buf, "{}", rule.name)?;
            if !rule.params.is_empty() {
                write!(buf, "({})", rule.params.join(", "))?;
            }
            writeln!(buf, ":")?;
            rule.body.display_into_indent(buf, self, 1)?;
        }
        Ok(())
    }
}

/// Flattens nested sums and folds their constant terms.
///
/// Constants are combined into one trailing term, a sum of constants becomes a
/// [`Expression::Number`] and a lone positive variable becomes itself.
pub(crate) fn fold_sum(terms: Vec<Term>) -> Expression {
    fn flatten(term: Term, negated: bool, constant: &mut i64, rest: &mut Vec<Term>) {
        let negated = negated ^ term.negated;
        match term.value {
            Expression::Number(value) => {
                *constant = match negated {
                    true => constant.wrapping_sub(value),
                    false => constant.wrapping_add(value),
                };
            }
            Expression::Sum(inner) => {
                for term in inner {
                    flatten(term, negated, constant, rest);
                }
            }
            value => rest.push(Term { negated, value }),
        }
    }

    let mut constant = 0;
    let mut rest = Vec::new();
    for term in terms {
        flatten(term, false, &mut constant, &mut rest);
    }

    if rest.is_empty() {
        return Expression::Number(constant);
    }
    if constant == 0 && rest.len() == 1 && !rest[0].negated {
        return rest.remove(0).value;
    }
    if constant != 0 {
        rest.push(Term {
            negated: constant < 0,
            value: Expression::Number(constant.wrapping_abs()),
        });
    }
    Expression::Sum(rest)
}

#[cfg(test)]
mod tests {
    use super::{fold_sum, Program};
    use crate::{
        document::GrammarDocument,
        error::GrammarError,
        expr::{Expression, Term},
        options::CompileOptions,
    };

    fn var(name: &str) -> Expression {
        Expression::Var(name.to_owned())
    }

    fn compile(src: &str, start: &str) -> Result<Program, GrammarError> {
        let doc = GrammarDocument::from_str(src).unwrap();
        Program::compile(&doc, &CompileOptions::with_start(start))
    }

    #[test]
    fn test_fold_constants() {
        let folded = fold_sum(vec![
            Term::positive(Expression::Number(2)),
            Term::negative(Expression::Number(5)),
        ]);
        assert_eq!(folded, Expression::Number(-3));
    }

    #[test]
    fn test_fold_single_variable() {
        let folded = fold_sum(vec![
            Term::positive(var("n")),
            Term::positive(Expression::Number(1)),
            Term::negative(Expression::Number(1)),
        ]);
        assert_eq!(folded, var("n"));

        let negated = fold_sum(vec![
            Term::positive(Expression::Number(0)),
            Term::negative(var("n")),
        ]);
        assert_eq!(negated, Expression::Sum(vec![Term::negative(var("n"))]));
    }

    #[test]
    fn test_fold_flattens_nested() {
        // n - (m - 1) + 2 = n - m + 3
        let inner = Expression::Sum(vec![
            Term::positive(var("m")),
            Term::negative(Expression::Number(1)),
        ]);
        let folded = fold_sum(vec![
            Term::positive(var("n")),
            Term::negative(inner),
            Term::positive(Expression::Number(2)),
        ]);
        assert_eq!(
            folded,
            Expression::Sum(vec![
                Term::positive(var("n")),
                Term::negative(var("m")),
                Term::positive(Expression::Number(3)),
            ])
        );
    }

    #[test]
    fn test_handles_in_first_reference_order() {
        let program = compile(
            r#"{
                "unused": "u",
                "top": {"(all)": ["left", "right", "left"]},
                "right": "r",
                "left": "l"
            }"#,
            "top",
        )
        .unwrap();

        let names = program
            .iter()
            .map(|(_, rule)| rule.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["top", "left", "right"]);
        assert_eq!(program.get("unused"), None);
        assert_eq!(program.start(), program.get("top").unwrap());
    }

    #[test]
    fn test_memoize_once() {
        let program = compile(
            r#"{
                "top": {"(any)": ["item", {"(all)": ["item", "item"]}]},
                "item": "i"
            }"#,
            "top",
        )
        .unwrap();
        assert_eq!(program.len(), 2);

        let item = program.get("item").unwrap();
        let top = program.rule(program.start());
        let mut calls = 0;
        top.body.visit(|e| {
            if let Expression::RuleCall { rule, .. } = e {
                assert_eq!(*rule, item);
                calls += 1;
            }
        });
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let program = compile(
            r#"{
                "ping": {"(???)": {"(all)": ["(", "pong"]}},
                "pong": {"(all)": ["ping", ")"]}
            }"#,
            "ping",
        )
        .unwrap();
        assert_eq!(program.len(), 2);

        let a = program.get("ping").unwrap();
        let b = program.get("pong").unwrap();
        let calls = |handle| {
            let mut callees = Vec::new();
            program.rule(handle).body.visit(|e| {
                if let Expression::RuleCall { rule, .. } = e {
                    callees.push(*rule);
                }
            });
            callees
        };
        assert_eq!(calls(a), [b]);
        assert_eq!(calls(b), [a]);
    }

    #[test]
    fn test_self_recursion() {
        let program = compile(r#"{"nest": {"(any)": [{"(all)": ["[", "nest", "]"]}, "<empty>"]}}"#, "nest")
            .unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_undeclared_start() {
        let err = compile(r#"{"a": "a"}"#, "l-yaml-stream").unwrap_err();
        assert!(matches!(
            err,
            GrammarError::UndeclaredRule { rule: None, ref name } if name == "l-yaml-stream"
        ));
    }

    #[test]
    fn test_start_with_parameters_needs_no_arguments() {
        let program = compile(
            r#"{"s-indent": {"(...)": "n", "(***)": " "}}"#,
            "s-indent",
        )
        .unwrap();
        assert_eq!(program.rule(program.start()).params, ["n"]);
    }

    #[test]
    fn test_display_rules() {
        let program = compile(
            r#"{
                "top": {"(all)": [{"(+++)": ["a", "z"]}, "tail"]},
                "tail": {"(any)": ["x0A", "<end-of-stream>"]}
            }"#,
            "top",
        )
        .unwrap();

        let mut buf = String::new();
        program.display_rules(&mut buf).unwrap();
        let expected = "\
top:
  Sequence
    Plus
      Range(0x61, 0x7a)
    RuleCall(tail)
tail:
  Alternative
    Literal(b\"\\n\")
    EndOfStream
";
        assert_eq!(buf, expected);
    }
}
