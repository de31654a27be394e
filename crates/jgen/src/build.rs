//! Translation of JSON grammar values into [`Expression`]s.

use serde_json::{Map, Value};

use crate::{
    document::PARAMETERS_KEY,
    error::{snippet, GrammarError},
    expr::{CaseLabel, Expression, Term},
    literal::{self, Bound},
    resolve::{fold_sum, Compiler, Scope},
};

const GUARD_KEY: &str = "(if)";
const CASE_VARIABLE_KEY: &str = "var";

/// Operators that are recognized but deliberately not compiled.
pub const UNSUPPORTED_OPERATORS: &[&str] = &[
    "(!==)", "(<=)", "(<)", "({2})", "({4})", "({8})", "({n})", "(set)", "(max)", "(<<<)",
];

/// Placeholder for a range bound wider than a byte.
const WIDE_BOUND: u8 = 0xFF;

impl Compiler<'_> {
    /// Builds the top level expression of a rule, the only place `(...)` may appear.
    pub(crate) fn build_body(
        &mut self,
        value: &Value,
        scope: &Scope,
    ) -> Result<Expression, GrammarError> {
        match value {
            Value::Object(map) => self.build_dict(map, value, scope, true),
            _ => self.build(value, scope),
        }
    }

    pub(crate) fn build(&mut self, value: &Value, scope: &Scope) -> Result<Expression, GrammarError> {
        match value {
            Value::String(string) => self.build_string(string, value, scope),
            Value::Array(items) => self.build_range(items, value, scope),
            Value::Object(map) => self.build_dict(map, value, scope, false),
            Value::Number(_) | Value::Bool(_) | Value::Null => Err(GrammarError::UnexpectedShape {
                rule: scope.rule.to_owned(),
                value: snippet(value),
                expected: "a matcher",
            }),
        }
    }

    fn build_string(
        &mut self,
        string: &str,
        value: &Value,
        scope: &Scope,
    ) -> Result<Expression, GrammarError> {
        match string {
            "<start-of-line>" => return Ok(Expression::StartOfLine),
            "<end-of-stream>" => return Ok(Expression::EndOfStream),
            "<empty>" => return Ok(Expression::Empty),
            _ => {}
        }

        let mut chars = string.chars();
        let single = chars.next().is_some() && chars.next().is_none();

        if !single && self.document.contains(string) {
            return self.call(string, Vec::new(), scope);
        }

        if single || string.is_empty() || string.starts_with('x') {
            return match literal::decode_literal(string) {
                Ok(bytes) => Ok(Expression::Literal(bytes.into_boxed_slice())),
                Err(reason) => Err(GrammarError::MalformedMatcher {
                    rule: scope.rule.to_owned(),
                    value: snippet(value),
                    reason,
                }),
            };
        }

        Err(GrammarError::UndeclaredRule {
            rule: Some(scope.rule.to_owned()),
            name: string.to_owned(),
        })
    }

    fn build_range(
        &mut self,
        items: &[Value],
        value: &Value,
        scope: &Scope,
    ) -> Result<Expression, GrammarError> {
        let malformed = |reason| GrammarError::MalformedRange {
            rule: scope.rule.to_owned(),
            value: snippet(value),
            reason,
        };

        let [min, max] = items else {
            return Err(malformed("expected exactly two bounds"));
        };
        let (Value::String(min), Value::String(max)) = (min, max) else {
            return Err(malformed("range bounds must be strings"));
        };

        let min = literal::decode_bound(min).map_err(malformed)?;
        let max = literal::decode_bound(max).map_err(malformed)?;

        let mut wide = false;
        let mut narrow = |bound: Bound| match bound {
            Bound::Narrow(byte) => byte,
            Bound::Wide(_) => {
                wide = true;
                WIDE_BOUND
            }
        };
        let (min, max) = (narrow(min), narrow(max));

        if wide {
            log::warn!(
                "Rule `{}`: range {} has a bound wider than a byte, clamped to {WIDE_BOUND:#04x}",
                scope.rule,
                snippet(value)
            );
        } else if min > max {
            return Err(GrammarError::InvalidRange {
                rule: scope.rule.to_owned(),
                value: snippet(value),
            });
        }

        Ok(Expression::Range { min, max, wide })
    }

    fn build_dict(
        &mut self,
        map: &Map<String, Value>,
        value: &Value,
        scope: &Scope,
        rule_body: bool,
    ) -> Result<Expression, GrammarError> {
        let malformed = |reason| GrammarError::MalformedDict {
            rule: scope.rule.to_owned(),
            value: snippet(value),
            reason,
        };

        let mut guard = None;
        let mut operator = None;
        for (key, operand) in map {
            match key.as_str() {
                PARAMETERS_KEY | GUARD_KEY if operator.is_some() => {
                    return Err(malformed("modifier keys must precede the operator"));
                }
                PARAMETERS_KEY if !rule_body => {
                    return Err(malformed("parameters can only be declared by a rule body"));
                }
                // already read through GrammarDocument::parameters
                PARAMETERS_KEY => {}
                GUARD_KEY if guard.is_some() => return Err(malformed("duplicate (if)")),
                GUARD_KEY => guard = Some(operand),
                _ if operator.is_some() => return Err(malformed("more than one operator key")),
                _ => operator = Some((key.as_str(), operand)),
            }
        }

        let Some((key, operand)) = operator else {
            return Err(malformed("no operator key"));
        };

        let expr = self.build_operator(key, operand, scope)?;
        match guard {
            Some(condition) => {
                let condition = self.build(condition, scope)?;
                Ok(Expression::Sequence(vec![condition, expr]))
            }
            None => Ok(expr),
        }
    }

    fn build_operator(
        &mut self,
        key: &str,
        operand: &Value,
        scope: &Scope,
    ) -> Result<Expression, GrammarError> {
        if let Some(&tag) = UNSUPPORTED_OPERATORS.iter().find(|&&tag| tag == key) {
            log::warn!("Rule `{}`: {tag} is not supported", scope.rule);
            return Ok(Expression::Unsupported(tag));
        }

        let boxed = |this: &mut Self| this.build(operand, scope).map(Box::new);

        let expr = match key {
            "(all)" => Expression::Sequence(self.build_list(operand, scope)?),
            "(any)" => Expression::Alternative(self.build_list(operand, scope)?),
            "(---)" => {
                let items = self.build_list(operand, scope)?;
                if items.is_empty() {
                    return Err(GrammarError::EmptySubtract {
                        rule: scope.rule.to_owned(),
                    });
                }
                Expression::Subtract(items)
            }
            "(+++)" => Expression::Plus(boxed(self)?),
            "(***)" => Expression::Star(boxed(self)?),
            "(???)" => Expression::Opt(boxed(self)?),
            "(exclude)" => {
                log::warn!("Rule `{}`: (exclude) is not supported", scope.rule);
                Expression::Exclude(boxed(self)?)
            }
            "(case)" => self.build_switch(operand, scope)?,
            "(+)" | "(-)" => {
                return Err(GrammarError::UnexpectedShape {
                    rule: scope.rule.to_owned(),
                    value: snippet(operand),
                    expected: "a matcher, numeric expressions are only valid as arguments",
                })
            }
            _ if key.starts_with('(') && key.ends_with(')') => {
                return Err(GrammarError::UnknownOperator {
                    rule: scope.rule.to_owned(),
                    operator: key.to_owned(),
                })
            }
            callee => {
                let args = self.build_args(operand, scope)?;
                self.call(callee, args, scope)?
            }
        };

        Ok(expr)
    }

    fn build_list(&mut self, operand: &Value, scope: &Scope) -> Result<Vec<Expression>, GrammarError> {
        let Value::Array(items) = operand else {
            return Err(GrammarError::UnexpectedShape {
                rule: scope.rule.to_owned(),
                value: snippet(operand),
                expected: "a list of operands",
            });
        };
        items.iter().map(|item| self.build(item, scope)).collect()
    }

    fn build_args(&mut self, operand: &Value, scope: &Scope) -> Result<Vec<Expression>, GrammarError> {
        match operand {
            Value::Array(items) => items.iter().map(|item| self.build_arg(item, scope)).collect(),
            single => Ok(vec![self.build_arg(single, scope)?]),
        }
    }

    fn build_arg(&mut self, value: &Value, scope: &Scope) -> Result<Expression, GrammarError> {
        let unexpected = |expected| GrammarError::UnexpectedShape {
            rule: scope.rule.to_owned(),
            value: snippet(value),
            expected,
        };

        match value {
            Value::Number(number) => match number.as_i64() {
                Some(int) => Ok(Expression::Number(int)),
                None => Err(unexpected("an integer argument")),
            },
            Value::String(name) if scope.is_param(name) => Ok(Expression::Var(name.clone())),
            Value::String(name) => Ok(Expression::Constant(name.clone())),
            Value::Object(map) => {
                let mut entries = map.iter();
                let (Some((key, operands)), None) = (entries.next(), entries.next()) else {
                    return Err(unexpected("a single (+) or (-) key"));
                };
                let negate_rest = match key.as_str() {
                    "(+)" => false,
                    "(-)" => true,
                    _ => return Err(unexpected("a (+) or (-) numeric expression")),
                };
                let Value::Array(operands) = operands else {
                    return Err(unexpected("a list of numeric terms"));
                };
                if operands.is_empty() {
                    return Err(unexpected("at least one numeric term"));
                }

                let mut terms = Vec::with_capacity(operands.len());
                for (i, operand) in operands.iter().enumerate() {
                    let value = match self.build_arg(operand, scope)? {
                        Expression::Constant(variable) => {
                            return Err(GrammarError::UnknownVariable {
                                rule: scope.rule.to_owned(),
                                variable,
                            })
                        }
                        value => value,
                    };
                    terms.push(Term {
                        negated: negate_rest && i > 0,
                        value,
                    });
                }

                Ok(fold_sum(terms))
            }
            Value::Array(_) | Value::Bool(_) | Value::Null => Err(unexpected("an argument")),
        }
    }

    fn build_switch(&mut self, operand: &Value, scope: &Scope) -> Result<Expression, GrammarError> {
        let malformed = |reason| GrammarError::MalformedCase {
            rule: scope.rule.to_owned(),
            value: snippet(operand),
            reason,
        };

        let Value::Object(map) = operand else {
            return Err(malformed("expected a dict of cases"));
        };
        let Some(variable) = map.get(CASE_VARIABLE_KEY) else {
            return Err(malformed("missing `var`"));
        };
        let Value::String(variable) = variable else {
            return Err(malformed("`var` must name a parameter"));
        };
        if !scope.is_param(variable) {
            return Err(GrammarError::UnknownVariable {
                rule: scope.rule.to_owned(),
                variable: variable.clone(),
            });
        }
        let Some(policy) = self.options.unmatched_case else {
            return Err(GrammarError::MissingCasePolicy {
                rule: scope.rule.to_owned(),
            });
        };

        let mut cases: Vec<(CaseLabel, Expression)> = Vec::with_capacity(map.len() - 1);
        for (label, body) in map {
            if label == CASE_VARIABLE_KEY {
                continue;
            }
            let label = CaseLabel::parse(label);
            if cases.iter().any(|(existing, _)| *existing == label) {
                return Err(malformed("duplicate label"));
            }
            let body = self.build(body, scope)?;
            cases.push((label, body));
        }

        Ok(Expression::Switch {
            variable: variable.clone(),
            cases,
            policy,
        })
    }

    /// Checks the call site against the callee's declaration before resolving it.
    fn call(
        &mut self,
        callee: &str,
        args: Vec<Expression>,
        scope: &Scope,
    ) -> Result<Expression, GrammarError> {
        let document = self.document;
        if !document.contains(callee) {
            return Err(GrammarError::UndeclaredRule {
                rule: Some(scope.rule.to_owned()),
                name: callee.to_owned(),
            });
        }

        let expected = document.parameters(callee)?.len();
        if expected != args.len() {
            return Err(GrammarError::ArityMismatch {
                rule: scope.rule.to_owned(),
                callee: callee.to_owned(),
                expected,
                provided: args.len(),
            });
        }

        self.resolve(callee, args)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        document::GrammarDocument,
        error::GrammarError,
        expr::{CaseLabel, Expression, Term},
        options::{CasePolicy, CompileOptions},
        resolve::Program,
    };

    fn compile_with(src: &str, options: &CompileOptions) -> Result<Program, GrammarError> {
        let doc = GrammarDocument::from_str(src).unwrap();
        Program::compile(&doc, options)
    }

    fn compile(src: &str) -> Result<Program, GrammarError> {
        compile_with(src, &CompileOptions::with_start("top"))
    }

    fn body(src: &str) -> Expression {
        let program = compile(src).unwrap();
        program.rule(program.start()).body.clone()
    }

    fn literal(bytes: &[u8]) -> Expression {
        Expression::Literal(Box::from(bytes))
    }

    #[test]
    fn test_matchers() {
        assert_eq!(body(r#"{"top": "a"}"#), literal(b"a"));
        assert_eq!(body(r#"{"top": "x0A"}"#), literal(b"\n"));
        assert_eq!(body(r#"{"top": "x4100x4200"}"#), literal(b"AB"));
        assert_eq!(body(r#"{"top": "<start-of-line>"}"#), Expression::StartOfLine);
        assert_eq!(body(r#"{"top": "<end-of-stream>"}"#), Expression::EndOfStream);
        assert_eq!(body(r#"{"top": "<empty>"}"#), Expression::Empty);
        assert_eq!(
            body(r#"{"top": ["x30", "x39"]}"#),
            Expression::Range {
                min: b'0',
                max: b'9',
                wide: false
            }
        );
    }

    #[test]
    fn test_hex_like_rule_name_is_a_call() {
        let program = compile(r#"{"top": "x0A", "x0A": "b"}"#).unwrap();
        assert!(matches!(
            program.rule(program.start()).body,
            Expression::RuleCall { .. }
        ));
    }

    #[test]
    fn test_wide_range_is_clamped() {
        assert_eq!(
            body(r#"{"top": ["xA0", "xD7FF"]}"#),
            Expression::Range {
                min: 0xA0,
                max: 0xFF,
                wide: true
            }
        );
    }

    #[test]
    fn test_operators() {
        let expr = body(
            r#"{"top": {"(all)": [
                {"(any)": []},
                {"(---)": [["a", "z"], "x"]},
                {"(+++)": " "},
                {"(***)": " "},
                {"(???)": " "}
            ]}}"#,
        );
        let space = || Box::new(literal(b" "));
        assert_eq!(
            expr,
            Expression::Sequence(vec![
                Expression::Alternative(vec![]),
                Expression::Subtract(vec![
                    Expression::Range {
                        min: b'a',
                        max: b'z',
                        wide: false
                    },
                    literal(b"x"),
                ]),
                Expression::Plus(space()),
                Expression::Star(space()),
                Expression::Opt(space()),
            ])
        );
    }

    #[test]
    fn test_unsupported_operators() {
        assert_eq!(
            body(r#"{"top": {"(<=)": ["n", 4]}}"#),
            Expression::Unsupported("(<=)")
        );
        // operands of unsupported operators are never looked at
        assert_eq!(
            body(r#"{"top": {"(set)": ["missing-rule", "m"]}}"#),
            Expression::Unsupported("(set)")
        );
    }

    #[test]
    fn test_exclude_registers_inner_rules() {
        let program = compile(r#"{"top": {"(exclude)": "inner"}, "inner": "i"}"#).unwrap();
        assert_eq!(program.len(), 2);
        assert!(matches!(
            program.rule(program.start()).body,
            Expression::Exclude(_)
        ));
    }

    #[test]
    fn test_guard() {
        let expr = body(r#"{"top": {"(if)": {"(<)": ["a", 1]}, "(+++)": " "}}"#);
        assert_eq!(
            expr,
            Expression::Sequence(vec![
                Expression::Unsupported("(<)"),
                Expression::Plus(Box::new(literal(b" "))),
            ])
        );
    }

    #[test]
    fn test_arguments() {
        let program = compile(
            r#"{
                "top": {"nested": 2},
                "nested": {"(...)": "n", "(all)": [
                    {"s-indent": {"(+)": ["n", 1]}},
                    {"s-indent": {"(-)": ["n", 1, 1]}},
                    {"s-indent": {"(+)": [1, 2]}},
                    {"s-indent": {"(+)": ["n", 0]}},
                    {"pair": ["n", "block-in"]}
                ]},
                "s-indent": {"(...)": "n", "(***)": " "},
                "pair": {"(...)": ["n", "c"], "(***)": " "}
            }"#,
        )
        .unwrap();

        let Expression::Sequence(calls) = &program.rule(program.get("nested").unwrap()).body else {
            panic!("Expected a sequence");
        };
        let args = calls
            .iter()
            .map(|call| match call {
                Expression::RuleCall { args, .. } => args.clone(),
                other => panic!("Expected a call, got {other:?}"),
            })
            .collect::<Vec<_>>();

        let n = || Expression::Var("n".to_owned());
        assert_eq!(
            args[0],
            [Expression::Sum(vec![
                Term::positive(n()),
                Term::positive(Expression::Number(1))
            ])]
        );
        assert_eq!(
            args[1],
            [Expression::Sum(vec![
                Term::positive(n()),
                Term::negative(Expression::Number(2))
            ])]
        );
        assert_eq!(args[2], [Expression::Number(3)]);
        assert_eq!(args[3], [n()]);
        assert_eq!(
            args[4],
            [n(), Expression::Constant("block-in".to_owned())]
        );
    }

    #[test]
    fn test_switch() {
        let src = r#"{
            "top": {"line": ["block-in"]},
            "line": {"(...)": "c", "(case)": {
                "var": "c",
                "block-in": "i",
                "2": "o"
            }}
        }"#;

        let options = CompileOptions {
            unmatched_case: Some(CasePolicy::Fail),
            ..CompileOptions::with_start("top")
        };
        let program = compile_with(src, &options).unwrap();
        let line = program.rule(program.get("line").unwrap());
        assert_eq!(
            line.body,
            Expression::Switch {
                variable: "c".to_owned(),
                cases: vec![
                    (CaseLabel::Name("block-in".to_owned()), literal(b"i")),
                    (CaseLabel::Int(2), literal(b"o")),
                ],
                policy: CasePolicy::Fail,
            }
        );

        let err = compile(src).unwrap_err();
        assert!(matches!(err, GrammarError::MissingCasePolicy { ref rule } if rule == "line"));
    }

    fn error(src: &str) -> GrammarError {
        let options = CompileOptions {
            unmatched_case: Some(CasePolicy::Panic),
            ..CompileOptions::with_start("top")
        };
        compile_with(src, &options).unwrap_err()
    }

    #[test]
    fn test_errors() {
        use GrammarError::*;

        assert!(matches!(
            error(r#"{"top": "missing"}"#),
            UndeclaredRule { rule: Some(_), ref name } if name == "missing"
        ));
        assert!(matches!(error(r#"{"top": ["a"]}"#), MalformedRange { .. }));
        assert!(matches!(error(r#"{"top": ["a", 1]}"#), MalformedRange { .. }));
        assert!(matches!(error(r#"{"top": ["ab", "c"]}"#), MalformedRange { .. }));
        assert!(matches!(error(r#"{"top": ["z", "a"]}"#), InvalidRange { .. }));
        assert!(matches!(error(r#"{"top": ""}"#), MalformedMatcher { .. }));
        assert!(matches!(error(r#"{"top": "x0"}"#), MalformedMatcher { .. }));
        assert!(matches!(error(r#"{"top": "xZZ"}"#), MalformedMatcher { .. }));
        assert!(matches!(error(r#"{"top": 3}"#), UnexpectedShape { .. }));
        assert!(matches!(
            error(r#"{"top": {"(all)": "a"}}"#),
            UnexpectedShape { .. }
        ));
        assert!(matches!(
            error(r#"{"top": {"(+)": ["a", 1]}}"#),
            UnexpectedShape { .. }
        ));
        assert!(matches!(
            error(r#"{"top": {"(bogus)": "a"}}"#),
            UnknownOperator { ref operator, .. } if operator == "(bogus)"
        ));
        assert!(matches!(error(r#"{"top": {}}"#), MalformedDict { .. }));
        assert!(matches!(
            error(r#"{"top": {"(all)": [], "(any)": []}}"#),
            MalformedDict { .. }
        ));
        assert!(matches!(
            error(r#"{"top": {"(all)": [], "(if)": "a"}}"#),
            MalformedDict { .. }
        ));
        assert!(matches!(
            error(r#"{"top": {"(all)": [{"(...)": "n", "(***)": " "}]}}"#),
            MalformedDict { .. }
        ));
        assert!(matches!(
            error(r#"{"top": "pp", "pp": {"(...)": [1], "(***)": " "}}"#),
            MalformedParameters { .. }
        ));
        assert!(matches!(
            error(r#"{"top": "pp", "pp": {"(...)": "n", "(***)": " "}}"#),
            ArityMismatch {
                expected: 1,
                provided: 0,
                ..
            }
        ));
        assert!(matches!(
            error(r#"{"top": {"p": [1, 2]}, "p": {"(...)": "n", "(***)": " "}}"#),
            ArityMismatch {
                expected: 1,
                provided: 2,
                ..
            }
        ));
        assert!(matches!(
            error(r#"{"top": {"p": {"(+)": ["m", 1]}}, "p": {"(...)": "n", "(***)": " "}}"#),
            UnknownVariable { ref variable, .. } if variable == "m"
        ));
        assert!(matches!(
            error(r#"{"top": {"(...)": "n", "(case)": {"var": "c"}}}"#),
            UnknownVariable { ref variable, .. } if variable == "c"
        ));
        assert!(matches!(
            error(r#"{"top": {"(...)": "n", "(case)": {"1": "a"}}}"#),
            MalformedCase { .. }
        ));
        assert!(matches!(
            error(r#"{"top": {"(...)": "n", "(case)": {"var": "n", "1": "a", "01": "b"}}}"#),
            MalformedCase { .. }
        ));
        assert!(matches!(
            error(r#"{"top": {"(...)": "n", "(case)": "n"}}"#),
            MalformedCase { .. }
        ));
        assert!(matches!(error(r#"{"top": {"(---)": []}}"#), EmptySubtract { .. }));
    }
}
