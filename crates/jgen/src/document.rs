use serde_json::{Map, Value};

use crate::error::{snippet, GrammarError};

/// Modifier key declaring the formal parameters of a rule.
pub const PARAMETERS_KEY: &str = "(...)";

/// The parsed grammar, a dict from rule name to its JSON expression.
#[derive(Clone, Debug)]
pub struct GrammarDocument {
    rules: Map<String, Value>,
}

impl GrammarDocument {
    pub fn from_str(src: &str) -> Result<GrammarDocument, GrammarError> {
        let value: Value = serde_json::from_str(src)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<GrammarDocument, GrammarError> {
        match value {
            Value::Object(rules) => Ok(GrammarDocument { rules }),
            _ => Err(GrammarError::NotADictionary),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Formal parameters of `name` as declared by a leading `(...)` key.
    ///
    /// Rules without the declaration, including those whose body isn't a dict,
    /// take no parameters.
    pub fn parameters(&self, name: &str) -> Result<Vec<String>, GrammarError> {
        let Some(Value::Object(body)) = self.rules.get(name) else {
            return Ok(Vec::new());
        };
        let Some(declaration) = body.get(PARAMETERS_KEY) else {
            return Ok(Vec::new());
        };

        let malformed = || GrammarError::MalformedParameters {
            rule: name.to_owned(),
            value: snippet(declaration),
        };

        let params = match declaration {
            Value::String(param) => vec![param.clone()],
            Value::Array(items) => {
                let mut params: Vec<String> = Vec::with_capacity(items.len());
                for item in items {
                    let Value::String(param) = item else {
                        return Err(malformed());
                    };
                    if params.contains(param) {
                        return Err(malformed());
                    }
                    params.push(param.clone());
                }
                params
            }
            _ => return Err(malformed()),
        };

        if params.iter().any(String::is_empty) {
            return Err(malformed());
        }

        Ok(params)
    }
}
