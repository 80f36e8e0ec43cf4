//! `$`-delimited variable references and their resolution.
//!
//! A token starts at `$` and runs to the next `$` (inclusive), the next `/` or
//! `.` (exclusive) or the end of the string. Four spellings resolve to a
//! declared variable: `$name`, `$name$`, `$name:N` and `$name:N$`, where the
//! `:N` suffix marks one copy of a polluted parameter.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use serde::Deserialize;
use serde_json::Value;

use crate::definition::DefinitionError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Variable {
    pub high: Value,
    pub low: Value,
    #[serde(default)]
    pub alias: String,
}

/// Declared variables, reachable by name or by alias.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    vars: BTreeMap<String, Variable>,
    aliases: HashMap<String, String>,
}

impl VariableSet {
    pub fn new(declared: BTreeMap<String, Variable>) -> Result<VariableSet, DefinitionError> {
        let mut vars = BTreeMap::new();
        let mut aliases = HashMap::new();

        for (name, mut var) in declared {
            for (level, value) in [("high", &var.high), ("low", &var.low)] {
                if value.is_null() {
                    return Err(DefinitionError::MissingValue { name, level });
                }
            }
            if var.alias.is_empty() {
                var.alias = name.clone();
            }
            vars.insert(name, var);
        }

        for (name, var) in &vars {
            if var.alias == *name {
                continue;
            }
            if vars.contains_key(&var.alias) || aliases.contains_key(&var.alias) {
                return Err(DefinitionError::DuplicateAlias {
                    name: name.clone(),
                    alias: var.alias.clone(),
                });
            }
            aliases.insert(var.alias.clone(), name.clone());
        }

        Ok(VariableSet { vars, aliases })
    }

    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.vars.get(key).or_else(|| {
            self.aliases
                .get(key)
                .and_then(|name| self.vars.get(name))
        })
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Resolves a raw token such as `$id:2$`; unknown or malformed tokens yield `None`.
    pub fn resolve(&self, token: &str) -> Option<&Variable> {
        parse_token(token, |key| self.get(key).is_some())
            .and_then(|parsed| self.get(parsed.name))
    }
}

/// A token split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableToken<'a> {
    pub raw: &'a str,
    pub name: &'a str,
    pub index: Option<u8>,
    pub delimited: bool,
}

/// Tries the accepted spellings in order, stopping at the first whose name
/// satisfies `known`.
pub fn parse_token<'a>(raw: &'a str, known: impl Fn(&str) -> bool) -> Option<VariableToken<'a>> {
    let body = raw.strip_prefix('$')?;
    let undelimited = body.strip_suffix('$');

    let candidates = [
        Some((body, None, false)),
        undelimited.map(|name| (name, None, true)),
        split_index(body).map(|(name, index)| (name, Some(index), false)),
        undelimited
            .and_then(split_index)
            .map(|(name, index)| (name, Some(index), true)),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|(name, _, _)| !name.is_empty() && known(name))
        .map(|(name, index, delimited)| VariableToken {
            raw,
            name,
            index,
            delimited,
        })
}

/// Splits a trailing `:<digit>`; strings too short to carry one are rejected.
pub fn split_index(s: &str) -> Option<(&str, u8)> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let (colon, digit) = (bytes[bytes.len() - 2], bytes[bytes.len() - 1]);
    if colon == b':' && digit.is_ascii_digit() {
        Some((&s[..s.len() - 2], digit - b'0'))
    } else {
        None
    }
}

/// Byte ranges of every token in `s`, in order of appearance.
pub fn token_spans(s: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;

    for (idx, ch) in s.char_indices() {
        match (ch, start) {
            ('$', Some(begin)) => {
                spans.push(begin..idx + 1);
                start = None;
            }
            ('$', None) => start = Some(idx),
            ('/' | '.', Some(begin)) => {
                spans.push(begin..idx);
                start = None;
            }
            _ => {}
        }
    }

    if let Some(begin) = start {
        spans.push(begin..s.len());
    }
    spans
}

pub fn find_in_str(s: &str) -> Vec<String> {
    token_spans(s)
        .into_iter()
        .map(|span| s[span].to_string())
        .collect()
}

pub fn find_in_params(params: &BTreeMap<String, String>) -> Vec<String> {
    params.values().flat_map(|value| find_in_str(value)).collect()
}

pub fn find_in_body(body: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut tokens = Vec::new();
    for value in body.values() {
        collect_from_value(value, &mut tokens);
    }
    tokens
}

fn collect_from_value(value: &Value, tokens: &mut Vec<String>) {
    match value {
        Value::String(s) => tokens.extend(find_in_str(s)),
        Value::Array(items) => items.iter().for_each(|item| collect_from_value(item, tokens)),
        Value::Object(map) => map.values().for_each(|item| collect_from_value(item, tokens)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Textual form of a value when it is spliced into a path or query string.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
