//! Parameter pollution support.
//!
//! Every parameter carrying a target token is split into two copies whose
//! keys and tokens are tagged `:1` and `:2`. The tagged tokens still resolve
//! to the same variable, so each copy can be given its own privilege.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::request::RequestDescriptor;
use crate::variable::{self, VariableSet};

pub const COPIES: [u8; 2] = [1, 2];

/// Tags a token with a copy index, keeping a closing `$` last.
pub fn index_token(token: &str, index: u8) -> String {
    match token.strip_suffix('$') {
        Some(open) if open.len() > 1 => format!("{}:{}$", open, index),
        _ => format!("{}:{}", token, index),
    }
}

pub fn index_key(key: &str, index: u8) -> String {
    format!("{}:{}", key, index)
}

/// Strips a `:N` copy tag from a key, if there is one.
pub fn strip_index(key: &str) -> &str {
    variable::split_index(key).map_or(key, |(base, _)| base)
}

/// Distinct resolvable tokens of `tokens`, sorted.
pub fn targets(tokens: Vec<String>, vars: &VariableSet) -> BTreeSet<String> {
    tokens
        .into_iter()
        .filter(|token| vars.resolve(token).is_some())
        .collect()
}

/// Permutation slots for a set of targets: each target's `:1` copy followed
/// by its `:2` copy, so every pair sits at positions `(2k, 2k + 1)`.
pub fn pair_slots(targets: &BTreeSet<String>) -> Vec<String> {
    targets
        .iter()
        .flat_map(|target| COPIES.iter().map(move |&index| index_token(target, index)))
        .collect()
}

/// Whether `s` holds at least one of the target tokens.
pub(crate) fn carries(s: &str, targets: &BTreeSet<String>) -> bool {
    variable::token_spans(s)
        .into_iter()
        .any(|span| targets.contains(&s[span]))
}

/// Rewrites every target token in `s` to its indexed form.
pub fn index_targets(s: &str, targets: &BTreeSet<String>, index: u8) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    let mut copied = 0;
    for span in variable::token_spans(s) {
        let token = &s[span.clone()];
        if targets.contains(token) {
            out.push_str(&s[copied..span.start]);
            out.push_str(&index_token(token, index));
            copied = span.end;
        }
    }
    out.push_str(&s[copied..]);
    out
}

pub fn duplicate_params(
    params: &BTreeMap<String, String>,
    targets: &BTreeSet<String>,
) -> BTreeMap<String, String> {
    let mut duplicated = BTreeMap::new();
    for (key, value) in params {
        if carries(value, targets) {
            for index in COPIES {
                duplicated.insert(index_key(key, index), index_targets(value, targets, index));
            }
        } else {
            duplicated.insert(key.clone(), value.clone());
        }
    }
    duplicated
}

pub fn duplicate_body(body: &Map<String, Value>, targets: &BTreeSet<String>) -> Map<String, Value> {
    let mut duplicated = Map::new();
    for (key, value) in body {
        match value {
            Value::String(s) if carries(s, targets) => {
                for index in COPIES {
                    duplicated.insert(
                        index_key(key, index),
                        Value::String(index_targets(s, targets, index)),
                    );
                }
            }
            Value::Array(items) => {
                let (items, direct) = duplicate_array(items, targets);
                if direct {
                    for index in COPIES {
                        duplicated.insert(
                            index_key(key, index),
                            Value::Array(index_array(&items, targets, index)),
                        );
                    }
                } else {
                    duplicated.insert(key.clone(), Value::Array(items));
                }
            }
            Value::Object(map) => {
                duplicated.insert(key.clone(), Value::Object(duplicate_body(map, targets)));
            }
            _ => {
                duplicated.insert(key.clone(), value.clone());
            }
        }
    }
    duplicated
}

// Nested containers are duplicated in place; the flag reports whether a
// target token sits directly in the array.
fn duplicate_array(items: &[Value], targets: &BTreeSet<String>) -> (Vec<Value>, bool) {
    let mut direct = false;
    let items = items
        .iter()
        .map(|item| match item {
            Value::String(s) => {
                direct |= carries(s, targets);
                item.clone()
            }
            Value::Array(nested) => Value::Array(duplicate_array(nested, targets).0),
            Value::Object(map) => Value::Object(duplicate_body(map, targets)),
            _ => item.clone(),
        })
        .collect();
    (items, direct)
}

fn index_array(items: &[Value], targets: &BTreeSet<String>, index: u8) -> Vec<Value> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) if carries(s, targets) => {
                Value::String(index_targets(s, targets, index))
            }
            _ => item.clone(),
        })
        .collect()
}

/// Request params split into two tagged copies.
pub fn pollute_request_params(request: &RequestDescriptor, targets: &BTreeSet<String>) -> RequestDescriptor {
    let mut polluted = request.clone();
    polluted.request_params = duplicate_params(&request.request_params, targets);
    polluted
}

/// Body params split into two tagged copies.
pub fn pollute_body_params(request: &RequestDescriptor, targets: &BTreeSet<String>) -> RequestDescriptor {
    let mut polluted = request.clone();
    polluted.body_params = duplicate_body(&request.body_params, targets);
    polluted
}

/// Moves every request param carrying a target into the body, unchanged.
pub fn move_params_to_body(request: &RequestDescriptor, targets: &BTreeSet<String>) -> RequestDescriptor {
    let mut moved = request.clone();
    let (carriers, kept): (BTreeMap<_, _>, BTreeMap<_, _>) = request
        .request_params
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .partition(|(_, value)| carries(value, targets));
    moved.request_params = kept;
    for (key, value) in carriers {
        moved.body_params.insert(key, Value::String(value));
    }
    moved
}

/// Splits carrier params in two: the `:1` copy stays in the query and the
/// `:2` copy moves into the body.
pub fn split_params_across_body(
    request: &RequestDescriptor,
    targets: &BTreeSet<String>,
) -> RequestDescriptor {
    let mut split = request.clone();
    split.request_params = BTreeMap::new();
    for (key, value) in &request.request_params {
        if carries(value, targets) {
            split
                .request_params
                .insert(index_key(key, 1), index_targets(value, targets, 1));
            split.body_params.insert(
                index_key(key, 2),
                Value::String(index_targets(value, targets, 2)),
            );
        } else {
            split.request_params.insert(key.clone(), value.clone());
        }
    }
    split
}
