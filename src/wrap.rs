//! Parameter wrapping: the same value nested inside an envelope that some
//! parsers unwrap and others ignore.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Value};

use crate::duplication::carries;
use crate::request::RequestDescriptor;

/// Envelopes for query parameters, expressed through the parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamEnvelope {
    /// `key[]=value`
    Array,
    /// `key[key]=value`
    Object,
    /// `key.key=value`
    Dotted,
}

impl ParamEnvelope {
    pub const ALL: [ParamEnvelope; 3] = [ParamEnvelope::Array, ParamEnvelope::Object, ParamEnvelope::Dotted];

    fn wrap_key(self, key: &str) -> String {
        match self {
            ParamEnvelope::Array => format!("{}[]", key),
            ParamEnvelope::Object => format!("{}[{}]", key, key),
            ParamEnvelope::Dotted => format!("{}.{}", key, key),
        }
    }
}

impl fmt::Display for ParamEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamEnvelope::Array => f.write_str("array"),
            ParamEnvelope::Object => f.write_str("object"),
            ParamEnvelope::Dotted => f.write_str("dotted"),
        }
    }
}

/// Envelopes for body parameters, expressed through the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEnvelope {
    /// `[value]`
    Array,
    /// `{"key": value}`
    Object,
}

impl BodyEnvelope {
    pub const ALL: [BodyEnvelope; 2] = [BodyEnvelope::Array, BodyEnvelope::Object];

    fn wrap_value(self, key: &str, value: Value) -> Value {
        match self {
            BodyEnvelope::Array => Value::Array(vec![value]),
            BodyEnvelope::Object => {
                let mut inner = Map::new();
                inner.insert(key.to_string(), value);
                Value::Object(inner)
            }
        }
    }
}

impl fmt::Display for BodyEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyEnvelope::Array => f.write_str("array"),
            BodyEnvelope::Object => f.write_str("object"),
        }
    }
}

fn carries_directly(items: &[Value], targets: &BTreeSet<String>) -> bool {
    items
        .iter()
        .any(|item| matches!(item, Value::String(s) if carries(s, targets)))
}

pub fn wrap_request_params(
    request: &RequestDescriptor,
    targets: &BTreeSet<String>,
    envelope: ParamEnvelope,
) -> RequestDescriptor {
    let mut wrapped = request.clone();
    wrapped.request_params = request
        .request_params
        .iter()
        .map(|(key, value)| {
            let key = if carries(value, targets) {
                envelope.wrap_key(key)
            } else {
                key.clone()
            };
            (key, value.clone())
        })
        .collect::<BTreeMap<_, _>>();
    wrapped
}

pub fn wrap_body_params(
    request: &RequestDescriptor,
    targets: &BTreeSet<String>,
    envelope: BodyEnvelope,
) -> RequestDescriptor {
    let mut wrapped = request.clone();
    wrapped.body_params = wrap_map(&request.body_params, targets, envelope);
    wrapped
}

// String leaves and arrays holding a target directly are wrapped; submaps are walked.
fn wrap_map(map: &Map<String, Value>, targets: &BTreeSet<String>, envelope: BodyEnvelope) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) if carries(s, targets) => envelope.wrap_value(key, value.clone()),
                Value::Array(items) if carries_directly(items, targets) => {
                    envelope.wrap_value(key, value.clone())
                }
                Value::Object(inner) => Value::Object(wrap_map(inner, targets, envelope)),
                _ => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}
