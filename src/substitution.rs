use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Value};

use crate::permutation::HIGH;
use crate::request::RequestDescriptor;
use crate::variable::{self, Variable, VariableSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    High,
    Low,
}

impl Privilege {
    fn pick(self, var: &Variable) -> &Value {
        match self {
            Privilege::High => &var.high,
            Privilege::Low => &var.low,
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::High => f.write_str("high"),
            Privilege::Low => f.write_str("low"),
        }
    }
}

/// Which privilege each token takes. Tokens without an explicit entry take
/// the fallback level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    levels: BTreeMap<String, Privilege>,
    fallback: Privilege,
}

impl Assignment {
    pub fn uniform(privilege: Privilege) -> Assignment {
        Assignment {
            levels: BTreeMap::new(),
            fallback: privilege,
        }
    }

    /// Binds the i-th slot to the i-th character of the permutation.
    ///
    /// Returns `None` when the lengths disagree.
    pub fn from_permutation(
        slots: &[String],
        permutation: &str,
        fallback: Privilege,
    ) -> Option<Assignment> {
        if slots.len() != permutation.chars().count() {
            return None;
        }
        let levels = slots
            .iter()
            .zip(permutation.chars())
            .map(|(slot, bit)| {
                let privilege = if bit == HIGH {
                    Privilege::High
                } else {
                    Privilege::Low
                };
                (slot.clone(), privilege)
            })
            .collect();
        Some(Assignment { levels, fallback })
    }

    pub fn level(&self, token: &str) -> Privilege {
        self.levels.get(token).copied().unwrap_or(self.fallback)
    }
}

/// Sorted distinct tokens of a request that resolve to a declared variable.
pub fn sorted_tokens(request: &RequestDescriptor, vars: &VariableSet) -> Vec<String> {
    let distinct: BTreeSet<String> = request
        .tokens()
        .into_iter()
        .filter(|token| vars.resolve(token).is_some())
        .collect();
    distinct.into_iter().collect()
}

/// Applies an assignment to path, request params and body params.
pub struct Substitution<'a> {
    vars: &'a VariableSet,
    assignment: &'a Assignment,
}

impl<'a> Substitution<'a> {
    pub fn new(vars: &'a VariableSet, assignment: &'a Assignment) -> Substitution<'a> {
        Substitution { vars, assignment }
    }

    fn value_of(&self, token: &str) -> Option<&'a Value> {
        let var = self.vars.resolve(token)?;
        Some(self.assignment.level(token).pick(var))
    }

    /// Replaces every resolvable token inside `s`; the rest is kept verbatim.
    pub fn string(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut copied = 0;
        for span in variable::token_spans(s) {
            if let Some(value) = self.value_of(&s[span.clone()]) {
                out.push_str(&s[copied..span.start]);
                out.push_str(&variable::value_to_text(value));
                copied = span.end;
            }
        }
        out.push_str(&s[copied..]);
        out
    }

    pub fn params(&self, params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        params
            .iter()
            .map(|(key, value)| (key.clone(), self.string(value)))
            .collect()
    }

    /// String leaves that are exactly one token become the variable's typed value.
    pub fn value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => match self.value_of(s) {
                Some(resolved) if is_single_token(s) => resolved.clone(),
                _ => value.clone(),
            },
            Value::Array(items) => Value::Array(items.iter().map(|item| self.value(item)).collect()),
            Value::Object(map) => Value::Object(self.body(map)),
            Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        }
    }

    pub fn body(&self, body: &Map<String, Value>) -> Map<String, Value> {
        body.iter()
            .map(|(key, value)| (key.clone(), self.value(value)))
            .collect()
    }

    pub fn apply(&self, request: &RequestDescriptor) -> RequestDescriptor {
        let mut substituted = request.clone();
        substituted.endpoint = self.string(&request.endpoint);
        substituted.request_params = self.params(&request.request_params);
        substituted.body_params = self.body(&request.body_params);
        substituted
    }

    /// High values of the tokens this assignment sets to high; they must not
    /// show up in a response obtained with lower privileges.
    pub fn banned_words(&self, request: &RequestDescriptor) -> Vec<String> {
        let mut words = Vec::new();
        for token in request.tokens() {
            if self.assignment.level(&token) != Privilege::High {
                continue;
            }
            let Some(var) = self.vars.resolve(&token) else {
                continue;
            };
            let word = match &var.high {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            if !word.is_empty() && !words.contains(&word) {
                words.push(word);
            }
        }
        words
    }
}

fn is_single_token(s: &str) -> bool {
    matches!(variable::token_spans(s).as_slice(), [span] if span.start == 0 && span.end == s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable;
    use proptest::prelude::*;
    use serde_json::json;

    fn vars() -> VariableSet {
        let mut declared = BTreeMap::new();
        declared.insert(
            "id".to_string(),
            Variable {
                high: json!("1"),
                low: json!("2"),
                alias: String::new(),
            },
        );
        declared.insert(
            "tags".to_string(),
            Variable {
                high: json!(["admin", "root"]),
                low: json!(["guest"]),
                alias: String::new(),
            },
        );
        declared.insert(
            "n".to_string(),
            Variable {
                high: json!(42),
                low: json!(7),
                alias: String::new(),
            },
        );
        VariableSet::new(declared).unwrap()
    }

    #[test]
    fn uniform_path_substitution() {
        let vars = vars();
        let template = RequestDescriptor::bare("/users/$id");

        let high = Assignment::uniform(Privilege::High);
        assert_eq!(Substitution::new(&vars, &high).apply(&template).endpoint, "/users/1");

        let low = Assignment::uniform(Privilege::Low);
        assert_eq!(Substitution::new(&vars, &low).apply(&template).endpoint, "/users/2");
    }

    #[test]
    fn unresolved_tokens_are_kept_literally() {
        let vars = vars();
        let high = Assignment::uniform(Privilege::High);
        let sub = Substitution::new(&vars, &high);
        assert_eq!(sub.string("/a/$missing/$id$.json"), "/a/$missing/1.json");
    }

    #[test]
    fn permutation_drives_request_params() {
        let vars = vars();
        let mut template = RequestDescriptor::bare("/users");
        template
            .request_params
            .insert("id".to_string(), "$id".to_string());
        let slots = sorted_tokens(&template, &vars);
        assert_eq!(slots, vec!["$id"]);

        let high = Assignment::from_permutation(&slots, "h", Privilege::Low).unwrap();
        let applied = Substitution::new(&vars, &high).apply(&template);
        assert_eq!(applied.request_params["id"], "1");

        let low = Assignment::from_permutation(&slots, "l", Privilege::Low).unwrap();
        let applied = Substitution::new(&vars, &low).apply(&template);
        assert_eq!(applied.request_params["id"], "2");

        assert!(Assignment::from_permutation(&slots, "hl", Privilege::Low).is_none());
    }

    #[test]
    fn body_leaves_take_typed_values() {
        let vars = vars();
        let mut template = RequestDescriptor::bare("/users");
        template.body_params = json!({
            "id": "$id",
            "count": "$n",
            "roles": "$tags",
            "nested": {"list": ["$n", "x-$id"]},
        })
        .as_object()
        .cloned()
        .unwrap();

        let high = Assignment::uniform(Privilege::High);
        let applied = Substitution::new(&vars, &high).apply(&template);
        assert_eq!(
            Value::Object(applied.body_params),
            json!({
                "id": "1",
                "count": 42,
                "roles": ["admin", "root"],
                "nested": {"list": [42, "x-$id"]},
            })
        );
    }

    #[test]
    fn template_is_left_untouched() {
        let vars = vars();
        let mut template = RequestDescriptor::bare("/users/$id");
        template.body_params.insert("id".to_string(), json!("$id"));
        let before = template.clone();

        let high = Assignment::uniform(Privilege::High);
        let _ = Substitution::new(&vars, &high).apply(&template);
        assert_eq!(template, before);
    }

    #[test]
    fn banned_words_follow_the_assignment() {
        let vars = vars();
        let mut template = RequestDescriptor::bare("/users/$id");
        template
            .request_params
            .insert("n".to_string(), "$n".to_string());
        template.body_params.insert("roles".to_string(), json!("$tags"));

        let slots = sorted_tokens(&template, &vars);
        assert_eq!(slots, vec!["$id", "$n", "$tags"]);

        let assignment = Assignment::from_permutation(&slots, "lhh", Privilege::Low).unwrap();
        let banned = Substitution::new(&vars, &assignment).banned_words(&template);
        assert_eq!(banned, vec!["42"]);
    }

    proptest! {
        #[test]
        fn high_substitution_leaves_no_tokens(segments in proptest::collection::vec("[a-z]{1,6}", 0..5)) {
            let vars = vars();
            let path = segments
                .iter()
                .enumerate()
                .map(|(i, s)| if i % 2 == 0 { format!("/{}", s) } else { "/$id".to_string() })
                .collect::<String>();
            let high = Assignment::uniform(Privilege::High);
            let substituted = Substitution::new(&vars, &high).string(&path);
            prop_assert!(variable::find_in_str(&substituted).is_empty());
        }
    }
}
