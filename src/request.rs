use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::definition::{AuthDetails, ContentType, Definition, EndpointOperation, Method};
use crate::substitution::Privilege;
use crate::variable;

/// A request in the making. Every strategy works on its own clone; the
/// template it came from is never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub base_uri: String,
    pub endpoint: String,
    pub content_type: ContentType,
    pub headers: BTreeMap<String, String>,
    pub request_params: BTreeMap<String, String>,
    pub body_params: Map<String, Value>,
}

impl RequestDescriptor {
    /// Builds the template for one operation: global headers first, then the
    /// operation's own headers on top.
    pub fn template(definition: &Definition, path: &str, operation: &EndpointOperation) -> Self {
        let mut headers = definition.api.global_headers.clone();
        headers.extend(
            operation
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        RequestDescriptor {
            method: operation.method,
            base_uri: definition.base_uri.clone(),
            endpoint: path.to_string(),
            content_type: operation.content_type.clone(),
            headers,
            request_params: operation.request_params.clone(),
            body_params: operation.body_params.clone(),
        }
    }

    /// Raw tokens of path, request params and body, in that order.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = variable::find_in_str(&self.endpoint);
        tokens.extend(variable::find_in_params(&self.request_params));
        tokens.extend(variable::find_in_body(&self.body_params));
        tokens
    }

    pub fn with_method(&self, method: Method) -> Self {
        let mut request = self.clone();
        request.method = method;
        request
    }

    pub fn with_auth(&self, auth: &AuthDetails, privilege: Privilege) -> Self {
        let token = match privilege {
            Privilege::High => &auth.high,
            Privilege::Low => &auth.low,
        };
        let mut request = self.without_auth(auth);
        request
            .headers
            .insert(auth.header_name.clone(), auth_header_value(&auth.header_value_prefix, token));
        request
    }

    pub fn without_auth(&self, auth: &AuthDetails) -> Self {
        let mut request = self.clone();
        request
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case(&auth.header_name));
        request
    }
}

#[cfg(test)]
impl RequestDescriptor {
    pub fn bare(endpoint: &str) -> Self {
        RequestDescriptor {
            method: Method::Get,
            base_uri: "https://api.example.com".to_string(),
            endpoint: endpoint.to_string(),
            content_type: ContentType::Json,
            headers: BTreeMap::new(),
            request_params: BTreeMap::new(),
            body_params: Map::new(),
        }
    }
}

pub fn auth_header_value(prefix: &str, token: &str) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        token.trim().to_string()
    } else {
        format!("{} {}", prefix, token.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEFINITION: &str = r#"
base: https://api.example.com/v1
auth:
  header_name: X-Api-Key
  high_privileged_access_token: hi
  low_privileged_access_token: lo
vars:
  id: { high: 1, low: 2 }
api:
  headers:
    Accept: application/json
    X-Shared: global
  endpoints:
    /users/$id:
      - method: PATCH
        headers:
          X-Shared: local
        request_params:
          q: $id
        body_params:
          owner: [$id]
"#;

    fn template() -> (Definition, RequestDescriptor) {
        let definition = Definition::from_yaml(DEFINITION).unwrap();
        let operation = definition.api.endpoints["/users/$id"][0].clone();
        let request = RequestDescriptor::template(&definition, "/users/$id", &operation);
        (definition, request)
    }

    #[test]
    fn local_headers_override_global() {
        let (_, request) = template();
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.headers["Accept"], "application/json");
        assert_eq!(request.headers["X-Shared"], "local");
        assert_eq!(request.body_params["owner"], json!(["$id"]));
    }

    #[test]
    fn tokens_follow_path_params_body_order() {
        let (_, request) = template();
        assert_eq!(request.tokens(), vec!["$id", "$id", "$id"]);
    }

    #[test]
    fn auth_header_is_swapped_and_removed() {
        let (definition, request) = template();
        let high = request.with_auth(&definition.auth, Privilege::High);
        assert_eq!(high.headers["X-Api-Key"], "hi");

        let low = high.with_auth(&definition.auth, Privilege::Low);
        assert_eq!(low.headers["X-Api-Key"], "lo");
        assert_eq!(high.headers["X-Api-Key"], "hi");

        let none = low.without_auth(&definition.auth);
        assert!(!none.headers.contains_key("X-Api-Key"));
    }

    #[test]
    fn prefix_is_optional() {
        assert_eq!(auth_header_value("Bearer ", " abc"), "Bearer abc");
        assert_eq!(auth_header_value("", "abc"), "abc");
    }
}
