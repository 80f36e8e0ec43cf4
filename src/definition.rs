use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::variable::{Variable, VariableSet};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("unable to read definition {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse definition")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid base uri `{0}`")]
    InvalidBase(String),
    #[error("auth header name must not be empty")]
    EmptyHeaderName,
    #[error("variable `{name}` is missing its {level} value")]
    MissingValue { name: String, level: &'static str },
    #[error("alias `{alias}` of variable `{name}` is already in use")]
    DuplicateAlias { name: String, alias: String },
}

/// The API under test, as described by the definition file.
#[derive(Debug, Clone, Deserialize)]
pub struct Definition {
    #[serde(rename = "base")]
    pub base_uri: String,
    #[serde(rename = "auth")]
    pub auth: AuthDetails,
    #[serde(rename = "vars", default)]
    raw_vars: BTreeMap<String, Variable>,
    #[serde(skip)]
    pub vars: VariableSet,
    pub api: ApiDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthDetails {
    pub header_name: String,
    #[serde(default)]
    pub header_value_prefix: String,
    #[serde(rename = "high_privileged_access_token")]
    pub high: String,
    #[serde(rename = "low_privileged_access_token")]
    pub low: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiDetails {
    #[serde(rename = "methods", default)]
    pub global_methods: Vec<Method>,
    #[serde(rename = "headers", default)]
    pub global_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub endpoints: IndexMap<String, Vec<EndpointOperation>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointOperation {
    pub method: Method,
    #[serde(default)]
    pub is_delete: bool,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub request_params: BTreeMap<String, String>,
    #[serde(default)]
    pub body_params: Map<String, Value>,
}

impl EndpointOperation {
    pub fn is_destructive(&self) -> bool {
        self.is_delete || self.method == Method::Delete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "CONNECT" => Ok(Method::Connect),
            _ => Err(format!("unknown http method `{}`", s)),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How body params are serialized on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ContentType {
    #[default]
    Json,
    FormData,
    Other(String),
}

impl ContentType {
    pub fn header_value(&self) -> &str {
        match self {
            ContentType::Json => "application/json",
            ContentType::FormData => "application/x-www-form-urlencoded",
            ContentType::Other(raw) => raw,
        }
    }
}

impl From<String> for ContentType {
    fn from(raw: String) -> Self {
        let lowered = raw.to_ascii_lowercase();
        if raw == "JSON" || lowered.contains("application/json") {
            ContentType::Json
        } else if raw == "FORM-DATA" || lowered.contains("application/x-www-form-urlencoded") {
            ContentType::FormData
        } else {
            ContentType::Other(raw)
        }
    }
}

// Request params are sent as text, so YAML scalars like `limit: 10` are accepted.
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

impl Definition {
    pub fn load(path: &Path) -> Result<Definition, DefinitionError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DefinitionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Definition::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Definition, DefinitionError> {
        let mut definition: Definition = serde_yaml::from_str(raw)?;
        definition.validate()?;
        definition.vars = VariableSet::new(std::mem::take(&mut definition.raw_vars))?;
        Ok(definition)
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        match Url::parse(&self.base_uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(DefinitionError::InvalidBase(self.base_uri.clone())),
        }
        if self.auth.header_name.trim().is_empty() {
            return Err(DefinitionError::EmptyHeaderName);
        }
        Ok(())
    }

    pub fn endpoint_count(&self) -> usize {
        self.api.endpoints.len()
    }
}
