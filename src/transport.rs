use std::fmt::Write as _;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use ureq::OrAnyStatus;
use url::form_urlencoded;

use crate::definition::ContentType;
use crate::duplication::strip_index;
use crate::request::RequestDescriptor;
use crate::tls;

const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] ureq::Transport),
    #[error("unable to read response body")]
    Body(#[from] std::io::Error),
    #[error("invalid proxy `{0}`")]
    Proxy(String),
    #[error(transparent)]
    Tls(#[from] tls::TlsError),
}

/// A descriptor rendered into what goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub trait Transport {
    fn send(&mut self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub proxy: Option<String>,
    pub local_cert: Option<PathBuf>,
    pub insecure: bool,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<HttpTransport, TransportError> {
        let tls_config = if options.insecure {
            tls::accept_any_cert_config()
        } else {
            tls::trusted_roots_config(options.local_cert.as_deref())?
        };

        let mut builder = ureq::AgentBuilder::new()
            .timeout(options.timeout)
            .redirects(0)
            .tls_config(Arc::new(tls_config));
        if let Some(proxy) = &options.proxy {
            let proxy = ureq::Proxy::new(proxy).map_err(|_| TransportError::Proxy(proxy.clone()))?;
            builder = builder.proxy(proxy);
        }

        Ok(HttpTransport {
            agent: builder.build(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        debug!(method = %request.method, uri = %request.uri, "sending request");
        let mut call = self.agent.request(&request.method, &request.uri);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let response = if request.body.is_empty() {
            call.call().or_any_status()?
        } else {
            call.send_bytes(&request.body).or_any_status()?
        };

        let status = response.status();
        let headers = response
            .headers_names()
            .into_iter()
            .filter_map(|name| {
                let value = response.header(&name)?.to_string();
                Some((name, value))
            })
            .collect();

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

pub fn prepare(request: &RequestDescriptor) -> PreparedRequest {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    headers.push((
        "Content-Type".to_string(),
        request.content_type.header_value().to_string(),
    ));

    PreparedRequest {
        method: request.method.to_string(),
        uri: build_uri(&request.base_uri, &request.endpoint, &request.request_params),
        headers,
        body: build_body(&request.content_type, &request.body_params),
    }
}

/// Joins base and path with exactly one `/` and appends the query string.
pub fn build_uri<'a>(
    base: &str,
    endpoint: &str,
    params: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> String {
    let mut uri = match (base.ends_with('/'), endpoint.starts_with('/')) {
        (true, true) => format!("{}{}", base, &endpoint[1..]),
        (false, false) if !endpoint.is_empty() => format!("{}/{}", base, endpoint),
        _ => format!("{}{}", base, endpoint),
    };

    let query = encode_pairs(params.into_iter().map(|(key, value)| (key.as_str(), Some(value.as_str()))));
    if !query.is_empty() {
        uri.push('?');
        uri.push_str(&query);
    }
    uri
}

// Keys lose their `:N` copy tag, so polluted pairs repeat the same name.
fn encode_pairs<'a>(pairs: impl Iterator<Item = (&'a str, Option<&'a str>)>) -> String {
    let mut encoded = String::new();
    for (key, value) in pairs {
        if !encoded.is_empty() {
            encoded.push('&');
        }
        encoded.extend(form_urlencoded::byte_serialize(strip_index(key).as_bytes()));
        if let Some(value) = value {
            encoded.push('=');
            encoded.extend(form_urlencoded::byte_serialize(value.as_bytes()));
        }
    }
    encoded
}

pub fn build_body(content_type: &ContentType, body: &Map<String, Value>) -> Vec<u8> {
    match content_type {
        ContentType::Json => {
            if body.is_empty() {
                return Vec::new();
            }
            let mut out = String::new();
            write_json_object(body, &mut out);
            out.into_bytes()
        }
        ContentType::FormData => {
            let texts: Vec<(&str, Option<String>)> = body
                .iter()
                .map(|(key, value)| {
                    let text = match value {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    };
                    (key.as_str(), text)
                })
                .collect();
            encode_pairs(texts.iter().map(|(key, text)| (*key, text.as_deref()))).into_bytes()
        }
        ContentType::Other(_) => raw_data(body).into_bytes(),
    }
}

fn raw_data(body: &Map<String, Value>) -> String {
    let text = |key: &str| body.get(key).map(crate::variable::value_to_text);
    if let Some(data) = text("data") {
        data
    } else if let Some(first) = text("data:1") {
        first + &text("data:2").unwrap_or_default()
    } else {
        String::new()
    }
}

fn write_json_object(map: &Map<String, Value>, out: &mut String) {
    out.push('{');
    for (idx, (key, value)) in map.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(strip_index(key).to_string()).to_string());
        out.push(':');
        write_json(value, out);
    }
    out.push('}');
}

fn write_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_json_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl PreparedRequest {
    /// Dump used in debug output.
    pub fn dump(&self) -> String {
        let mut dump = format!("{} {}\n", self.method, self.uri);
        for (name, value) in &self.headers {
            let _ = writeln!(dump, "{}: {}", name, value);
        }
        if !self.body.is_empty() {
            dump.push('\n');
            dump.push_str(&String::from_utf8_lossy(&self.body));
            dump.push('\n');
        }
        dump
    }

    pub fn to_curl(&self) -> String {
        let mut curl_command = format!("curl -X {} ", self.method);
        if !self.body.is_empty() {
            curl_command += &format!("-d '{}' ", String::from_utf8_lossy(&self.body));
        }
        for (name, value) in &self.headers {
            curl_command += &format!("-H '{}: {}' ", name, value);
        }
        curl_command + &format!("'{}'", self.uri)
    }
}

impl RawResponse {
    pub fn dump(&self) -> String {
        let mut dump = format!("HTTP {}\n", self.status);
        for (name, value) in &self.headers {
            let _ = writeln!(dump, "{}: {}", name, value);
        }
        dump.push('\n');
        dump.push_str(&String::from_utf8_lossy(&self.body));
        dump
    }
}
