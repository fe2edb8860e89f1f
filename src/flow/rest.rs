//! External call handler: templated requests over a pluggable transport,
//! with declarative response mappings and author-controlled mock policies.
//!
//! The engine never speaks HTTP itself; callers inject a [`Transport`] and
//! the handler only shapes requests and consumes normalized responses. Every
//! failure path degrades to synthesized data so a broken endpoint cannot
//! strand a session mid-conversation.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::Rng;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::expr::{self, Scope, render, render_str};

use super::engine::{FlowSession, Step};
use super::host::FlowHost;
use super::model::{MockMode, RestCallNode};

/// Fully templated request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method, upper-case by convention.
    pub method: String,
    /// Rendered request URL.
    pub url: String,
    /// Rendered request headers.
    pub headers: BTreeMap<String, String>,
    /// Rendered request body, when the node declares one.
    pub body: Option<Value>,
}

/// Normalized response returned by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Decoded response body.
    pub data: Value,
}

/// Outbound HTTP collaborator. Implementations decide blocking strategy,
/// TLS, retries, and so on; the engine only cares about the normalized
/// result.
pub trait Transport {
    /// Perform the request, blocking until a response (or failure) is known.
    fn send(&mut self, request: &HttpRequest) -> anyhow::Result<HttpResponse>;
}

/// Transport for sessions that must never reach the network; every send
/// fails, which routes `rest_call` nodes through their mock path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransport;

impl Transport for NoTransport {
    fn send(&mut self, request: &HttpRequest) -> anyhow::Result<HttpResponse> {
        anyhow::bail!("no transport configured for {} {}", request.method, request.url)
    }
}

impl<H: FlowHost, T: Transport> FlowSession<H, T> {
    /// Execute one `rest_call` node: render the request, obtain a response
    /// per the mock policy, store/map the result, resolve `next`.
    pub(super) fn handle_rest_call(&mut self, node_id: &str, node: &RestCallNode) -> Step {
        let request = HttpRequest {
            method: node.method.clone().unwrap_or_else(|| "GET".to_string()),
            url: render_str(&node.url, &self.ctx),
            headers: node
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), render_str(value, &self.ctx)))
                .collect(),
            body: node.body.as_ref().map(|body| render(body, &self.ctx)),
        };

        let response = match node.mock_mode {
            MockMode::Always => mock_response(node.mock.as_ref(), &self.ctx),
            MockMode::Off => match self.transport.send(&request) {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(node = %node_id, url = %request.url, error = %err, "external call failed; synthesizing response");
                    mock_response(None, &self.ctx)
                }
            },
            MockMode::Fallback => match self.transport.send(&request) {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(node = %node_id, url = %request.url, error = %err, "external call failed; falling back to mock");
                    mock_response(node.mock.as_ref(), &self.ctx)
                }
            },
        };

        if let Some(name) = node.save_as.as_deref() {
            self.ctx.set(
                name,
                json!({
                    "status": response.status,
                    "headers": response.headers.clone(),
                    "data": response.data.clone(),
                }),
            );
        }
        self.apply_mappings(node, &response);
        self.resolve_next(node.next.as_ref())
    }

    fn apply_mappings(&mut self, node: &RestCallNode, response: &HttpResponse) {
        for mapping in &node.mappings {
            let value = match mapping.kind.as_str() {
                "responseStatus" => Value::from(response.status),
                "responseBody" => extract_body(&response.data, mapping.source.as_deref()),
                "responseHeader" => mapping
                    .source
                    .as_deref()
                    .and_then(|name| response.headers.get(name))
                    .map(|value| Value::String(value.clone()))
                    .unwrap_or(Value::Null),
                _ => match mapping.source.as_deref() {
                    Some(source) => expr::evaluate_lenient(source, &self.ctx),
                    None => Value::String(format!("mock_{}", mapping.target)),
                },
            };
            self.ctx.set(&mapping.target, value);
        }
    }
}

/// Build a response from the configured mock (template-rendered) or, when no
/// mock is declared, from synthesized placeholder data.
fn mock_response(mock: Option<&Value>, scope: &dyn Scope) -> HttpResponse {
    let data = match mock {
        Some(value) => render(value, scope),
        None => placeholder_data(),
    };
    HttpResponse {
        status: 200,
        headers: BTreeMap::new(),
        data,
    }
}

/// Synthesized stand-in body with recognizably fake but structurally useful
/// fields.
fn placeholder_data() -> Value {
    let mut rng = rand::rng();
    let items: Vec<Value> = (0..3).map(|_| Value::from(rng.random_range(0..100))).collect();
    json!({
        "id": Uuid::new_v4().to_string(),
        "timestamp": Utc::now().to_rfc3339(),
        "value": rng.random_range(0..1000),
        "items": items,
    })
}

/// Extract a value from the response body by dotted path. Accepts JSONPath-ish
/// `$.` and `response.` prefixes and `[i]` index brackets; an empty path
/// yields the whole body, an unresolvable one yields `Null`.
fn extract_body(data: &Value, source: Option<&str>) -> Value {
    let Some(raw) = source else {
        return data.clone();
    };
    let mut path = raw.trim();
    path = path.strip_prefix('$').unwrap_or(path);
    path = path.trim_start_matches('.');
    path = path.strip_prefix("response.").unwrap_or(path);
    if path.is_empty() {
        return data.clone();
    }

    let normalized = path.replace('[', ".").replace(']', "");
    let mut current = data;
    for segment in normalized.split('.').filter(|segment| !segment.is_empty()) {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(value) => value,
                None => return Value::Null,
            },
            Value::Array(items) => match segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
            {
                Some(value) => value,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}
