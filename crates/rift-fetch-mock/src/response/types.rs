//! Response specifications and their normalized config form.

use super::builder::MockResponse;
use crate::error::{FetchMockError, ThrownError};
use crate::request::NormalizedRequest;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Keys that mark a JSON object as a response config rather than a body.
pub const RESERVED_KEYS: [&str; 5] = ["body", "headers", "throws", "status", "redirectUrl"];

/// Response function, invoked with the normalized request on every call.
pub type ResponseFn = Arc<dyn Fn(&NormalizedRequest) -> RouteResponse + Send + Sync>;

/// Deferred response value; may resolve to any other variant.
pub type PendingResponse = Shared<BoxFuture<'static, RouteResponse>>;

/// What a route responds with.
///
/// Functions and pending values are unwrapped repeatedly at call time, so they
/// may nest to any depth.
#[derive(Clone)]
pub enum RouteResponse {
    /// A bare status code.
    Status(u16),
    /// A text body.
    Text(String),
    /// A JSON value: a config object when it only uses reserved keys,
    /// otherwise a body.
    Json(Value),
    /// An explicit response config.
    Config(ResponseConfig),
    /// A complete response, returned as is.
    Response(MockResponse),
    Function(ResponseFn),
    Pending(PendingResponse),
}

impl RouteResponse {
    /// Respond with whatever `f` returns for the request.
    pub fn from_fn<F, R>(f: F) -> Self
    where
        F: Fn(&NormalizedRequest) -> R + Send + Sync + 'static,
        R: Into<RouteResponse>,
    {
        RouteResponse::Function(Arc::new(move |req: &NormalizedRequest| f(req).into()))
    }

    /// Respond with the output of the future `f` returns for the request.
    pub fn from_async<F, Fut, R>(f: F) -> Self
    where
        F: Fn(&NormalizedRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<RouteResponse> + 'static,
    {
        RouteResponse::Function(Arc::new(move |req: &NormalizedRequest| {
            RouteResponse::later(f(req))
        }))
    }

    /// Respond with the output of `future`. The future is polled at most
    /// once; every call sharing this response sees the same value.
    pub fn later<Fut, R>(future: Fut) -> Self
    where
        Fut: Future<Output = R> + Send + 'static,
        R: Into<RouteResponse> + 'static,
    {
        RouteResponse::Pending(future.map(Into::into).boxed().shared())
    }
}

impl fmt::Debug for RouteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteResponse::Status(status) => f.debug_tuple("Status").field(status).finish(),
            RouteResponse::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RouteResponse::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RouteResponse::Config(config) => f.debug_tuple("Config").field(config).finish(),
            RouteResponse::Response(response) => {
                f.debug_tuple("Response").field(response).finish()
            }
            RouteResponse::Function(_) => f.write_str("Function(..)"),
            RouteResponse::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl From<u16> for RouteResponse {
    fn from(status: u16) -> Self {
        RouteResponse::Status(status)
    }
}

impl From<&str> for RouteResponse {
    fn from(text: &str) -> Self {
        RouteResponse::Text(text.to_string())
    }
}

impl From<String> for RouteResponse {
    fn from(text: String) -> Self {
        RouteResponse::Text(text)
    }
}

impl From<Value> for RouteResponse {
    fn from(value: Value) -> Self {
        RouteResponse::Json(value)
    }
}

impl From<ResponseConfig> for RouteResponse {
    fn from(config: ResponseConfig) -> Self {
        RouteResponse::Config(config)
    }
}

impl From<MockResponse> for RouteResponse {
    fn from(response: MockResponse) -> Self {
        RouteResponse::Response(response)
    }
}

/// Body of a response config.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Text(String),
    Bytes(Bytes),
    /// Serialized on construction.
    Json(Value),
}

/// Normalized description of a concrete response.
#[derive(Debug, Clone, Default)]
pub struct ResponseConfig {
    pub status: Option<u16>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<ResponseBody>,
    pub redirect_url: Option<String>,
    /// Reject the call with this error instead of responding.
    pub throws: Option<ThrownError>,
}

impl ResponseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(ResponseBody::Text(body.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(ResponseBody::Json(body));
        self
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(ResponseBody::Bytes(body.into()));
        self
    }

    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn throws(mut self, error: ThrownError) -> Self {
        self.throws = Some(error);
        self
    }

    /// Classify a terminal JSON value.
    ///
    /// Numbers are statuses and strings are text bodies. An object is a
    /// config when at least one reserved key is truthy and every key is
    /// reserved; anything else is a JSON body.
    pub fn from_json(value: Value) -> Result<Self, FetchMockError> {
        match value {
            Value::Number(number) => {
                let status = number
                    .as_u64()
                    .and_then(|n| u16::try_from(n).ok())
                    .ok_or_else(|| {
                        FetchMockError::InvalidResponse(format!("invalid status {number}"))
                    })?;
                Ok(Self::new().status(status))
            }
            Value::String(text) => Ok(Self::new().text(text)),
            Value::Object(map) if is_config_object(&map) => Self::from_reserved(map),
            other => Ok(Self::new().json(other)),
        }
    }

    fn from_reserved(map: Map<String, Value>) -> Result<Self, FetchMockError> {
        let mut config = Self::new();
        for (key, value) in map {
            match key.as_str() {
                "status" if is_truthy(&value) => {
                    let status = value
                        .as_u64()
                        .and_then(|n| u16::try_from(n).ok())
                        .ok_or_else(|| {
                            FetchMockError::InvalidResponse(format!(
                                "invalid status {value} passed on response object; \
                                 to respond with JSON that has status as a property, \
                                 assign the object to body"
                            ))
                        })?;
                    config.status = Some(status);
                }
                "headers" => {
                    if let Value::Object(headers) = value {
                        config.headers = Some(
                            headers
                                .into_iter()
                                .map(|(name, value)| (name, json_to_header_value(value)))
                                .collect(),
                        );
                    }
                }
                "body" => {
                    config.body = match value {
                        Value::Null => None,
                        Value::String(text) => Some(ResponseBody::Text(text)),
                        other => Some(ResponseBody::Json(other)),
                    };
                }
                "redirectUrl" => {
                    if let Value::String(url) = value {
                        config.redirect_url = Some(url);
                    }
                }
                "throws" if is_truthy(&value) => {
                    config.throws = Some(match value {
                        Value::String(message) => ThrownError::message(message),
                        other => ThrownError::message(other.to_string()),
                    });
                }
                _ => {}
            }
        }
        Ok(config)
    }
}

fn is_config_object(map: &Map<String, Value>) -> bool {
    let uses_reserved = RESERVED_KEYS
        .iter()
        .any(|key| map.get(*key).is_some_and(is_truthy));
    uses_reserved && map.keys().all(|key| RESERVED_KEYS.contains(&key.as_str()))
}

/// `null`, `false`, `0` and `""` are falsy; everything else is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn json_to_header_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
