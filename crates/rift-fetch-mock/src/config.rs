//! Global defaults and per-route configuration.
//!
//! [`FetchMockConfig`] holds the instance-wide defaults and can be loaded from
//! JSON or YAML. [`UserRouteConfig`] is the sparse, user-facing route builder;
//! [`RouteConfig`] is the fully resolved form a route is constructed from.

use crate::error::FetchMockError;
use crate::matcher::{matcher_fn, MatcherFn, UrlMatcher};
use crate::request::NormalizedRequest;
use crate::response::RouteResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Instance-wide defaults merged into every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchMockConfig {
    /// Add `content-type: application/json` to JSON bodies. JSON bodies are
    /// serialized either way, since a response body is always bytes.
    pub send_as_json: bool,
    /// Add a `content-length` header to constructed responses.
    pub include_content_length: bool,
    /// Body matchers accept requests whose body contains the expected JSON.
    pub match_partial_body: bool,
    /// Log a warning whenever the fallback route handles a call.
    pub warn_on_fallback: bool,
}

impl Default for FetchMockConfig {
    fn default() -> Self {
        Self {
            send_as_json: true,
            include_content_length: true,
            match_partial_body: false,
            warn_on_fallback: true,
        }
    }
}

impl FetchMockConfig {
    pub fn from_json(text: &str) -> Result<Self, FetchMockError> {
        serde_json::from_str(text).map_err(|e| FetchMockError::Config(e.to_string()))
    }

    pub fn from_yaml(text: &str) -> Result<Self, FetchMockError> {
        serde_yaml::from_str(text).map_err(|e| FetchMockError::Config(e.to_string()))
    }
}

/// Sparse route options. Unset fields fall back to earlier sources and
/// finally to the [`FetchMockConfig`] defaults.
#[derive(Clone, Default)]
pub struct UserRouteConfig {
    pub name: Option<String>,
    pub url: Option<UrlMatcher>,
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub query: Option<HashMap<String, String>>,
    pub params: Option<HashMap<String, String>>,
    pub body: Option<serde_json::Value>,
    pub matcher_function: Option<MatcherFn>,
    pub response: Option<RouteResponse>,
    pub repeat: Option<usize>,
    pub delay: Option<u64>,
    pub sticky: Option<bool>,
    pub send_as_json: Option<bool>,
    pub include_content_length: Option<bool>,
    pub match_partial_body: Option<bool>,
    /// Options for custom matcher kinds, keyed by kind name.
    pub extra: HashMap<String, serde_json::Value>,
}

impl UserRouteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn url(mut self, url: impl Into<UrlMatcher>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn matcher_function<F>(mut self, f: F) -> Self
    where
        F: Fn(&NormalizedRequest) -> bool + Send + Sync + 'static,
    {
        self.matcher_function = Some(matcher_fn(f));
        self
    }

    pub fn response(mut self, response: impl Into<RouteResponse>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn repeat(mut self, repeat: usize) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn delay(mut self, delay_ms: u64) -> Self {
        self.delay = Some(delay_ms);
        self
    }

    pub fn sticky(mut self, sticky: bool) -> Self {
        self.sticky = Some(sticky);
        self
    }

    pub fn send_as_json(mut self, send_as_json: bool) -> Self {
        self.send_as_json = Some(send_as_json);
        self
    }

    pub fn include_content_length(mut self, include: bool) -> Self {
        self.include_content_length = Some(include);
        self
    }

    pub fn match_partial_body(mut self, partial: bool) -> Self {
        self.match_partial_body = Some(partial);
        self
    }

    /// Set an option for a custom matcher kind.
    pub fn option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Overlay `other` on top of `self`: every field set in `other` wins.
    pub fn merge(mut self, other: UserRouteConfig) -> Self {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        overlay!(
            name,
            url,
            method,
            headers,
            query,
            params,
            body,
            matcher_function,
            response,
            repeat,
            delay,
            sticky,
            send_as_json,
            include_content_length,
            match_partial_body
        );
        self.extra.extend(other.extra);
        self
    }

    /// Fill unset behaviour flags from the instance defaults.
    pub fn resolve(self, defaults: &FetchMockConfig) -> RouteConfig {
        RouteConfig {
            name: self.name,
            url: self.url,
            method: self.method,
            headers: self.headers.unwrap_or_default(),
            query: self.query.unwrap_or_default(),
            params: self.params.unwrap_or_default(),
            body: self.body,
            matcher_function: self.matcher_function,
            response: self.response,
            repeat: self.repeat,
            delay: self.delay,
            sticky: self.sticky.unwrap_or(false),
            send_as_json: self.send_as_json.unwrap_or(defaults.send_as_json),
            include_content_length: self
                .include_content_length
                .unwrap_or(defaults.include_content_length),
            match_partial_body: self
                .match_partial_body
                .unwrap_or(defaults.match_partial_body),
            is_fallback: false,
            extra: self.extra,
        }
    }
}

impl fmt::Debug for UserRouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRouteConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("repeat", &self.repeat)
            .field("sticky", &self.sticky)
            .finish_non_exhaustive()
    }
}

/// Fully resolved route configuration. Immutable once a route is built.
#[derive(Clone)]
pub struct RouteConfig {
    pub name: Option<String>,
    pub url: Option<UrlMatcher>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub matcher_function: Option<MatcherFn>,
    pub response: Option<RouteResponse>,
    pub repeat: Option<usize>,
    pub delay: Option<u64>,
    pub sticky: bool,
    pub send_as_json: bool,
    pub include_content_length: bool,
    pub match_partial_body: bool,
    pub is_fallback: bool,
    pub extra: HashMap<String, serde_json::Value>,
}

impl fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("matcher_function", &self.matcher_function.is_some())
            .field("response", &self.response)
            .field("repeat", &self.repeat)
            .field("delay", &self.delay)
            .field("sticky", &self.sticky)
            .field("is_fallback", &self.is_fallback)
            .finish_non_exhaustive()
    }
}
