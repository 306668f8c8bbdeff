//! Request normalization.
//!
//! Every intercepted fetch is reduced to a [`NormalizedRequest`]: the
//! normalized url, the merged request options and, when the caller passed a
//! request object, its head. The request body is only collected when some
//! registered route inspects bodies.

use crate::error::{BoxError, FetchMockError};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Uri};
use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;

/// Body type accepted on request-like fetch inputs.
pub type RequestBody = BoxBody<Bytes, BoxError>;

/// A request-like fetch input.
pub type FetchRequest = hyper::Request<RequestBody>;

/// Wrap in-memory bytes as a [`RequestBody`].
pub fn request_body(body: impl Into<Bytes>) -> RequestBody {
    Full::new(body.into())
        .map_err(|never: Infallible| -> BoxError { match never {} })
        .boxed()
}

/// First argument of `fetch`: a url or a request object.
pub enum FetchInput {
    Url(String),
    Request(FetchRequest),
}

impl From<&str> for FetchInput {
    fn from(url: &str) -> Self {
        FetchInput::Url(url.to_string())
    }
}

impl From<String> for FetchInput {
    fn from(url: String) -> Self {
        FetchInput::Url(url)
    }
}

impl From<&String> for FetchInput {
    fn from(url: &String) -> Self {
        FetchInput::Url(url.clone())
    }
}

impl From<FetchRequest> for FetchInput {
    fn from(request: FetchRequest) -> Self {
        FetchInput::Request(request)
    }
}

/// Second argument of `fetch`: method, headers and body.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header; invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and mark it as JSON.
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    /// Fill in anything not set here from `other`.
    fn or(mut self, other: RequestOptions) -> Self {
        if self.method.is_none() {
            self.method = other.method;
        }
        for (name, value) in other.headers.iter() {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
        if self.body.is_none() {
            self.body = other.body;
        }
        self
    }
}

/// Head of a request-like fetch input, kept for response functions.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// Canonical read-only view of one fetch invocation.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub url: String,
    pub options: RequestOptions,
    pub request: Option<RequestHead>,
}

impl NormalizedRequest {
    /// Normalize a plain url call.
    pub fn from_url(url: &str, options: Option<RequestOptions>) -> Self {
        Self {
            url: normalize_url(url),
            options: options.unwrap_or_default(),
            request: None,
        }
    }

    /// Normalize a request object. `body` is the collected body, when read.
    pub fn from_request(
        head: RequestHead,
        body: Option<Bytes>,
        options: Option<RequestOptions>,
    ) -> Self {
        let derived = RequestOptions {
            method: Some(head.method.as_str().to_string()),
            headers: head.headers.clone(),
            body,
        };
        let options = match options {
            Some(explicit) => explicit.or(derived),
            None => derived,
        };
        Self {
            url: normalize_url(&head.uri.to_string()),
            options,
            request: Some(head),
        }
    }

    /// Upper-cased method, `GET` when unspecified.
    pub fn method(&self) -> String {
        self.options
            .method
            .as_deref()
            .unwrap_or("GET")
            .to_uppercase()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.options
            .headers
            .get(name.to_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.options.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.options.body.as_ref()
    }

    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.options.body.as_ref().map(|b| String::from_utf8_lossy(b))
    }

    /// Path component of the url, without origin, query or fragment.
    pub fn path(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => strip_query(&self.url).to_string(),
        }
    }

    /// Decoded query parameters.
    pub fn query(&self) -> HashMap<String, String> {
        let query = strip_fragment(&self.url)
            .split_once('?')
            .map(|(_, query)| query);
        parse_query_string(query)
    }
}

/// Absolute urls are canonicalized (`http://a.com` becomes `http://a.com/`);
/// relative urls are kept as given.
pub fn normalize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.to_string(),
    }
}

/// Parse query string into a HashMap.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.insert(
                    urlencoding::decode(key).unwrap_or_default().to_string(),
                    urlencoding::decode(&value.replace('+', " "))
                        .unwrap_or_default()
                        .to_string(),
                );
            } else if !pair.is_empty() {
                params.insert(pair.to_string(), String::new());
            }
        }
    }
    params
}

fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map(|(head, _)| head).unwrap_or(url)
}

fn strip_query(url: &str) -> &str {
    let url = strip_fragment(url);
    url.split_once('?').map(|(head, _)| head).unwrap_or(url)
}

/// Split a request object, collecting its body only when `read_body` is set.
pub(crate) async fn read_request(
    request: FetchRequest,
    read_body: bool,
) -> Result<(RequestHead, Option<Bytes>), FetchMockError> {
    let (parts, body) = request.into_parts();
    let head = RequestHead {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
    };
    if !read_body {
        return Ok((head, None));
    }
    let collected = body
        .collect()
        .await
        .map_err(|e| FetchMockError::RequestBody(e.to_string()))?;
    Ok((head, Some(collected.to_bytes())))
}

/// Split a request object without touching its body.
pub(crate) fn request_head(request: FetchRequest) -> RequestHead {
    let (parts, _body) = request.into_parts();
    RequestHead {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
    }
}
