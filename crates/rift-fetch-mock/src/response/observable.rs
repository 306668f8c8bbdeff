//! The response handed back to callers of `fetch`.
//!
//! Wraps a [`MockResponse`] so the reported url reflects any redirect, and so
//! every body read is registered with the call history for `flush` and kept
//! for later inspection.

use super::builder::MockResponse;
use crate::call_history::{CallHistory, HoldingKind};
use crate::error::FetchMockError;
use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use http_body_util::Full;
use hyper::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Outcome of one body read, shared between the caller and the history.
pub type BodyReadFuture = Shared<BoxFuture<'static, Result<BodyValue, FetchMockError>>>;

/// Which reader method consumed the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyReadKind {
    Text,
    Json,
    Bytes,
}

/// A decoded body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyValue {
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
}

impl BodyValue {
    pub fn into_text(self) -> String {
        match self {
            BodyValue::Text(text) => text,
            BodyValue::Json(value) => value.to_string(),
            BodyValue::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub fn into_json(self) -> Result<serde_json::Value, FetchMockError> {
        match self {
            BodyValue::Json(value) => Ok(value),
            BodyValue::Text(text) => Ok(serde_json::from_str(&text)?),
            BodyValue::Bytes(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            BodyValue::Bytes(bytes) => bytes,
            BodyValue::Text(text) => Bytes::from(text),
            BodyValue::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

/// A recorded body read.
#[derive(Clone)]
pub struct BodyRead {
    kind: BodyReadKind,
    result: BodyReadFuture,
}

impl BodyRead {
    pub fn kind(&self) -> BodyReadKind {
        self.kind
    }

    /// The read's outcome, once it has settled.
    pub fn result(&self) -> Option<Result<BodyValue, FetchMockError>> {
        self.result.peek().cloned()
    }
}

impl fmt::Debug for BodyRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyRead")
            .field("kind", &self.kind)
            .field("settled", &self.result.peek().is_some())
            .finish()
    }
}

/// Response returned by the mock. Clones share body state.
#[derive(Clone)]
pub struct ObservedResponse {
    inner: MockResponse,
    url: String,
    redirected: bool,
    body_used: Arc<AtomicBool>,
    reads: Arc<Mutex<Vec<BodyRead>>>,
    history: Weak<CallHistory>,
}

impl ObservedResponse {
    pub(crate) fn new(
        inner: MockResponse,
        redirect_url: Option<String>,
        request_url: &str,
        history: Weak<CallHistory>,
    ) -> Self {
        let (url, redirected) = match redirect_url {
            Some(redirect) => (redirect, true),
            None => (request_url.to_string(), false),
        };
        ObservedResponse {
            inner,
            url,
            redirected,
            body_used: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(Mutex::new(Vec::new())),
            history,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn ok(&self) -> bool {
        self.inner.ok()
    }

    pub fn status_text(&self) -> &'static str {
        self.inner.status_text()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// The redirect url when the route redirected, otherwise the request url.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn redirected(&self) -> bool {
        self.redirected
    }

    pub fn body_used(&self) -> bool {
        self.body_used.load(Ordering::SeqCst)
    }

    /// The wrapped response, without consuming the body.
    pub fn inner(&self) -> &MockResponse {
        &self.inner
    }

    pub fn into_http(self) -> hyper::Response<Full<Bytes>> {
        self.inner.into_http()
    }

    /// Every body read made on this response, in order.
    pub fn body_reads(&self) -> Vec<BodyRead> {
        self.reads.lock().clone()
    }

    pub fn text(&self) -> impl Future<Output = Result<String, FetchMockError>> + Send + 'static {
        self.read_body(BodyReadKind::Text)
            .map(|result| result.map(BodyValue::into_text))
    }

    pub fn json<T>(&self) -> impl Future<Output = Result<T, FetchMockError>> + Send + 'static
    where
        T: DeserializeOwned + 'static,
    {
        self.read_body(BodyReadKind::Json).map(|result| -> Result<T, FetchMockError> {
            let value = result?.into_json()?;
            Ok(serde_json::from_value(value)?)
        })
    }

    pub fn bytes(&self) -> impl Future<Output = Result<Bytes, FetchMockError>> + Send + 'static {
        self.read_body(BodyReadKind::Bytes)
            .map(|result| result.map(BodyValue::into_bytes))
    }

    /// Start a body read and register it before returning.
    fn read_body(&self, kind: BodyReadKind) -> BodyReadFuture {
        let read: BodyReadFuture = if self.body_used.swap(true, Ordering::SeqCst) {
            future::ready(Err(FetchMockError::BodyUsed)).boxed().shared()
        } else {
            decode_body(self.inner.body().clone(), kind).boxed().shared()
        };

        if let Some(history) = self.history.upgrade() {
            // The history only waits on the read; the caller still sees failures.
            history.add_holding_promise(
                HoldingKind::BodyRead,
                read.clone().map(|_| ()).boxed().shared(),
            );
        }
        self.reads.lock().push(BodyRead {
            kind,
            result: read.clone(),
        });
        read
    }
}

async fn decode_body(bytes: Bytes, kind: BodyReadKind) -> Result<BodyValue, FetchMockError> {
    match kind {
        BodyReadKind::Text => Ok(BodyValue::Text(String::from_utf8_lossy(&bytes).into_owned())),
        BodyReadKind::Json => Ok(BodyValue::Json(serde_json::from_slice(&bytes)?)),
        BodyReadKind::Bytes => Ok(BodyValue::Bytes(bytes)),
    }
}

impl fmt::Debug for ObservedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedResponse")
            .field("status", &self.inner.status())
            .field("url", &self.url)
            .field("redirected", &self.redirected)
            .field("body_used", &self.body_used())
            .finish()
    }
}
