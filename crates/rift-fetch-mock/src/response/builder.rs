use super::types::{ResponseBody, ResponseConfig};
use crate::error::FetchMockError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use std::str::FromStr;

/// A complete, in-memory response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl MockResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        MockResponse {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_http(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl From<Response<Bytes>> for MockResponse {
    fn from(response: Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        MockResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}

/// Builds a [`MockResponse`] from a response config and the route's flags.
pub struct ResponseBuilder {
    status: Option<u16>,
    body: Option<ResponseBody>,
    headers: HeaderMap,
    send_as_json: bool,
    include_content_length: bool,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        ResponseBuilder {
            status: None,
            body: None,
            headers: Default::default(),
            send_as_json: true,
            include_content_length: true,
        }
    }

    /// Start from a config's status, headers and body.
    pub fn from_config(config: &ResponseConfig) -> Self {
        let mut builder = Self::new();
        builder.status = config.status;
        builder.body = config.body.clone();
        if let Some(headers) = &config.headers {
            builder = builder.merge_headers(headers);
        }
        builder
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                self
            }
            _ => self,
        }
    }

    pub fn merge_headers<H, K, V>(mut self, headers: H) -> Self
    where
        H: IntoIterator<Item = (K, V)>,
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
    {
        for (key, value) in headers {
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(key), HeaderValue::try_from(value))
            {
                self.headers.insert(name, value);
            }
        }
        self
    }

    pub fn send_as_json(mut self, send_as_json: bool) -> Self {
        self.send_as_json = send_as_json;
        self
    }

    pub fn include_content_length(mut self, include: bool) -> Self {
        self.include_content_length = include;
        self
    }

    pub fn build(self) -> Result<MockResponse, FetchMockError> {
        let status = self.status.unwrap_or(200);
        if !(200..=599).contains(&status) {
            return Err(FetchMockError::InvalidResponse(format!(
                "invalid status {status}, must be between 200 and 599"
            )));
        }
        let status = StatusCode::from_u16(status)
            .map_err(|e| FetchMockError::InvalidResponse(e.to_string()))?;

        let mut headers = self.headers;
        let payload = match self.body {
            None => Bytes::new(),
            Some(ResponseBody::Text(text)) => Bytes::from(text),
            Some(ResponseBody::Bytes(bytes)) => bytes,
            Some(ResponseBody::Json(value)) => {
                if self.send_as_json && !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Bytes::from(serde_json::to_vec(&value)?)
            }
        };

        if self.include_content_length && !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(payload.len()));
        }

        Ok(MockResponse {
            status,
            headers,
            body: payload,
        })
    }
}
