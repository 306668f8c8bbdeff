//! Error types for route registration, dispatch and response handling.

use std::fmt;
use std::sync::Arc;

/// Boxed error used for request bodies and user-supplied thrown values.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types surfaced by the fetch mock.
///
/// Every variant is cheap to clone so a single outcome can be delivered to
/// both the caller of `fetch` and the call history.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchMockError {
    #[error("fetch-mock: Adding route with same name as existing route: {0}")]
    DuplicateRouteName(String),
    #[error("fetch-mock: Invalid matcher: {0}")]
    InvalidMatcher(String),
    #[error("fetch-mock: Route {0} has no response")]
    MissingResponse(String),
    #[error("fetch-mock: No response or fallback rule to cover {method} to {url}")]
    NoMatch { method: String, url: String },
    #[error("{0}")]
    Thrown(ThrownError),
    #[error("fetch-mock: Invalid response: {0}")]
    InvalidResponse(String),
    #[error("fetch-mock: Body has already been consumed")]
    BodyUsed,
    #[error("fetch-mock: Invalid json in response body: {0}")]
    InvalidJson(Arc<serde_json::Error>),
    #[error("fetch-mock: Failed to read request body: {0}")]
    RequestBody(String),
    #[error("fetch-mock: Response task failed: {0}")]
    ResponseTask(String),
    #[error("fetch-mock: Invalid configuration: {0}")]
    Config(String),
}

impl FetchMockError {
    /// Errors raised synchronously while registering routes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            FetchMockError::DuplicateRouteName(_)
                | FetchMockError::InvalidMatcher(_)
                | FetchMockError::MissingResponse(_)
                | FetchMockError::Config(_)
        )
    }

    /// The user-supplied error when the route was configured to throw.
    pub fn thrown(&self) -> Option<&ThrownError> {
        match self {
            FetchMockError::Thrown(thrown) => Some(thrown),
            _ => None,
        }
    }
}

impl From<regex::Error> for FetchMockError {
    fn from(e: regex::Error) -> Self {
        FetchMockError::InvalidMatcher(e.to_string())
    }
}

impl From<serde_json::Error> for FetchMockError {
    fn from(e: serde_json::Error) -> Self {
        FetchMockError::InvalidJson(Arc::new(e))
    }
}

/// A value a route rejects with instead of producing a response.
///
/// Identity is preserved: the caller of `fetch` receives the same allocation
/// that was placed in the route's response config.
#[derive(Clone)]
pub struct ThrownError(Arc<dyn std::error::Error + Send + Sync>);

impl ThrownError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Wrap a plain message, as thrown by `{ "throws": "Problem in space" }`.
    pub fn message(message: impl Into<String>) -> Self {
        Self(Arc::new(ThrownMessage(message.into())))
    }

    pub fn from_arc(error: Arc<dyn std::error::Error + Send + Sync>) -> Self {
        Self(error)
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }

    /// Whether both handles point at the same thrown value.
    pub fn ptr_eq(&self, other: &ThrownError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<BoxError> for ThrownError {
    fn from(error: BoxError) -> Self {
        Self(Arc::from(error))
    }
}

impl fmt::Debug for ThrownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThrownError").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for ThrownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
struct ThrownMessage(String);

impl fmt::Display for ThrownMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ThrownMessage {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_message_names_method_and_url() {
        let err = FetchMockError::NoMatch {
            method: "POST".to_string(),
            url: "http://a.com/".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "fetch-mock: No response or fallback rule to cover POST to http://a.com/"
        );
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_thrown_identity_survives_clone() {
        let thrown = ThrownError::message("boom");
        let err = FetchMockError::Thrown(thrown.clone());
        let cloned = err.clone();
        assert!(cloned.thrown().unwrap().ptr_eq(&thrown));
        assert_eq!(cloned.to_string(), "boom");
    }

    #[test]
    fn test_configuration_errors() {
        assert!(FetchMockError::DuplicateRouteName("a".into()).is_configuration_error());
        assert!(FetchMockError::InvalidMatcher("bad".into()).is_configuration_error());
        assert!(FetchMockError::MissingResponse("r".into()).is_configuration_error());
        assert!(!FetchMockError::BodyUsed.is_configuration_error());
    }
}
