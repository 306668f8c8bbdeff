//! In-process fetch mocking.
//!
//! Register routes that pair request matchers with response specifications,
//! intercept fetches against them, then inspect the recorded calls. Every
//! pending response and body read is tracked so a test can `flush` until all
//! in-flight work has settled.
//!
//! ```no_run
//! use rift_fetch_mock::FetchMock;
//!
//! # async fn demo() -> Result<(), rift_fetch_mock::FetchMockError> {
//! let fm = FetchMock::new();
//! fm.route("begin:http://api.example.com/users", r#"{"id": 1}"#)?
//!     .catch(404u16)?;
//!
//! let response = fm.fetch("http://api.example.com/users/1", None).await?;
//! assert_eq!(response.status().as_u16(), 200);
//! assert!(fm.called("begin:http://api.example.com"));
//! # Ok(())
//! # }
//! ```

// ===== Request side =====
pub mod matcher;
pub mod request;

// ===== Routes and dispatch =====
pub mod config;
pub mod route;
pub mod router;

// ===== Responses and history =====
pub mod call_history;
pub mod response;

pub mod error;
pub mod fetch_mock;

pub use call_history::{CallFilter, CallHistory, CallLog, CallScope};
pub use config::{FetchMockConfig, RouteConfig, UserRouteConfig};
pub use error::{FetchMockError, ThrownError};
pub use fetch_mock::{FetchFuture, FetchMock};
pub use matcher::{define_matcher, matcher_fn, MatcherDefinition, MatcherFn, UrlMatcher};
pub use request::{request_body, FetchInput, FetchRequest, NormalizedRequest, RequestOptions};
pub use response::{MockResponse, ObservedResponse, ResponseBody, ResponseConfig, RouteResponse};
pub use route::Route;
pub use router::{NameOrOptions, RemoveRoutes, RouteMatcher};
