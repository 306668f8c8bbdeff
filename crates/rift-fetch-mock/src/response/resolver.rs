//! Response resolution: unwrap functions and pending values until a terminal
//! value remains, then turn it into a response or a rejection.

use super::builder::{MockResponse, ResponseBuilder};
use super::types::{ResponseConfig, RouteResponse};
use crate::error::FetchMockError;
use crate::request::NormalizedRequest;
use tracing::trace;

/// What a response spec settles to.
#[derive(Debug, Clone)]
pub enum Terminal {
    /// A pre-built response, used verbatim.
    Response(MockResponse),
    Config(ResponseConfig),
}

/// Unwrap `response` until it is neither a function nor pending.
///
/// Functions and pending values may appear at any depth and in any order.
pub async fn resolve(
    mut response: RouteResponse,
    request: &NormalizedRequest,
) -> Result<Terminal, FetchMockError> {
    let mut depth = 0usize;
    loop {
        response = match response {
            RouteResponse::Function(f) => f(request),
            RouteResponse::Pending(pending) => pending.await,
            RouteResponse::Response(response) => return Ok(Terminal::Response(response)),
            RouteResponse::Config(config) => return Ok(Terminal::Config(config)),
            RouteResponse::Status(status) => {
                return Ok(Terminal::Config(ResponseConfig::new().status(status)))
            }
            RouteResponse::Text(text) => {
                return Ok(Terminal::Config(ResponseConfig::new().text(text)))
            }
            RouteResponse::Json(value) => {
                return ResponseConfig::from_json(value).map(Terminal::Config)
            }
        };
        depth += 1;
        trace!("Unwrapped response spec (depth {})", depth);
    }
}

/// Flags that shape response construction.
#[derive(Debug, Clone, Copy)]
pub struct ConstructOptions {
    pub send_as_json: bool,
    pub include_content_length: bool,
}

/// A constructed response and the url it reports.
#[derive(Debug, Clone)]
pub struct Constructed {
    pub response: MockResponse,
    pub redirect_url: Option<String>,
}

/// Build the response for a terminal value, or reject with its `throws`.
pub fn construct(
    terminal: Terminal,
    options: ConstructOptions,
) -> Result<Constructed, FetchMockError> {
    let config = match terminal {
        Terminal::Response(response) => {
            return Ok(Constructed {
                response,
                redirect_url: None,
            })
        }
        Terminal::Config(config) => config,
    };

    if let Some(thrown) = config.throws {
        return Err(FetchMockError::Thrown(thrown));
    }

    let response = ResponseBuilder::from_config(&config)
        .send_as_json(options.send_as_json)
        .include_content_length(options.include_content_length)
        .build()?;

    Ok(Constructed {
        response,
        redirect_url: config.redirect_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrownError;
    use crate::response::ResponseBody;
    use serde_json::json;

    fn request() -> NormalizedRequest {
        NormalizedRequest::from_url("http://a.com/users/1", None)
    }

    fn options() -> ConstructOptions {
        ConstructOptions {
            send_as_json: true,
            include_content_length: true,
        }
    }

    async fn resolve_config(response: RouteResponse) -> ResponseConfig {
        match resolve(response, &request()).await.unwrap() {
            Terminal::Config(config) => config,
            Terminal::Response(_) => panic!("expected a config"),
        }
    }

    #[tokio::test]
    async fn test_nested_function_and_pending_terminate() {
        // fn -> pending -> fn -> 200
        let response = RouteResponse::from_fn(|_| {
            RouteResponse::later(async { RouteResponse::from_fn(|_| 200u16) })
        });
        let config = resolve_config(response).await;
        assert_eq!(config.status, Some(200));
    }

    #[tokio::test]
    async fn test_function_sees_request() {
        let response = RouteResponse::from_fn(|req: &NormalizedRequest| req.path());
        let config = resolve_config(response).await;
        assert_eq!(config.body, Some(ResponseBody::Text("/users/1".into())));
    }

    #[tokio::test]
    async fn test_async_function() {
        let response = RouteResponse::from_async(|req: &NormalizedRequest| {
            let method = req.method();
            async move { json!({ "method": method }) }
        });
        let config = resolve_config(response).await;
        assert_eq!(config.body, Some(ResponseBody::Json(json!({"method": "GET"}))));
    }

    #[tokio::test]
    async fn test_object_body_vs_config() {
        let body = resolve_config(json!({"a": 1}).into()).await;
        assert_eq!(body.body, Some(ResponseBody::Json(json!({"a": 1}))));

        let config = resolve_config(json!({"status": 201, "headers": {}}).into()).await;
        assert_eq!(config.status, Some(201));
        assert!(config.body.is_none());
    }

    #[tokio::test]
    async fn test_prebuilt_response_is_verbatim() {
        let prebuilt = MockResponse::builder().status(418).build().unwrap();
        let terminal = resolve(prebuilt.into(), &request()).await.unwrap();
        assert!(matches!(terminal, Terminal::Response(_)));

        let constructed = construct(terminal, options()).unwrap();
        assert_eq!(constructed.response.status().as_u16(), 418);
        assert!(constructed.redirect_url.is_none());
    }

    #[tokio::test]
    async fn test_throws_rejects_with_same_instance() {
        let thrown = ThrownError::message("x");
        let response = RouteResponse::from(ResponseConfig::new().throws(thrown.clone()));
        let terminal = resolve(response, &request()).await.unwrap();
        let err = construct(terminal, options()).unwrap_err();
        assert!(err.thrown().unwrap().ptr_eq(&thrown));
    }

    #[tokio::test]
    async fn test_redirect_url_is_reported() {
        let response = RouteResponse::from(json!({"redirectUrl": "http://b.com/", "body": "moved"}));
        let terminal = resolve(response, &request()).await.unwrap();
        let constructed = construct(terminal, options()).unwrap();
        assert_eq!(constructed.redirect_url.as_deref(), Some("http://b.com/"));
        assert_eq!(constructed.response.body().as_ref(), b"moved");
    }

    #[tokio::test]
    async fn test_pending_is_shared_between_calls() {
        let response = RouteResponse::later(async { 204u16 });
        let first = resolve_config(response.clone()).await;
        let second = resolve_config(response).await;
        assert_eq!(first.status, Some(204));
        assert_eq!(second.status, Some(204));
    }
}
