//! Matcher compiler: turns a route specification into one predicate.
//!
//! Each registered matcher kind (url, method, headers, query, params, body,
//! function, plus any user-defined kinds) contributes a predicate when its
//! option is set on the route; the compiled matcher is their conjunction.
//!
//! # Module Structure
//!
//! - `url_matcher` - Url strategies (exact, begin, end, include, path, glob, express, regex)
//! - `path_params` - Express templates and path-parameter extraction
//! - `field_matcher` - Header and query subset matching
//! - `body_matcher` - Structural JSON body matching
//! - `registry` - Process-wide matcher kind registry

mod body_matcher;
mod field_matcher;
mod path_params;
mod registry;
mod url_matcher;

use crate::config::RouteConfig;
use crate::error::FetchMockError;
use crate::request::NormalizedRequest;
use std::sync::Arc;

pub use body_matcher::CompiledBodyMatcher;
pub use field_matcher::{CompiledHeaderMatcher, CompiledQueryMatcher};
pub use path_params::ExpressTemplate;
pub use registry::{define_matcher, registered_matchers, MatcherBuilder, MatcherDefinition};
pub use url_matcher::{CompiledUrlMatcher, UrlMatcher};

/// Predicate over a normalized request.
pub type MatcherFn = Arc<dyn Fn(&NormalizedRequest) -> bool + Send + Sync>;

/// Box a closure as a [`MatcherFn`].
pub fn matcher_fn<F>(f: F) -> MatcherFn
where
    F: Fn(&NormalizedRequest) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A route's compiled predicate.
#[derive(Clone)]
pub struct CompiledMatcher {
    pub matcher: MatcherFn,
    /// True iff some active kind inspects the request body.
    pub uses_body: bool,
    /// Names of the active kinds, in registry order.
    pub kinds: Vec<String>,
}

impl CompiledMatcher {
    /// Compile every active matcher kind for `config` into one predicate.
    pub fn compile(config: &RouteConfig) -> Result<Self, FetchMockError> {
        let mut active = Vec::new();
        let mut kinds = Vec::new();
        let mut uses_body = false;

        for definition in registry::definitions() {
            if let Some(predicate) = (definition.build)(config)? {
                uses_body |= definition.uses_body;
                kinds.push(definition.name.clone());
                active.push(predicate);
            }
        }

        if active.is_empty() {
            return Err(FetchMockError::InvalidMatcher(
                "route must specify at least one matching criterion".to_string(),
            ));
        }

        Ok(Self {
            matcher: matcher_fn(move |req| active.iter().all(|m| m(req))),
            uses_body,
            kinds,
        })
    }

    pub fn matches(&self, request: &NormalizedRequest) -> bool {
        (self.matcher)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchMockConfig, UserRouteConfig};
    use crate::request::RequestOptions;
    use serde_json::json;

    fn compile(config: UserRouteConfig) -> Result<CompiledMatcher, FetchMockError> {
        CompiledMatcher::compile(&config.resolve(&FetchMockConfig::default()))
    }

    #[test]
    fn test_all_kinds_and_together() {
        let matcher = compile(
            UserRouteConfig::new()
                .url("begin:http://a.com")
                .method("post")
                .header("x-token", "t")
                .query("page", "1"),
        )
        .unwrap();
        assert_eq!(matcher.kinds, vec!["url", "method", "headers", "query"]);
        assert!(!matcher.uses_body);

        let hit = NormalizedRequest::from_url(
            "http://a.com/items?page=1",
            Some(RequestOptions::new().method("POST").header("X-Token", "t")),
        );
        assert!(matcher.matches(&hit));

        let wrong_method = NormalizedRequest::from_url(
            "http://a.com/items?page=1",
            Some(RequestOptions::new().header("X-Token", "t")),
        );
        assert!(!matcher.matches(&wrong_method));
    }

    #[test]
    fn test_body_kind_sets_uses_body() {
        let matcher = compile(UserRouteConfig::new().body(json!({"a": 1}))).unwrap();
        assert!(matcher.uses_body);
    }

    #[test]
    fn test_function_matcher() {
        let matcher = compile(
            UserRouteConfig::new().matcher_function(|req: &NormalizedRequest| req.url.ends_with("/ok")),
        )
        .unwrap();
        assert!(matcher.matches(&NormalizedRequest::from_url("http://a.com/ok", None)));
        assert!(!matcher.matches(&NormalizedRequest::from_url("http://a.com/no", None)));
    }

    #[test]
    fn test_params_with_express_url() {
        let matcher = compile(
            UserRouteConfig::new()
                .url("express:/users/:id")
                .param("id", "42"),
        )
        .unwrap();
        assert!(matcher.matches(&NormalizedRequest::from_url("http://a.com/users/42", None)));
        assert!(!matcher.matches(&NormalizedRequest::from_url("http://a.com/users/7", None)));
    }

    #[test]
    fn test_params_without_express_url_is_rejected() {
        let err = compile(UserRouteConfig::new().url("http://a.com").param("id", "1"))
            .err()
            .unwrap();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_invalid_express_template_is_rejected() {
        let err = compile(UserRouteConfig::new().url("express:/files/*/more"))
            .err()
            .unwrap();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_empty_route_is_rejected() {
        assert!(compile(UserRouteConfig::new()).is_err());
    }

    #[test]
    fn test_custom_matcher_kind() {
        define_matcher(MatcherDefinition::new("isLocal", false, |config| {
            let Some(flag) = config.extra.get("isLocal").and_then(|v| v.as_bool()) else {
                return Ok(None);
            };
            Ok(Some(matcher_fn(move |req| {
                req.url.starts_with("http://localhost") == flag
            })))
        }));

        let matcher = compile(UserRouteConfig::new().option("isLocal", json!(true))).unwrap();
        assert_eq!(matcher.kinds, vec!["isLocal"]);
        assert!(matcher.matches(&NormalizedRequest::from_url("http://localhost:3000/x", None)));
        assert!(!matcher.matches(&NormalizedRequest::from_url("http://a.com/x", None)));
    }
}
