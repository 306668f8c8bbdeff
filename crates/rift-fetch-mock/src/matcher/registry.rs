//! Process-wide registry of matcher kinds.
//!
//! The registry starts with the built-in kinds and can be extended with
//! [`define_matcher`]. Every kind whose option is present on a route
//! contributes one predicate; registration order carries no precedence.

use super::body_matcher::CompiledBodyMatcher;
use super::field_matcher::{CompiledHeaderMatcher, CompiledQueryMatcher};
use super::path_params::ExpressTemplate;
use super::url_matcher::CompiledUrlMatcher;
use super::{matcher_fn, MatcherFn};
use crate::config::RouteConfig;
use crate::error::FetchMockError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Builds a kind's predicate for a route, or `None` when the route doesn't use it.
pub type MatcherBuilder =
    Arc<dyn Fn(&RouteConfig) -> Result<Option<MatcherFn>, FetchMockError> + Send + Sync>;

/// A named matcher kind.
#[derive(Clone)]
pub struct MatcherDefinition {
    pub name: String,
    /// Whether this kind inspects the request body.
    pub uses_body: bool,
    pub build: MatcherBuilder,
}

impl MatcherDefinition {
    pub fn new<F>(name: impl Into<String>, uses_body: bool, build: F) -> Self
    where
        F: Fn(&RouteConfig) -> Result<Option<MatcherFn>, FetchMockError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            uses_body,
            build: Arc::new(build),
        }
    }
}

impl fmt::Debug for MatcherDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherDefinition")
            .field("name", &self.name)
            .field("uses_body", &self.uses_body)
            .finish()
    }
}

static REGISTRY: Lazy<RwLock<Vec<MatcherDefinition>>> =
    Lazy::new(|| RwLock::new(builtin_matchers()));

/// Register a matcher kind for all routes created afterwards.
///
/// A definition with an existing name replaces the earlier one.
pub fn define_matcher(definition: MatcherDefinition) {
    let mut registry = REGISTRY.write();
    if let Some(existing) = registry.iter_mut().find(|d| d.name == definition.name) {
        *existing = definition;
    } else {
        registry.push(definition);
    }
}

/// Names of all registered matcher kinds, built-ins first.
pub fn registered_matchers() -> Vec<String> {
    REGISTRY.read().iter().map(|d| d.name.clone()).collect()
}

pub(crate) fn definitions() -> Vec<MatcherDefinition> {
    REGISTRY.read().clone()
}

fn builtin_matchers() -> Vec<MatcherDefinition> {
    vec![
        MatcherDefinition::new("url", false, |config| {
            let Some(url) = &config.url else {
                return Ok(None);
            };
            let compiled = CompiledUrlMatcher::compile(url)?;
            Ok(Some(matcher_fn(move |req| compiled.matches(req))))
        }),
        MatcherDefinition::new("method", false, |config| {
            let Some(method) = &config.method else {
                return Ok(None);
            };
            let expected = method.to_uppercase();
            Ok(Some(matcher_fn(move |req| req.method() == expected)))
        }),
        MatcherDefinition::new("headers", false, |config| {
            if config.headers.is_empty() {
                return Ok(None);
            }
            let compiled = CompiledHeaderMatcher::compile(&config.headers);
            Ok(Some(matcher_fn(move |req| compiled.matches(req))))
        }),
        MatcherDefinition::new("query", false, |config| {
            if config.query.is_empty() {
                return Ok(None);
            }
            let compiled = CompiledQueryMatcher::compile(&config.query);
            Ok(Some(matcher_fn(move |req| compiled.matches(req))))
        }),
        MatcherDefinition::new("params", false, |config| {
            if config.params.is_empty() {
                return Ok(None);
            }
            let template = config
                .url
                .as_ref()
                .and_then(|url| url.express_template())
                .ok_or_else(|| {
                    FetchMockError::InvalidMatcher(
                        "cannot match params without specifying an express: url".to_string(),
                    )
                })?;
            let template = ExpressTemplate::compile(template)?;
            let expected = config.params.clone();
            Ok(Some(matcher_fn(move |req| {
                template.params(&req.path()).is_some_and(|actual| {
                    expected
                        .iter()
                        .all(|(name, value)| actual.get(name) == Some(value))
                })
            })))
        }),
        MatcherDefinition::new("body", true, |config| {
            let Some(body) = &config.body else {
                return Ok(None);
            };
            let compiled = CompiledBodyMatcher::compile(body, config.match_partial_body);
            Ok(Some(matcher_fn(move |req| compiled.matches(req))))
        }),
        MatcherDefinition::new("matcherFunction", false, |config| {
            Ok(config.matcher_function.clone())
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered_in_order() {
        let names = registered_matchers();
        let builtins = [
            "url",
            "method",
            "headers",
            "query",
            "params",
            "body",
            "matcherFunction",
        ];
        assert_eq!(&names[..builtins.len()], &builtins);
    }

    #[test]
    fn test_define_matcher_replaces_same_name() {
        define_matcher(MatcherDefinition::new("registryReplaceKind", false, |_| {
            Ok(None)
        }));
        define_matcher(MatcherDefinition::new("registryReplaceKind", true, |_| {
            Ok(None)
        }));
        let kinds: Vec<_> = definitions()
            .into_iter()
            .filter(|d| d.name == "registryReplaceKind")
            .collect();
        assert_eq!(kinds.len(), 1);
        assert!(kinds[0].uses_body);
    }
}
