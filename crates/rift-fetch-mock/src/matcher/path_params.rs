//! Express-style path templates (`/users/:id`) and path-parameter extraction.

use crate::error::FetchMockError;
use std::collections::HashMap;
use std::fmt;

/// Compiled express template backed by a single-route `matchit` router.
pub struct ExpressTemplate {
    template: String,
    router: matchit::Router<()>,
}

impl ExpressTemplate {
    pub fn compile(template: &str) -> Result<Self, FetchMockError> {
        let route = to_matchit_route(template);
        let mut router = matchit::Router::new();
        router.insert(route, ()).map_err(|e| {
            FetchMockError::InvalidMatcher(format!("express template '{template}': {e}"))
        })?;
        Ok(Self {
            template: template.to_string(),
            router,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn matches(&self, path: &str) -> bool {
        self.router.at(path).is_ok()
    }

    /// Named parameters extracted from `path`, or `None` when it doesn't fit.
    pub fn params(&self, path: &str) -> Option<HashMap<String, String>> {
        let matched = self.router.at(path).ok()?;
        Some(
            matched
                .params
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        urlencoding::decode(value).unwrap_or_default().to_string(),
                    )
                })
                .collect(),
        )
    }
}

impl fmt::Debug for ExpressTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressTemplate")
            .field("template", &self.template)
            .finish()
    }
}

/// `/users/:id/*` becomes `/users/{id}/{*wildcard}`; literal braces are escaped.
fn to_matchit_route(template: &str) -> String {
    template
        .split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if segment == "*" {
                "{*wildcard}".to_string()
            } else {
                segment.replace('{', "{{").replace('}', "}}")
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
