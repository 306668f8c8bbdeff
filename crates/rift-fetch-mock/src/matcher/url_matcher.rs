//! Url matching configuration and compilation.
//!
//! A url matcher is either a string, whose prefix selects the strategy, or a
//! regex matched against the whole normalized url.

use super::path_params::ExpressTemplate;
use crate::error::FetchMockError;
use crate::request::{normalize_url, NormalizedRequest};
use regex::Regex;
use std::sync::Arc;

/// User-facing url matcher.
#[derive(Debug, Clone)]
pub enum UrlMatcher {
    /// `"*"`, `"begin:…"`, `"end:…"`, `"include:…"`, `"path:…"`, `"glob:…"`,
    /// `"express:…"`, or an exact url.
    Pattern(String),
    Regex(Regex),
}

impl UrlMatcher {
    /// The `express:` template, if this matcher uses one.
    pub fn express_template(&self) -> Option<&str> {
        match self {
            UrlMatcher::Pattern(pattern) => pattern.strip_prefix("express:"),
            UrlMatcher::Regex(_) => None,
        }
    }

    /// Human readable form, used as the default route name.
    pub fn describe(&self) -> String {
        match self {
            UrlMatcher::Pattern(pattern) => pattern.clone(),
            UrlMatcher::Regex(regex) => format!("/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for UrlMatcher {
    fn from(pattern: &str) -> Self {
        UrlMatcher::Pattern(pattern.to_string())
    }
}

impl From<String> for UrlMatcher {
    fn from(pattern: String) -> Self {
        UrlMatcher::Pattern(pattern)
    }
}

impl From<Regex> for UrlMatcher {
    fn from(regex: Regex) -> Self {
        UrlMatcher::Regex(regex)
    }
}

/// Compiled url matcher for efficient runtime evaluation.
#[derive(Debug, Clone)]
pub enum CompiledUrlMatcher {
    Any,
    Exact(String),
    Begin(String),
    End(String),
    Include(String),
    Path(String),
    Glob(Arc<Regex>),
    Express(Arc<ExpressTemplate>),
    Regex(Arc<Regex>),
}

impl CompiledUrlMatcher {
    /// Compile a UrlMatcher configuration.
    pub fn compile(matcher: &UrlMatcher) -> Result<Self, FetchMockError> {
        let pattern = match matcher {
            UrlMatcher::Regex(regex) => return Ok(Self::Regex(Arc::new(regex.clone()))),
            UrlMatcher::Pattern(pattern) => pattern.as_str(),
        };

        if pattern == "*" {
            return Ok(Self::Any);
        }
        if let Some(prefix) = pattern.strip_prefix("begin:") {
            return Ok(Self::Begin(prefix.to_string()));
        }
        if let Some(suffix) = pattern.strip_prefix("end:") {
            return Ok(Self::End(suffix.to_string()));
        }
        if let Some(needle) = pattern.strip_prefix("include:") {
            return Ok(Self::Include(needle.to_string()));
        }
        if let Some(path) = pattern.strip_prefix("path:") {
            return Ok(Self::Path(path.to_string()));
        }
        if let Some(glob) = pattern.strip_prefix("glob:") {
            return Ok(Self::Glob(Arc::new(glob_to_regex(glob)?)));
        }
        if let Some(template) = pattern.strip_prefix("express:") {
            return Ok(Self::Express(Arc::new(ExpressTemplate::compile(template)?)));
        }
        Ok(Self::Exact(normalize_url(pattern)))
    }

    /// Check if a request's url matches this matcher.
    pub fn matches(&self, request: &NormalizedRequest) -> bool {
        let url = request.url.as_str();
        match self {
            Self::Any => true,
            Self::Exact(expected) => url == expected,
            Self::Begin(prefix) => url.starts_with(prefix.as_str()),
            Self::End(suffix) => url.ends_with(suffix.as_str()),
            Self::Include(needle) => url.contains(needle.as_str()),
            Self::Path(path) => request.path() == *path,
            Self::Glob(regex) | Self::Regex(regex) => regex.is_match(url),
            Self::Express(template) => template.matches(&request.path()),
        }
    }
}

/// Translate a glob (`*` any run, `?` one character) into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex, FetchMockError> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Ok(Regex::new(&pattern)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> NormalizedRequest {
        NormalizedRequest::from_url(url, None)
    }

    fn compile(pattern: &str) -> CompiledUrlMatcher {
        CompiledUrlMatcher::compile(&UrlMatcher::from(pattern)).unwrap()
    }

    #[test]
    fn test_exact_url_is_normalized() {
        let matcher = compile("http://a.com");
        assert!(matcher.matches(&request("http://a.com/")));
        assert!(matcher.matches(&request("http://a.com")));
        assert!(!matcher.matches(&request("http://a.com/path")));
    }

    #[test]
    fn test_any() {
        let matcher = compile("*");
        assert!(matcher.matches(&request("http://anything.org/at/all")));
    }

    #[test]
    fn test_begin_end_include() {
        let begin = compile("begin:http://a.com/api");
        assert!(begin.matches(&request("http://a.com/api/users")));
        assert!(!begin.matches(&request("http://b.com/api")));

        let end = compile("end:.json");
        assert!(end.matches(&request("http://a.com/data.json")));
        assert!(!end.matches(&request("http://a.com/data.xml")));

        let include = compile("include:users");
        assert!(include.matches(&request("http://a.com/api/users/1")));
        assert!(!include.matches(&request("http://a.com/api/items")));
    }

    #[test]
    fn test_path_ignores_origin_and_query() {
        let matcher = compile("path:/api/users");
        assert!(matcher.matches(&request("http://a.com/api/users?page=1")));
        assert!(matcher.matches(&request("http://b.com/api/users")));
        assert!(!matcher.matches(&request("http://a.com/api/users/1")));
    }

    #[test]
    fn test_glob() {
        let matcher = compile("glob:http://*.com/*/v?");
        assert!(matcher.matches(&request("http://a.com/api/v1")));
        assert!(!matcher.matches(&request("http://a.org/api/v1")));
        assert!(!matcher.matches(&request("http://a.com/api/v12")));
    }

    #[test]
    fn test_express() {
        let matcher = compile("express:/users/:id");
        assert!(matcher.matches(&request("http://a.com/users/42")));
        assert!(!matcher.matches(&request("http://a.com/users/42/posts")));
    }

    #[test]
    fn test_regex() {
        let matcher = CompiledUrlMatcher::compile(&UrlMatcher::from(
            Regex::new(r"^http://a\.com/v\d+/").unwrap(),
        ))
        .unwrap();
        assert!(matcher.matches(&request("http://a.com/v2/items")));
        assert!(!matcher.matches(&request("http://a.com/items")));
    }

    #[test]
    fn test_express_template_accessor() {
        assert_eq!(
            UrlMatcher::from("express:/users/:id").express_template(),
            Some("/users/:id")
        );
        assert_eq!(UrlMatcher::from("http://a.com").express_template(), None);
    }
}
