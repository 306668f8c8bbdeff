//! A registered route: compiled matcher, response spec and behaviour flags.

use crate::config::RouteConfig;
use crate::error::FetchMockError;
use crate::matcher::CompiledMatcher;
use crate::request::NormalizedRequest;
use crate::response::{construct, resolve, ConstructOptions, Constructed, RouteResponse};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Runtime state of a route. Immutable apart from its consumption counter.
pub struct Route {
    config: RouteConfig,
    response: RouteResponse,
    matcher: CompiledMatcher,
    calls: AtomicUsize,
}

impl Route {
    /// Validate `config` and compile its matcher.
    pub fn new(config: RouteConfig) -> Result<Self, FetchMockError> {
        let label = describe(&config);
        let response = config
            .response
            .clone()
            .ok_or_else(|| FetchMockError::MissingResponse(label.clone()))?;
        if config.repeat == Some(0) {
            return Err(FetchMockError::Config(format!(
                "route {label}: repeat must be greater than zero"
            )));
        }
        let matcher = CompiledMatcher::compile(&config)?;
        Ok(Self {
            config,
            response,
            matcher,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    /// The name, or the url matcher when unnamed.
    pub fn describe(&self) -> String {
        describe(&self.config)
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn uses_body(&self) -> bool {
        self.matcher.uses_body
    }

    pub fn is_sticky(&self) -> bool {
        self.config.sticky
    }

    pub fn is_fallback(&self) -> bool {
        self.config.is_fallback
    }

    /// Number of calls this route has accepted since the last reset.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.config
            .repeat
            .is_some_and(|limit| self.call_count() >= limit)
    }

    /// Check the matcher and, when it accepts, consume one use of the route.
    ///
    /// Returns false when the matcher rejects the request or the repeat limit
    /// has been reached.
    pub fn try_consume(&self, request: &NormalizedRequest) -> bool {
        if self.is_exhausted() || !self.matcher.matches(request) {
            return false;
        }
        let limit = self.config.repeat;
        self.calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| match limit {
                Some(limit) if count >= limit => None,
                _ => Some(count + 1),
            })
            .is_ok()
    }

    /// Re-arm the repeat limit.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Wait out any delay, resolve the response spec and construct it.
    pub async fn generate_response(
        &self,
        request: &NormalizedRequest,
    ) -> Result<Constructed, FetchMockError> {
        if let Some(delay) = self.config.delay.filter(|ms| *ms > 0) {
            debug!("Delaying response of {} by {}ms", self.describe(), delay);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let terminal = resolve(self.response.clone(), request).await?;
        construct(
            terminal,
            ConstructOptions {
                send_as_json: self.config.send_as_json,
                include_content_length: self.config.include_content_length,
            },
        )
    }
}

fn describe(config: &RouteConfig) -> String {
    match (&config.name, &config.url) {
        (Some(name), _) => name.clone(),
        (None, Some(url)) => url.describe(),
        (None, None) if config.is_fallback => "fallback".to_string(),
        (None, None) => "anonymous route".to_string(),
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.config.name)
            .field("matchers", &self.matcher.kinds)
            .field("repeat", &self.config.repeat)
            .field("calls", &self.call_count())
            .field("sticky", &self.config.sticky)
            .field("is_fallback", &self.config.is_fallback)
            .finish()
    }
}
