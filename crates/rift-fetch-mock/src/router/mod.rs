//! Route registration and dispatch.
//!
//! The router owns the ordered route list and the optional fallback route.
//! Dispatch scans explicit routes in registration order, then the fallback,
//! and takes the first route whose matcher accepts the request and whose
//! repeat limit is not yet reached.

use crate::call_history::{CallHistory, CallLog};
use crate::config::{FetchMockConfig, UserRouteConfig};
use crate::error::FetchMockError;
use crate::matcher::{matcher_fn, MatcherFn, UrlMatcher};
use crate::request::NormalizedRequest;
use crate::response::{ObservedResponse, RouteResponse};
use crate::route::Route;
use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};


/// Settles with the caller-facing response, or the call's rejection.
pub type ResponseFuture = Shared<BoxFuture<'static, Result<ObservedResponse, FetchMockError>>>;

/// First argument of `add_route`.
pub enum RouteMatcher {
    /// Sugar for a url-only route.
    Url(UrlMatcher),
    /// Sugar for a function-only route.
    Function(MatcherFn),
    /// A full route specification.
    Config(UserRouteConfig),
}

impl RouteMatcher {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&NormalizedRequest) -> bool + Send + Sync + 'static,
    {
        RouteMatcher::Function(matcher_fn(f))
    }
}

impl From<&str> for RouteMatcher {
    fn from(url: &str) -> Self {
        RouteMatcher::Url(url.into())
    }
}

impl From<String> for RouteMatcher {
    fn from(url: String) -> Self {
        RouteMatcher::Url(url.into())
    }
}

impl From<Regex> for RouteMatcher {
    fn from(regex: Regex) -> Self {
        RouteMatcher::Url(regex.into())
    }
}

impl From<UrlMatcher> for RouteMatcher {
    fn from(url: UrlMatcher) -> Self {
        RouteMatcher::Url(url)
    }
}

impl From<MatcherFn> for RouteMatcher {
    fn from(f: MatcherFn) -> Self {
        RouteMatcher::Function(f)
    }
}

impl From<UserRouteConfig> for RouteMatcher {
    fn from(config: UserRouteConfig) -> Self {
        RouteMatcher::Config(config)
    }
}

/// Third argument of `add_route`: a route name or extra options.
pub enum NameOrOptions {
    Name(String),
    Options(UserRouteConfig),
}

impl From<&str> for NameOrOptions {
    fn from(name: &str) -> Self {
        NameOrOptions::Name(name.to_string())
    }
}

impl From<String> for NameOrOptions {
    fn from(name: String) -> Self {
        NameOrOptions::Name(name)
    }
}

impl From<UserRouteConfig> for NameOrOptions {
    fn from(options: UserRouteConfig) -> Self {
        NameOrOptions::Options(options)
    }
}

/// Options for [`Router::remove_routes`].
#[derive(Debug, Clone, Default)]
pub struct RemoveRoutes {
    /// Remove sticky routes too.
    pub force: bool,
    /// Drop the fallback route as well.
    pub include_fallback: bool,
    /// Only remove these routes; empty means every route.
    pub names: Vec<String>,
}

impl RemoveRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn include_fallback(mut self) -> Self {
        self.include_fallback = true;
        self
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of dispatching one request.
pub struct Dispatch {
    pub route: Arc<Route>,
    pub call_log: Arc<CallLog>,
    pub response: ResponseFuture,
}

/// Ordered routes plus an optional fallback.
#[derive(Debug, Clone)]
pub struct Router {
    config: FetchMockConfig,
    routes: Vec<Arc<Route>>,
    fallback: Option<Arc<Route>>,
}

impl Router {
    pub fn new(config: FetchMockConfig) -> Self {
        Self {
            config,
            routes: Vec::new(),
            fallback: None,
        }
    }

    pub fn config(&self) -> &FetchMockConfig {
        &self.config
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn fallback(&self) -> Option<&Arc<Route>> {
        self.fallback.as_ref()
    }

    pub fn route(&self, name: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.name() == Some(name))
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.route(name).is_some()
    }

    /// Register a route.
    ///
    /// Options are layered: the matcher (or full config), then `response`,
    /// then `name_or_options`; later sources win field by field. Unset flags
    /// come from the instance config.
    pub fn add_route(
        &mut self,
        matcher: impl Into<RouteMatcher>,
        response: Option<RouteResponse>,
        name_or_options: Option<NameOrOptions>,
    ) -> Result<Arc<Route>, FetchMockError> {
        let mut config = match matcher.into() {
            RouteMatcher::Url(url) => UserRouteConfig::new().url(url),
            RouteMatcher::Function(f) => UserRouteConfig {
                matcher_function: Some(f),
                ..UserRouteConfig::default()
            },
            RouteMatcher::Config(config) => config,
        };
        if let Some(response) = response {
            config.response = Some(response);
        }
        if let Some(extra) = name_or_options {
            config = config.merge(match extra {
                NameOrOptions::Name(name) => UserRouteConfig::new().name(name),
                NameOrOptions::Options(options) => options,
            });
        }

        let config = config.resolve(&self.config);
        if let Some(name) = &config.name {
            if self.has_route(name) {
                return Err(FetchMockError::DuplicateRouteName(name.clone()));
            }
        }

        let route = Arc::new(Route::new(config)?);
        debug!("Added route {:?}", route);
        self.routes.push(Arc::clone(&route));
        Ok(route)
    }

    /// Install the catch-all route tried after every explicit route.
    ///
    /// Responds with `"ok"` when no response is given.
    pub fn set_fallback(&mut self, response: Option<RouteResponse>) -> Result<(), FetchMockError> {
        if self.fallback.is_some() {
            warn!(
                "calling catch() twice - are you sure you want to overwrite the previous fallback response"
            );
        }

        let warn_on_fallback = self.config.warn_on_fallback;
        let mut config = UserRouteConfig::new()
            .matcher_function(move |req: &NormalizedRequest| {
                if warn_on_fallback {
                    warn!("Unmatched {} to {}", req.method(), req.url);
                }
                true
            })
            .response(response.unwrap_or_else(|| RouteResponse::from("ok")))
            .resolve(&self.config);
        config.is_fallback = true;

        self.fallback = Some(Arc::new(Route::new(config)?));
        Ok(())
    }

    /// Remove routes. Sticky routes survive unless `force` is set.
    pub fn remove_routes(&mut self, options: &RemoveRoutes) {
        let before = self.routes.len();
        self.routes.retain(|route| {
            let targeted = options.names.is_empty()
                || route
                    .name()
                    .is_some_and(|name| options.names.iter().any(|n| n == name));
            !(targeted && (options.force || !route.is_sticky()))
        });
        if options.include_fallback {
            self.fallback = None;
        }
        debug!(
            "Removed {} routes, {} remaining",
            before - self.routes.len(),
            self.routes.len()
        );
    }

    /// Re-arm every route's repeat limit.
    pub fn reset_counters(&self) {
        for route in self.routes.iter().chain(self.fallback.iter()) {
            route.reset();
        }
    }

    /// Whether a request object's body must be read before matching.
    pub fn needs_to_read_body(&self, has_request: bool) -> bool {
        has_request
            && self
                .routes
                .iter()
                .chain(self.fallback.iter())
                .any(|route| route.uses_body())
    }

    /// Select a route for `request` and start generating its response.
    ///
    /// The call log exists as soon as this returns; its response is attached
    /// once generation completes. Fails with [`FetchMockError::NoMatch`] when
    /// neither a route nor the fallback accepts the request.
    pub fn execute(
        &self,
        request: NormalizedRequest,
        history: &Arc<CallHistory>,
    ) -> Result<Dispatch, FetchMockError> {
        let Some(route) = self
            .routes
            .iter()
            .chain(self.fallback.iter())
            .find(|route| route.try_consume(&request))
            .cloned()
        else {
            debug!("No route for {} {}", request.method(), request.url);
            return Err(FetchMockError::NoMatch {
                method: request.method(),
                url: request.url,
            });
        };

        debug!(
            "Matched {} {} to route {}",
            request.method(),
            request.url,
            route.describe()
        );

        let request = Arc::new(request);
        let call_log = Arc::new(CallLog::new(&request, Arc::clone(&route)));
        let response = spawn_shared(generate_response(
            Arc::clone(&route),
            request,
            Arc::clone(&call_log),
            Arc::downgrade(history),
        ));

        Ok(Dispatch {
            route,
            call_log,
            response,
        })
    }
}

async fn generate_response(
    route: Arc<Route>,
    request: Arc<NormalizedRequest>,
    call_log: Arc<CallLog>,
    history: Weak<CallHistory>,
) -> Result<ObservedResponse, FetchMockError> {
    let constructed = route.generate_response(&request).await.inspect_err(|e| {
        debug!("Response for {} rejected: {}", request.url, e);
    })?;
    let response = ObservedResponse::new(
        constructed.response,
        constructed.redirect_url,
        &request.url,
        history,
    );
    call_log.set_response(response.clone());
    Ok(response)
}

/// Run `future` on the ambient runtime so it completes whether or not it is
/// awaited. Without a runtime it runs lazily, driven by whoever polls it.
pub(crate) fn spawn_shared<T, F>(future: F) -> Shared<BoxFuture<'static, Result<T, FetchMockError>>>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<T, FetchMockError>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle
            .spawn(future)
            .map(|joined| {
                joined.unwrap_or_else(|e| Err(FetchMockError::ResponseTask(e.to_string())))
            })
            .boxed()
            .shared(),
        Err(_) => future.boxed().shared(),
    }
}
