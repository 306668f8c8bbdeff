//! The top-level mock: route registration, the fetch entry point and call
//! history queries behind one cheaply cloneable handle.

use crate::call_history::{CallFilter, CallHistory, CallLog, HoldingKind};
use crate::config::{FetchMockConfig, UserRouteConfig};
use crate::error::FetchMockError;
use crate::request::{
    read_request, request_head, FetchInput, FetchRequest, NormalizedRequest, RequestOptions,
};
use crate::response::{ObservedResponse, RouteResponse};
use crate::route::Route;
use crate::router::{
    spawn_shared, Dispatch, NameOrOptions, RemoveRoutes, ResponseFuture, RouteMatcher, Router,
};
use futures::future::{self, FutureExt};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

struct Inner {
    config: FetchMockConfig,
    router: RwLock<Router>,
    history: Arc<CallHistory>,
}

/// A fetch mock instance. Clones share routes and history.
#[derive(Clone)]
pub struct FetchMock {
    inner: Arc<Inner>,
}

impl Default for FetchMock {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchMock {
    pub fn new() -> Self {
        Self::with_config(FetchMockConfig::default())
    }

    pub fn with_config(config: FetchMockConfig) -> Self {
        Self::from_parts(config.clone(), Router::new(config))
    }

    fn from_parts(config: FetchMockConfig, router: Router) -> Self {
        FetchMock {
            inner: Arc::new(Inner {
                config,
                router: RwLock::new(router),
                history: Arc::new(CallHistory::new()),
            }),
        }
    }

    pub fn config(&self) -> &FetchMockConfig {
        &self.inner.config
    }

    pub fn history(&self) -> &Arc<CallHistory> {
        &self.inner.history
    }

    /// Registered routes, in dispatch order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.inner.router.read().routes().to_vec()
    }

    /// Register a route from any of the supported call shapes.
    pub fn add_route(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: Option<RouteResponse>,
        name_or_options: Option<NameOrOptions>,
    ) -> Result<&Self, FetchMockError> {
        self.inner
            .router
            .write()
            .add_route(matcher, response, name_or_options)?;
        Ok(self)
    }

    pub fn route(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<RouteResponse>,
    ) -> Result<&Self, FetchMockError> {
        self.add_route(matcher, Some(response.into()), None)
    }

    pub fn route_with(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<RouteResponse>,
        name_or_options: impl Into<NameOrOptions>,
    ) -> Result<&Self, FetchMockError> {
        self.add_route(matcher, Some(response.into()), Some(name_or_options.into()))
    }

    /// Register a route that survives [`FetchMock::remove_routes`] without `force`.
    pub fn sticky(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<RouteResponse>,
    ) -> Result<&Self, FetchMockError> {
        self.route_with(matcher, response, UserRouteConfig::new().sticky(true))
    }

    /// Register a route that matches a single call.
    pub fn once(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<RouteResponse>,
    ) -> Result<&Self, FetchMockError> {
        self.route_with(matcher, response, UserRouteConfig::new().repeat(1))
    }

    /// Respond to otherwise unmatched calls with `response`.
    pub fn catch(&self, response: impl Into<RouteResponse>) -> Result<&Self, FetchMockError> {
        self.inner
            .router
            .write()
            .set_fallback(Some(response.into()))?;
        Ok(self)
    }

    /// Respond to otherwise unmatched calls with an empty 200.
    pub fn catch_default(&self) -> Result<&Self, FetchMockError> {
        self.inner.router.write().set_fallback(None)?;
        Ok(self)
    }

    pub fn remove_routes(&self, options: RemoveRoutes) -> &Self {
        self.inner.router.write().remove_routes(&options);
        self
    }

    pub fn clear_history(&self) -> &Self {
        self.inner.history.clear();
        self
    }

    /// Remove non-sticky routes, re-arm repeat limits and clear the history.
    pub fn reset(&self) -> &Self {
        {
            let mut router = self.inner.router.write();
            router.remove_routes(&RemoveRoutes::default());
            router.reset_counters();
        }
        self.clear_history()
    }

    /// A new instance sharing this instance's routes, with its own history.
    pub fn create_instance(&self) -> FetchMock {
        let router = self.inner.router.read().clone();
        Self::from_parts(self.inner.config.clone(), router)
    }

    /// Intercept one fetch.
    ///
    /// Route selection happens before this returns, so the call is in the
    /// history immediately. The returned future settles with the response or
    /// the call's rejection; it need not be awaited for the response to be
    /// generated. Must be called from within a tokio runtime for responses to
    /// progress without being polled. See [`FetchMock::flush`] for the
    /// runtime `flush` expects.
    pub fn fetch(
        &self,
        input: impl Into<FetchInput>,
        options: Option<RequestOptions>,
    ) -> FetchFuture {
        match input.into() {
            FetchInput::Url(url) => self.dispatch(NormalizedRequest::from_url(&url, options)),
            FetchInput::Request(request) => {
                if !self.inner.router.read().needs_to_read_body(true) {
                    let head = request_head(request);
                    return self.dispatch(NormalizedRequest::from_request(head, None, options));
                }
                // The body must be collected before any route can be selected.
                let response = spawn_shared(read_and_dispatch(self.clone(), request, options));
                self.hold(&response);
                FetchFuture { response }
            }
        }
    }

    fn dispatch(&self, request: NormalizedRequest) -> FetchFuture {
        match self.execute(request) {
            Ok(dispatch) => FetchFuture {
                response: dispatch.response,
            },
            Err(e) => FetchFuture {
                response: future::ready(Err(e)).boxed().shared(),
            },
        }
    }

    /// Route the request, record the call and hold its response for `flush`.
    fn execute(&self, request: NormalizedRequest) -> Result<Dispatch, FetchMockError> {
        let dispatch = self
            .inner
            .router
            .read()
            .execute(request, &self.inner.history)?;
        self.inner.history.add_call(Arc::clone(&dispatch.call_log));
        self.hold(&dispatch.response);
        Ok(dispatch)
    }

    fn hold(&self, response: &ResponseFuture) {
        self.inner.history.add_holding_promise(
            HoldingKind::Response,
            response.clone().map(|_| ()).boxed().shared(),
        );
    }

    /// Wait until every call issued so far has settled. With
    /// `wait_for_response_methods`, body reads are awaited too.
    ///
    /// Body reads chained onto spawned tasks are only guaranteed to be seen
    /// on a current-thread runtime, such as the default `#[tokio::test]`. On a
    /// multi-thread runtime a continuation may still be running on another
    /// worker when the final pass finds nothing new, so `flush` can return
    /// before its read is registered.
    pub async fn flush(&self, wait_for_response_methods: bool) {
        debug!(
            "Flushing fetch mock (wait for response methods: {})",
            wait_for_response_methods
        );
        self.inner.history.flush(wait_for_response_methods).await;
    }

    pub fn calls(&self, filter: impl Into<CallFilter>) -> Vec<Arc<CallLog>> {
        self.inner.history.calls(&self.resolve_filter(filter))
    }

    pub fn last_call(&self, filter: impl Into<CallFilter>) -> Option<Arc<CallLog>> {
        self.inner.history.last_call(&self.resolve_filter(filter))
    }

    pub fn last_url(&self, filter: impl Into<CallFilter>) -> Option<String> {
        self.inner.history.last_url(&self.resolve_filter(filter))
    }

    pub fn called(&self, filter: impl Into<CallFilter>) -> bool {
        self.inner.history.called(&self.resolve_filter(filter))
    }

    /// Whether the named routes (every route when `names` is empty) have
    /// been called as often as expected.
    pub fn done(&self, names: &[&str]) -> bool {
        let routes: Vec<Arc<Route>> = {
            let router = self.inner.router.read();
            router
                .routes()
                .iter()
                .filter(|route| {
                    names.is_empty() || route.name().is_some_and(|name| names.contains(&name))
                })
                .cloned()
                .collect()
        };
        self.inner.history.done(&routes)
    }

    fn resolve_filter(&self, filter: impl Into<CallFilter>) -> CallFilter {
        let router = self.inner.router.read();
        filter.into().resolve_name(|name| router.has_route(name))
    }
}

async fn read_and_dispatch(
    fm: FetchMock,
    request: FetchRequest,
    options: Option<RequestOptions>,
) -> Result<ObservedResponse, FetchMockError> {
    let (head, body) = read_request(request, true).await?;
    let dispatch = fm.execute(NormalizedRequest::from_request(head, body, options))?;
    dispatch.response.await
}

impl fmt::Debug for FetchMock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchMock")
            .field("config", &self.inner.config)
            .field("router", &*self.inner.router.read())
            .field("history", &self.inner.history)
            .finish()
    }
}

/// Pending result of [`FetchMock::fetch`]. Cloneable; every clone settles
/// with the same outcome.
#[derive(Clone)]
pub struct FetchFuture {
    response: ResponseFuture,
}

impl FetchFuture {
    /// The outcome, if already settled.
    pub fn peek(&self) -> Option<&Result<ObservedResponse, FetchMockError>> {
        self.response.peek()
    }
}

impl Future for FetchFuture {
    type Output = Result<ObservedResponse, FetchMockError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.response).poll(cx)
    }
}

impl fmt::Debug for FetchFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchFuture")
            .field("settled", &self.response.peek().is_some())
            .finish()
    }
}
