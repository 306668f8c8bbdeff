//! Call history: every dispatched call, plus the pending work `flush` waits on.
//!
//! Calls are appended at dispatch time, before their responses settle, so the
//! history always reflects dispatch order. Holding promises are registered
//! separately: one per response generation and one per body read.

use crate::error::FetchMockError;
use crate::matcher::{CompiledUrlMatcher, UrlMatcher};
use crate::request::{NormalizedRequest, RequestHead, RequestOptions};
use crate::response::ObservedResponse;
use crate::route::Route;
use futures::future::{join_all, BoxFuture, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

/// Unit future registered with the history so `flush` can await it.
pub type HoldingFuture = Shared<BoxFuture<'static, ()>>;

/// What a holding promise is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingKind {
    /// Resolution and construction of a call's response.
    Response,
    /// A body read made on a returned response.
    BodyRead,
}

#[derive(Clone)]
struct HoldingPromise {
    kind: HoldingKind,
    future: HoldingFuture,
}

/// One dispatched call.
pub struct CallLog {
    pub url: String,
    pub options: RequestOptions,
    pub request: Option<RequestHead>,
    pub route: Arc<Route>,
    response: Mutex<Option<ObservedResponse>>,
}

impl CallLog {
    pub(crate) fn new(request: &NormalizedRequest, route: Arc<Route>) -> Self {
        Self {
            url: request.url.clone(),
            options: request.options.clone(),
            request: request.request.clone(),
            route,
            response: Mutex::new(None),
        }
    }

    /// Upper-cased method of the call.
    pub fn method(&self) -> String {
        self.options
            .method
            .as_deref()
            .unwrap_or("GET")
            .to_uppercase()
    }

    /// The response, once resolution has completed. `None` while pending or
    /// when the call rejected.
    pub fn response(&self) -> Option<ObservedResponse> {
        self.response.lock().clone()
    }

    pub(crate) fn set_response(&self, response: ObservedResponse) {
        *self.response.lock() = Some(response);
    }

    /// Whether the call was handled by the fallback route.
    pub fn is_unmatched(&self) -> bool {
        self.route.is_fallback()
    }
}

impl fmt::Debug for CallLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLog")
            .field("url", &self.url)
            .field("method", &self.method())
            .field("route", &self.route.describe())
            .field("settled", &self.response.lock().is_some())
            .finish()
    }
}

/// Which calls a query selects.
#[derive(Debug, Clone, Default)]
pub enum CallScope {
    #[default]
    All,
    /// Calls handled by a non-fallback route.
    Matched,
    /// Calls handled by the fallback route.
    Unmatched,
    /// Calls handled by the named route.
    Route(String),
    /// Calls whose url matches.
    Url(CompiledUrlMatcher),
    /// A route name if one exists, otherwise a url matcher. Resolved by the
    /// mock before querying; treated as a route name here.
    Named(String),
}

/// Call history query.
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    pub scope: CallScope,
    pub method: Option<String>,
}

impl CallFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matched() -> Self {
        Self::scoped(CallScope::Matched)
    }

    pub fn unmatched() -> Self {
        Self::scoped(CallScope::Unmatched)
    }

    pub fn route(name: impl Into<String>) -> Self {
        Self::scoped(CallScope::Route(name.into()))
    }

    pub fn url(matcher: impl Into<UrlMatcher>) -> Result<Self, FetchMockError> {
        let compiled = CompiledUrlMatcher::compile(&matcher.into())?;
        Ok(Self::scoped(CallScope::Url(compiled)))
    }

    /// Restrict to calls with this method (case-insensitive).
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into().to_uppercase());
        self
    }

    fn scoped(scope: CallScope) -> Self {
        Self {
            scope,
            method: None,
        }
    }

    /// Turn a [`CallScope::Named`] scope into a route or url scope.
    pub(crate) fn resolve_name(self, is_route: impl Fn(&str) -> bool) -> Self {
        let CallScope::Named(name) = &self.scope else {
            return self;
        };
        let scope = if is_route(name) {
            CallScope::Route(name.clone())
        } else {
            match CompiledUrlMatcher::compile(&UrlMatcher::from(name.as_str())) {
                Ok(compiled) => CallScope::Url(compiled),
                Err(e) => {
                    warn!("Ignoring call filter '{}': {}", name, e);
                    CallScope::Route(name.clone())
                }
            }
        };
        Self {
            scope,
            method: self.method,
        }
    }

    fn matches(&self, call: &CallLog) -> bool {
        if let Some(method) = &self.method {
            if call.method() != *method {
                return false;
            }
        }
        match &self.scope {
            CallScope::All => true,
            CallScope::Matched => !call.is_unmatched(),
            CallScope::Unmatched => call.is_unmatched(),
            CallScope::Route(name) | CallScope::Named(name) => {
                call.route.name() == Some(name.as_str())
            }
            CallScope::Url(matcher) => matcher.matches(&NormalizedRequest {
                url: call.url.clone(),
                options: call.options.clone(),
                request: call.request.clone(),
            }),
        }
    }
}

impl From<&str> for CallFilter {
    /// `"matched"` and `"unmatched"` select by outcome; any other string is a
    /// route name or url.
    fn from(value: &str) -> Self {
        match value {
            "matched" => Self::matched(),
            "unmatched" => Self::unmatched(),
            other => Self::scoped(CallScope::Named(other.to_string())),
        }
    }
}

impl From<String> for CallFilter {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Option<CallFilter>> for CallFilter {
    fn from(filter: Option<CallFilter>) -> Self {
        filter.unwrap_or_default()
    }
}

/// Ordered log of calls plus the holding promises `flush` drains.
#[derive(Default)]
pub struct CallHistory {
    calls: Mutex<Vec<Arc<CallLog>>>,
    holding: Mutex<Vec<HoldingPromise>>,
}

impl CallHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_call(&self, call: Arc<CallLog>) {
        self.calls.lock().push(call);
    }

    pub(crate) fn add_holding_promise(&self, kind: HoldingKind, future: HoldingFuture) {
        self.holding.lock().push(HoldingPromise { kind, future });
    }

    /// Number of holding promises not yet drained by `flush`.
    pub fn holding_count(&self) -> usize {
        self.holding.lock().len()
    }

    pub fn calls(&self, filter: &CallFilter) -> Vec<Arc<CallLog>> {
        self.calls
            .lock()
            .iter()
            .filter(|call| filter.matches(call))
            .cloned()
            .collect()
    }

    pub fn last_call(&self, filter: &CallFilter) -> Option<Arc<CallLog>> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|call| filter.matches(call))
            .cloned()
    }

    pub fn last_url(&self, filter: &CallFilter) -> Option<String> {
        self.last_call(filter).map(|call| call.url.clone())
    }

    pub fn called(&self, filter: &CallFilter) -> bool {
        self.calls.lock().iter().any(|call| filter.matches(call))
    }

    /// Whether every route in `routes` has been called: at least once, or
    /// exactly `repeat` times when limited.
    pub fn done(&self, routes: &[Arc<Route>]) -> bool {
        let calls = self.calls.lock();
        let mut done = true;
        for route in routes {
            let count = calls
                .iter()
                .filter(|call| Arc::ptr_eq(&call.route, route))
                .count();
            match route.config().repeat {
                Some(expected) if count < expected => {
                    warn!(
                        "Warning: {} only called {} times, but {} expected",
                        route.describe(),
                        count,
                        expected
                    );
                    done = false;
                }
                None if count == 0 => {
                    warn!("Warning: {} not called", route.describe());
                    done = false;
                }
                _ => {}
            }
        }
        done
    }

    /// Forget all calls and holding promises.
    pub fn clear(&self) {
        self.calls.lock().clear();
        self.holding.lock().clear();
    }

    /// Wait for all pending mocked activity to settle.
    ///
    /// Drains holding promises in passes: each pass drops the promises that
    /// have settled, awaits the rest, then yields so continuations woken by
    /// the pass can register follow-up work. Stops once a pass finds nothing
    /// pending. Without `wait_for_response_methods`, body reads are neither
    /// awaited nor dropped. There is no timeout.
    ///
    /// Continuations are only guaranteed to have registered their reads on a
    /// current-thread runtime; a warning is logged once on a multi-thread one.
    pub async fn flush(&self, wait_for_response_methods: bool) {
        warn_if_multi_thread();
        let mut pass = 0usize;
        loop {
            let pending: Vec<HoldingFuture> = {
                let mut holding = self.holding.lock();
                holding.retain(|h| h.future.peek().is_none());
                holding
                    .iter()
                    .filter(|h| wait_for_response_methods || h.kind == HoldingKind::Response)
                    .map(|h| h.future.clone())
                    .collect()
            };
            if pending.is_empty() {
                break;
            }
            pass += 1;
            debug!("Flush pass {}: awaiting {} pending promises", pass, pending.len());
            join_all(pending).await;
            tokio::task::yield_now().await;
        }
        debug!("Flush complete after {} passes", pass);
    }
}

fn warn_if_multi_thread() {
    static WARNED: AtomicBool = AtomicBool::new(false);
    let Ok(handle) = Handle::try_current() else {
        return;
    };
    if handle.runtime_flavor() == RuntimeFlavor::MultiThread
        && !WARNED.swap(true, Ordering::Relaxed)
    {
        warn!(
            "flush on a multi-thread runtime may miss body reads started by other tasks; \
             use a current-thread runtime"
        );
    }
}

impl fmt::Debug for CallHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHistory")
            .field("calls", &self.calls.lock().len())
            .field("holding", &self.holding.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchMockConfig, UserRouteConfig};
    use futures::FutureExt;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn route(config: UserRouteConfig) -> Arc<Route> {
        Arc::new(
            Route::new(config.response(200u16).resolve(&FetchMockConfig::default())).unwrap(),
        )
    }

    fn log(url: &str, method: &str, route: &Arc<Route>) -> Arc<CallLog> {
        let request = NormalizedRequest::from_url(url, Some(RequestOptions::new().method(method)));
        Arc::new(CallLog::new(&request, Arc::clone(route)))
    }

    #[test]
    fn test_queries_by_route_and_method() {
        let history = CallHistory::new();
        let users = route(UserRouteConfig::new().url("begin:http://a.com/users").name("users"));
        let items = route(UserRouteConfig::new().url("begin:http://a.com/items").name("items"));

        history.add_call(log("http://a.com/users/1", "GET", &users));
        history.add_call(log("http://a.com/items/1", "POST", &items));
        history.add_call(log("http://a.com/users/2", "DELETE", &users));

        assert_eq!(history.calls(&CallFilter::all()).len(), 3);
        assert_eq!(history.calls(&CallFilter::route("users")).len(), 2);
        assert_eq!(
            history.last_url(&CallFilter::route("users")).as_deref(),
            Some("http://a.com/users/2")
        );
        assert_eq!(
            history.calls(&CallFilter::route("users").method("delete")).len(),
            1
        );
        assert!(history.called(&CallFilter::url("end:/items/1").unwrap()));
        assert!(!history.called(&CallFilter::url("end:/items/2").unwrap()));
        assert_eq!(
            history.last_url(&CallFilter::all()).as_deref(),
            Some("http://a.com/users/2")
        );
    }

    #[test]
    fn test_matched_and_unmatched() {
        let history = CallHistory::new();
        let explicit = route(UserRouteConfig::new().url("http://a.com/"));
        let mut fallback_config = UserRouteConfig::new()
            .matcher_function(|_: &NormalizedRequest| true)
            .response(200u16)
            .resolve(&FetchMockConfig::default());
        fallback_config.is_fallback = true;
        let fallback = Arc::new(Route::new(fallback_config).unwrap());

        history.add_call(log("http://a.com/", "GET", &explicit));
        history.add_call(log("http://b.com/", "GET", &fallback));

        assert_eq!(history.calls(&CallFilter::matched()).len(), 1);
        assert_eq!(
            history.last_url(&CallFilter::unmatched()).as_deref(),
            Some("http://b.com/")
        );
    }

    #[test]
    fn test_done_respects_repeat() {
        let history = CallHistory::new();
        let once = route(UserRouteConfig::new().url("http://a.com/").repeat(2));
        let any = route(UserRouteConfig::new().url("http://b.com/"));
        let routes = vec![Arc::clone(&once), Arc::clone(&any)];

        assert!(!history.done(&routes));
        history.add_call(log("http://a.com/", "GET", &once));
        history.add_call(log("http://b.com/", "GET", &any));
        assert!(!history.done(&routes));
        history.add_call(log("http://a.com/", "GET", &once));
        assert!(history.done(&routes));
    }

    #[test]
    fn test_clear() {
        let history = CallHistory::new();
        let r = route(UserRouteConfig::new().url("*"));
        history.add_call(log("http://a.com/", "GET", &r));
        history.add_holding_promise(HoldingKind::Response, async {}.boxed().shared());
        history.clear();
        assert!(!history.called(&CallFilter::all()));
        assert_eq!(history.holding_count(), 0);
    }

    #[test]
    fn test_named_filter_resolution() {
        let filter = CallFilter::from("users").resolve_name(|name| name == "users");
        assert!(matches!(filter.scope, CallScope::Route(_)));

        let filter = CallFilter::from("http://a.com/").resolve_name(|_| false);
        assert!(matches!(filter.scope, CallScope::Url(_)));
    }

    #[tokio::test]
    async fn test_flush_without_body_reads_skips_them() {
        let history = CallHistory::new();
        let settled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&settled);
        history.add_holding_promise(
            HoldingKind::Response,
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                flag.store(true, Ordering::SeqCst);
            }
            .boxed()
            .shared(),
        );
        history.add_holding_promise(
            HoldingKind::BodyRead,
            futures::future::pending::<()>().boxed().shared(),
        );

        history.flush(false).await;
        assert!(settled.load(Ordering::SeqCst));
    }

    fn flagged_after(ms: u64, flag: &Arc<AtomicBool>) -> HoldingFuture {
        let flag = Arc::clone(flag);
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            flag.store(true, Ordering::SeqCst);
        }
        .boxed()
        .shared()
    }

    #[tokio::test]
    async fn test_flush_drops_settled_promises() {
        let history = CallHistory::new();
        history.add_holding_promise(HoldingKind::Response, async {}.boxed().shared());
        history.add_holding_promise(HoldingKind::BodyRead, async {}.boxed().shared());
        history.add_holding_promise(
            HoldingKind::BodyRead,
            futures::future::pending::<()>().boxed().shared(),
        );

        history.flush(false).await;
        // Unawaited body reads stay until a flush waits for them.
        assert_eq!(history.holding_count(), 2);

        history.add_holding_promise(HoldingKind::Response, async {}.boxed().shared());
        history.flush(false).await;
        assert_eq!(history.holding_count(), 2);
    }

    #[tokio::test]
    async fn test_flush_twice_leaves_nothing_held() {
        let history = CallHistory::new();
        let settled = Arc::new(AtomicBool::new(false));
        history.add_holding_promise(HoldingKind::BodyRead, flagged_after(5, &settled));

        history.flush(true).await;
        assert!(settled.load(Ordering::SeqCst));
        assert_eq!(history.holding_count(), 0);
        history.flush(true).await;
    }

    #[tokio::test]
    async fn test_flush_awaits_promises_added_after_clear() {
        let history = Arc::new(CallHistory::new());
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        history.add_holding_promise(HoldingKind::Response, flagged_after(20, &first));

        let flushing = tokio::spawn({
            let history = Arc::clone(&history);
            async move { history.flush(false).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        history.clear();
        history.add_holding_promise(HoldingKind::Response, flagged_after(40, &second));

        flushing.await.unwrap();
        assert!(first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[traced_test]
    async fn test_flush_warns_on_multi_thread_runtime() {
        let history = CallHistory::new();
        history.flush(true).await;
        assert!(logs_contain("flush on a multi-thread runtime"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_flush_is_quiet_on_current_thread_runtime() {
        let history = CallHistory::new();
        history.flush(true).await;
        assert!(!logs_contain("flush on a multi-thread runtime"));
    }
}
