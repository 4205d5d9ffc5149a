use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tracing::{debug, error, info, info_span, warn};

use super::metrics::DispatchMetrics;
use super::request::SharedRequest;
use super::response::{status_reason, Response, SharedResponse};
use crate::config::ServerConfig;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::router::{Route, RoutesCollection};
use crate::scope::{handler, BoxedHandler, Handler, Scope};

/// Typed root-scope binding holding the [`RequestId`].
pub const REQUEST_ID: &str = "request_id";
/// Typed binding holding the [`DispatchFailure`] inside the error pipeline.
pub const ERROR: &str = "error";

const GENERIC_500: &str = "Internal Server Error";

/// Populates the root scope of every dispatch.
pub type Provider = Arc<dyn Fn(&mut Scope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A route handled the request.
    Handled,
    /// No route matched; the not-found pipeline answered.
    NotFound,
    /// A handler failed; the error pipeline answered.
    Failed,
}

/// The error that sent a request to the error pipeline.
#[derive(Clone)]
pub struct DispatchFailure(Arc<anyhow::Error>);

impl DispatchFailure {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Outermost message only.
    pub fn message(&self) -> String {
        self.0.to_string()
    }

    /// Every message from the outermost error to the root cause.
    pub fn chain(&self) -> Vec<String> {
        self.0.chain().map(ToString::to_string).collect()
    }

    /// Multi-line report: the message followed by `caused by:` lines.
    pub fn report(&self) -> String {
        let mut lines = self.chain().into_iter();
        let mut out = lines.next().unwrap_or_default();
        for cause in lines {
            out.push_str("\ncaused by: ");
            out.push_str(&cause);
        }
        out
    }
}

impl fmt::Debug for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DispatchFailure").field(&self.message()).finish()
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

/// Result of [`Server::dispatch`]: the final request and response handles,
/// which filters may have replaced with decorators.
pub struct Dispatched {
    pub outcome: DispatchOutcome,
    pub request_id: RequestId,
    pub request: SharedRequest,
    pub response: SharedResponse,
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatched")
            .field("outcome", &self.outcome)
            .field("request_id", &self.request_id)
            .field("status", &self.response.borrow().status())
            .finish()
    }
}

/// The dispatch loop: root scope, routes, and the fallback pipelines.
pub struct Server {
    routes: RoutesCollection,
    providers: Vec<Provider>,
    config: ServerConfig,
    not_found: Route,
    error_page: Route,
    metrics: Arc<DispatchMetrics>,
}

pub struct ServerBuilder {
    routes: RoutesCollection,
    providers: Vec<Provider>,
    config: ServerConfig,
    not_found: Option<BoxedHandler>,
    error_page: Option<BoxedHandler>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl ServerBuilder {
    pub fn new(routes: RoutesCollection) -> Self {
        Self {
            routes,
            providers: Vec::new(),
            config: ServerConfig::default(),
            not_found: None,
            error_page: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.config.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn print_errors(mut self, print_errors: bool) -> Self {
        self.config.print_errors = print_errors;
        self
    }

    /// Run `provider` on every root scope, in registration order.
    #[must_use]
    pub fn provide<F>(mut self, provider: F) -> Self
    where
        F: Fn(&mut Scope) + Send + Sync + 'static,
    {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Replace the default 404 handler.
    #[must_use]
    pub fn not_found_handler<H: Handler>(mut self, h: H) -> Self {
        self.not_found = Some(handler::boxed(h));
        self
    }

    /// Replace the default 500 handler. It finds the failure bound as
    /// [`ERROR`].
    #[must_use]
    pub fn error_handler<H: Handler>(mut self, h: H) -> Self {
        self.error_page = Some(handler::boxed(h));
        self
    }

    /// Share counters with another component, such as a metrics route.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Server {
        let not_found_handler = self.not_found.unwrap_or_else(|| handler::boxed(NotFoundPage));
        let error_handler = self.error_page.unwrap_or_else(|| {
            handler::boxed(ErrorPage {
                print_errors: self.config.print_errors,
            })
        });
        // The 404 pipeline shares the global before-handlers; the error
        // pipeline does not run them a second time.
        let not_found = Route::pseudo("not_found", self.routes.global_before(), not_found_handler);
        let error_page = Route::pseudo("error", &[], error_handler);
        info!(
            routes = self.routes.len(),
            providers = self.providers.len(),
            base_path = %self.config.base_path,
            "Server built"
        );
        Server {
            routes: self.routes,
            providers: self.providers,
            config: self.config,
            not_found,
            error_page,
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}

impl Server {
    pub fn builder(routes: RoutesCollection) -> ServerBuilder {
        ServerBuilder::new(routes)
    }

    pub fn routes(&self) -> &RoutesCollection {
        &self.routes
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Dispatch one request. Never fails: handler errors and panics end in
    /// the error pipeline, unmatched requests in the not-found pipeline.
    pub fn dispatch(&self, request: SharedRequest, response: SharedResponse) -> Dispatched {
        let start = Instant::now();
        let request_id = RequestId::from_header_or_new(request.header(REQUEST_ID_HEADER));
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.path()
        );
        let _entered = span.enter();

        let mut request = request;
        let mut response = response;
        let root = self.root_scope(request_id);
        stamp_request_id(&response, request_id);

        let attempt = caught(panic::catch_unwind(AssertUnwindSafe(|| {
            self.routes
                .handle(&mut request, &mut response, &root, &self.config.base_path)
        })));
        let outcome = match attempt {
            Ok(true) => DispatchOutcome::Handled,
            Ok(false) => {
                warn!("No route matched");
                match self.run_not_found(&mut request, &mut response, &root) {
                    Ok(()) => DispatchOutcome::NotFound,
                    Err(err) => self.fail(err, &mut request, &mut response, &root, request_id),
                }
            }
            Err(err) => self.fail(err, &mut request, &mut response, &root, request_id),
        };

        let elapsed = start.elapsed();
        self.metrics.record(outcome, elapsed);
        info!(
            status = response.borrow().status(),
            outcome = ?outcome,
            latency_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "Request dispatched"
        );
        Dispatched {
            outcome,
            request_id,
            request,
            response,
        }
    }

    fn root_scope(&self, request_id: RequestId) -> Scope {
        let mut scope = Scope::new();
        for provide in &self.providers {
            (**provide)(&mut scope);
        }
        scope.bind_typed(REQUEST_ID, request_id);
        scope
    }

    fn run_not_found(
        &self,
        request: &mut SharedRequest,
        response: &mut SharedResponse,
        root: &Scope,
    ) -> anyhow::Result<()> {
        let handled = caught(panic::catch_unwind(AssertUnwindSafe(|| {
            self.not_found.handle_forced(request, response, root)
        })))?;
        if !handled {
            debug!("Not-found pipeline rejected, answering with a bare 404");
            write_page(&mut *response.borrow_mut(), 404, status_reason(404));
        }
        Ok(())
    }

    fn fail(
        &self,
        err: anyhow::Error,
        request: &mut SharedRequest,
        response: &mut SharedResponse,
        root: &Scope,
        request_id: RequestId,
    ) -> DispatchOutcome {
        error!(error = %format!("{err:#}"), "Request handler failed");
        response.borrow_mut().clear();
        stamp_request_id(response, request_id);

        let mut scope = root.clone();
        scope.bind_typed(ERROR, DispatchFailure::new(err));
        let result = caught(panic::catch_unwind(AssertUnwindSafe(|| {
            self.error_page.handle_forced(request, response, &scope)
        })));
        if let Err(second) = result {
            error!(error = %format!("{second:#}"), "Error pipeline failed");
            let mut res = response.borrow_mut();
            res.clear();
            write_page(&mut *res, 500, GENERIC_500);
        }
        DispatchOutcome::Failed
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("routes", &self.routes.len())
            .field("providers", &self.providers.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Turn a caught panic into an ordinary handler error.
fn caught<T>(result: std::thread::Result<anyhow::Result<T>>) -> anyhow::Result<T> {
    result.unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Err(anyhow!("handler panicked: {message}"))
    })
}

fn stamp_request_id(response: &SharedResponse, request_id: RequestId) {
    let mut res = response.borrow_mut();
    if res.headers_sent() {
        return;
    }
    if let Err(err) = res.set_header(REQUEST_ID_HEADER, &request_id.to_string()) {
        debug!(error = %err, "Could not stamp request id");
    }
}

/// Status, plain-text content type and body; status and headers are
/// skipped once sent.
fn write_page(res: &mut dyn Response, status: u16, body: &str) {
    if !res.headers_sent() {
        let headers = res
            .set_status(status)
            .and_then(|()| res.set_header("Content-Type", "text/plain; charset=utf-8"));
        if let Err(err) = headers {
            warn!(error = %err, status, "Could not write status page headers");
        }
    }
    res.append_body(body.as_bytes());
}

/// Default terminal handler of the not-found pipeline.
struct NotFoundPage;

impl Handler for NotFoundPage {
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()> {
        let response = scope
            .resolve::<SharedResponse>(crate::router::RESPONSE)
            .ok_or_else(|| anyhow!("no response bound in scope"))?;
        write_page(&mut *response.borrow_mut(), 404, status_reason(404));
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "not_found_page"
    }
}

/// Default terminal handler of the error pipeline.
struct ErrorPage {
    print_errors: bool,
}

impl Handler for ErrorPage {
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()> {
        let response = scope
            .resolve::<SharedResponse>(crate::router::RESPONSE)
            .ok_or_else(|| anyhow!("no response bound in scope"))?;
        let body = match scope.resolve::<DispatchFailure>(ERROR) {
            Some(failure) if self.print_errors => failure.report(),
            _ => GENERIC_500.to_string(),
        };
        write_page(&mut *response.borrow_mut(), 500, &body);
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "error_page"
    }
}
