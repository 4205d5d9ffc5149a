//! A single route and its per-request state machine.
//!
//! ```text
//! NotAttempted -> MethodChecked -> URLChecked -> BeforeChain[i] -> Handler -> AfterChain[i] -> Done
//!                      |               |              |
//!                      +--- Rejected --+-- Rejected --+-- Done (short-circuit)
//! ```

use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use regex::Regex;
use tracing::{debug, trace, warn};

use super::error::RouteError;
use super::pattern::{ParamVec, UrlPattern};
use crate::scope::{handler, BoxedHandler, FromScope, Handler, Resolver, Scope, Slot};
use crate::server::{Response, SharedRequest, SharedResponse};

/// Scope binding holding the current [`SharedRequest`].
pub const REQUEST: &str = "request";
/// Scope binding holding the current [`SharedResponse`].
pub const RESPONSE: &str = "response";
/// Set to `false` by a before-handler when the route does not apply.
pub const IS_RIGHT_RESOURCE: &str = "is_right_resource";
/// Set to `false` by a before-handler that answered on the handler's behalf.
pub const CALL_HANDLER: &str = "call_handler";
/// Set to `true` by a before-handler that finished the request.
pub const STOP_ROUTE: &str = "stop_route";

const SLOW_MATCH: Duration = Duration::from_millis(1);

/// Pipeline control variables, resolved by reference.
///
/// ```
/// use routescope::router::Control;
/// use routescope::scope::handler;
///
/// // Existence check: a missing entity means "try the next route".
/// let exists = handler::from_fn(|control: Control| {
///     control.reject();
///     Ok(())
/// });
/// # let _ = exists;
/// ```
#[derive(Debug, Clone)]
pub struct Control {
    is_right_resource: Slot<bool>,
    call_handler: Slot<bool>,
    stop_route: Slot<bool>,
}

impl FromScope for Control {
    fn from_scope(r: &mut Resolver<'_>) -> Self {
        Self {
            is_right_resource: r.named(IS_RIGHT_RESOURCE),
            call_handler: r.named(CALL_HANDLER),
            stop_route: r.named(STOP_ROUTE),
        }
    }
}

impl Control {
    /// This route does not apply; the collection tries the next one.
    pub fn reject(&self) {
        self.is_right_resource.set(false);
    }

    /// The request is handled but the terminal handler must not run.
    pub fn skip_handler(&self) {
        self.call_handler.set(false);
    }

    /// The request is fully answered; nothing else in this route runs.
    pub fn stop_route(&self) {
        self.stop_route.set(true);
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        !self.is_right_resource.get().unwrap_or(false)
    }
}

/// The current request and response, resolved by reference.
///
/// Replacing either slot (for example with a decorator) changes what every
/// later handler sees and what the caller gets back.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: Slot<SharedRequest>,
    pub response: Slot<SharedResponse>,
}

impl FromScope for Exchange {
    fn from_scope(r: &mut Resolver<'_>) -> Self {
        Self {
            request: r.typed(REQUEST),
            response: r.typed(RESPONSE),
        }
    }
}

impl Exchange {
    /// # Errors
    ///
    /// Fails when no request is bound.
    pub fn request(&self) -> anyhow::Result<SharedRequest> {
        self.request.get().ok_or_else(|| anyhow!("no request bound in scope"))
    }

    /// # Errors
    ///
    /// Fails when no response is bound.
    pub fn response(&self) -> anyhow::Result<SharedResponse> {
        self.response.get().ok_or_else(|| anyhow!("no response bound in scope"))
    }

    /// Run `f` against the current response.
    ///
    /// # Errors
    ///
    /// Fails when no response is bound.
    pub fn with_response<R>(&self, f: impl FnOnce(&mut dyn Response) -> R) -> anyhow::Result<R> {
        let response = self.response()?;
        let mut guard = response.borrow_mut();
        Ok(f(&mut *guard))
    }
}

/// Routes a request to a terminal handler through before and after chains.
pub struct Route {
    patterns: Vec<UrlPattern>,
    /// `None` for pseudo-routes, which never match a request.
    method: Option<Regex>,
    method_source: String,
    name: Option<String>,
    before: Vec<BoxedHandler>,
    handler: Option<BoxedHandler>,
    after: Vec<BoxedHandler>,
}

impl Route {
    /// A route for one URL pattern and a method regex (`GET`, `GET|POST`, `.*`).
    ///
    /// The method regex is anchored and case-insensitive.
    ///
    /// # Errors
    ///
    /// Invalid pattern or method regex.
    pub fn new(pattern: &str, method: &str) -> Result<Self, RouteError> {
        let mut route = Self::without_pattern(method)?;
        route.add_pattern(pattern)?;
        Ok(route)
    }

    /// A route without URL patterns: it matches only an empty remaining
    /// path (`""` or `"/"`).
    ///
    /// # Errors
    ///
    /// Invalid method regex.
    pub fn without_pattern(method: &str) -> Result<Self, RouteError> {
        let method_regex =
            Regex::new(&format!("(?i)^(?:{method})$")).map_err(|source| RouteError::InvalidRegex {
                name: format!("method {method}"),
                source,
            })?;
        Ok(Self {
            patterns: Vec::new(),
            method: Some(method_regex),
            method_source: method.to_string(),
            name: None,
            before: Vec::new(),
            handler: None,
            after: Vec::new(),
        })
    }

    /// Synthetic route for the fallback pipelines; it is only ever run
    /// through [`Route::handle_forced`].
    pub(crate) fn pseudo(label: &str, before: &[BoxedHandler], handler: BoxedHandler) -> Self {
        Self {
            patterns: Vec::new(),
            method: None,
            method_source: String::new(),
            name: Some(label.to_string()),
            before: before.to_vec(),
            handler: Some(handler),
            after: Vec::new(),
        }
    }

    /// Add an alternative URL pattern. The first matching pattern wins.
    ///
    /// # Errors
    ///
    /// Invalid pattern.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<&mut Self, RouteError> {
        self.patterns.push(UrlPattern::new(pattern)?);
        Ok(self)
    }

    /// Narrow `variable` in every pattern that declares it.
    ///
    /// # Errors
    ///
    /// [`RouteError::UnknownVariable`] when no pattern declares it.
    pub fn pattern(&mut self, variable: &str, regex: &str) -> Result<&mut Self, RouteError> {
        let mut found = false;
        for pattern in self.patterns.iter_mut().filter(|p| p.has_variable(variable)) {
            pattern.set_variable_pattern(variable, regex)?;
            found = true;
        }
        if !found {
            return Err(RouteError::UnknownVariable {
                pattern: self
                    .patterns
                    .iter()
                    .map(UrlPattern::original)
                    .collect::<Vec<_>>()
                    .join(" | "),
                name: variable.to_string(),
            });
        }
        Ok(self)
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn before<H: Handler>(&mut self, h: H) -> &mut Self {
        self.before_boxed(handler::boxed(h))
    }

    pub fn before_boxed(&mut self, h: BoxedHandler) -> &mut Self {
        self.before.push(h);
        self
    }

    pub fn handler<H: Handler>(&mut self, h: H) -> &mut Self {
        self.handler_boxed(handler::boxed(h))
    }

    pub fn handler_boxed(&mut self, h: BoxedHandler) -> &mut Self {
        self.handler = Some(h);
        self
    }

    pub fn after<H: Handler>(&mut self, h: H) -> &mut Self {
        self.after_boxed(handler::boxed(h))
    }

    pub fn after_boxed(&mut self, h: BoxedHandler) -> &mut Self {
        self.after.push(h);
        self
    }

    #[must_use]
    pub fn route_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn patterns(&self) -> &[UrlPattern] {
        &self.patterns
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method_source
    }

    #[must_use]
    pub fn before_count(&self) -> usize {
        self.before.len()
    }

    #[must_use]
    pub fn after_count(&self) -> usize {
        self.after.len()
    }

    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Name, else first pattern, else the method; used in logs.
    #[must_use]
    pub fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.patterns.first().map(|p| p.original().to_string()))
            .unwrap_or_else(|| format!("<{}>", self.method_source))
    }

    /// Build a URL from the first pattern.
    ///
    /// # Errors
    ///
    /// [`RouteError::NoPattern`] or any [`UrlPattern::build_url`] error.
    pub fn url<I, K, V>(&self, values: I) -> Result<String, RouteError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.patterns
            .first()
            .ok_or_else(|| RouteError::NoPattern(self.label()))?
            .build_url(values)
    }

    /// Method and URL checks only. Returns the matched variables.
    #[must_use]
    pub fn matches(&self, method: &str, path: &str, prefix: &str) -> Option<ParamVec> {
        if !self.method.as_ref().is_some_and(|re| re.is_match(method)) {
            trace!(route = %self.label(), method = %method, "Method rejected");
            return None;
        }
        let rest = if prefix.is_empty() {
            path
        } else {
            path.strip_prefix(prefix)?
        };
        if self.patterns.is_empty() {
            return matches!(rest, "" | "/").then(ParamVec::new);
        }
        self.patterns.iter().find_map(|p| p.matches(rest))
    }

    /// Try to handle the request.
    ///
    /// Returns `Ok(false)` when the route does not apply (method or URL
    /// mismatch, or a before-handler rejected it) and `Ok(true)` when it
    /// handled the request, including short-circuits. Handler errors
    /// propagate unmodified.
    ///
    /// On `Ok(true)` the request and response handles are replaced by
    /// whatever the pipeline left bound, so decorators installed by filters
    /// reach the caller.
    ///
    /// # Errors
    ///
    /// Whatever a handler returned, or [`RouteError::MissingHandler`].
    pub fn handle(
        &self,
        request: &mut SharedRequest,
        response: &mut SharedResponse,
        parent: &Scope,
        prefix: &str,
    ) -> anyhow::Result<bool> {
        let start = Instant::now();
        let matched = self.matches(request.method(), request.path(), prefix);
        let elapsed = start.elapsed();
        if elapsed > SLOW_MATCH {
            warn!(
                route = %self.label(),
                path = %request.path(),
                elapsed_us = elapsed.as_micros(),
                "Slow route match"
            );
        }
        let Some(vars) = matched else {
            return Ok(false);
        };
        debug!(
            route = %self.label(),
            path = %request.path(),
            params = vars.len(),
            "Route matched"
        );
        self.run(vars, request, response, parent)
    }

    /// Run the pipeline without method or URL checks.
    ///
    /// # Errors
    ///
    /// Same as [`Route::handle`].
    pub fn handle_forced(
        &self,
        request: &mut SharedRequest,
        response: &mut SharedResponse,
        parent: &Scope,
    ) -> anyhow::Result<bool> {
        self.run(ParamVec::new(), request, response, parent)
    }

    fn run(
        &self,
        vars: ParamVec,
        request: &mut SharedRequest,
        response: &mut SharedResponse,
        parent: &Scope,
    ) -> anyhow::Result<bool> {
        let mut scope = parent.clone();
        for (name, value) in vars {
            scope.bind(name.as_ref(), value);
        }
        for name in [REQUEST, RESPONSE, IS_RIGHT_RESOURCE, CALL_HANDLER, STOP_ROUTE] {
            if !scope.is_pass_by_reference(name) {
                scope.set_pass_by_reference(name, true);
            }
        }
        scope
            .bind_typed(REQUEST, Rc::clone(request))
            .bind_typed(RESPONSE, Rc::clone(response))
            .bind(IS_RIGHT_RESOURCE, true)
            .bind(CALL_HANDLER, true)
            .bind(STOP_ROUTE, false);

        for (i, before) in self.before.iter().enumerate() {
            before.call(&mut scope)?;
            match Verdict::read(&mut scope) {
                Verdict::Continue => {}
                Verdict::Rejected => {
                    debug!(route = %self.label(), step = i, handler = before.describe(), "Route rejected by before handler");
                    return Ok(false);
                }
                Verdict::SkipHandler | Verdict::Stop => {
                    debug!(route = %self.label(), step = i, handler = before.describe(), "Route finished by before handler");
                    write_back(&mut scope, request, response);
                    return Ok(true);
                }
            }
        }

        let terminal = self.handler.as_ref().ok_or_else(|| RouteError::MissingHandler {
            route: self.label(),
        })?;
        terminal.call(&mut scope)?;

        for after in &self.after {
            after.call(&mut scope)?;
        }

        write_back(&mut scope, request, response);
        Ok(true)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("method", &self.method_source)
            .field("patterns", &self.patterns)
            .field("before", &self.before.len())
            .field("has_handler", &self.handler.is_some())
            .field("after", &self.after.len())
            .finish()
    }
}

/// State of the control variables after a before-handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Continue,
    Rejected,
    SkipHandler,
    Stop,
}

impl Verdict {
    /// Null or non-boolean control values count as false.
    fn read(scope: &mut Scope) -> Self {
        if !scope.resolve::<bool>(IS_RIGHT_RESOURCE).unwrap_or(false) {
            Self::Rejected
        } else if !scope.resolve::<bool>(CALL_HANDLER).unwrap_or(false) {
            Self::SkipHandler
        } else if scope.resolve::<bool>(STOP_ROUTE).unwrap_or(false) {
            Self::Stop
        } else {
            Self::Continue
        }
    }
}

fn write_back(scope: &mut Scope, request: &mut SharedRequest, response: &mut SharedResponse) {
    if let Some(r) = scope.resolve::<SharedRequest>(REQUEST) {
        *request = r;
    }
    if let Some(r) = scope.resolve::<SharedResponse>(RESPONSE) {
        *response = r;
    }
}
