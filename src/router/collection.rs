use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use super::error::RouteError;
use super::pattern::{encode_path_value, split_template, UrlPattern};
use super::route::{Exchange, Route};
use crate::scope::{handler, BoxedHandler, Handler, Scope};
use crate::server::{ResponseError, SharedRequest, SharedResponse};
use crate::static_files::{StaticFiles, StaticLookup, StaticServe, FILE_VARIABLE};

/// Ordered routes sharing a URL prefix and a set of global before-handlers.
#[derive(Default)]
pub struct RoutesCollection {
    routes: Vec<Route>,
    prefix: String,
    before: Vec<BoxedHandler>,
}

impl RoutesCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Change the prefix prepended to every registered pattern.
    ///
    /// # Errors
    ///
    /// [`RouteError::PrefixLocked`] once any route is registered.
    pub fn set_prefix(&mut self, prefix: impl Into<String>) -> Result<&mut Self, RouteError> {
        let prefix = prefix.into();
        if !self.routes.is_empty() && prefix != self.prefix {
            return Err(RouteError::PrefixLocked {
                current: self.prefix.clone(),
                requested: prefix,
            });
        }
        self.prefix = prefix;
        Ok(self)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Add a global before-handler. It applies to routes registered from
    /// now on, not to existing ones.
    pub fn before<H: Handler>(&mut self, h: H) -> &mut Self {
        self.before_boxed(handler::boxed(h))
    }

    pub fn before_boxed(&mut self, h: BoxedHandler) -> &mut Self {
        self.before.push(h);
        self
    }

    /// Global before-handlers registered so far.
    #[must_use]
    pub fn global_before(&self) -> &[BoxedHandler] {
        &self.before
    }

    /// Register `prefix + pattern` for a method regex.
    ///
    /// # Errors
    ///
    /// Invalid pattern or method regex.
    pub fn register<H: Handler>(&mut self, pattern: &str, method: &str, h: H) -> Result<&mut Route, RouteError> {
        self.register_boxed(pattern, method, handler::boxed(h))
    }

    /// # Errors
    ///
    /// Invalid pattern or method regex.
    pub fn register_boxed(&mut self, pattern: &str, method: &str, h: BoxedHandler) -> Result<&mut Route, RouteError> {
        let full = format!("{}{}", self.prefix, pattern);
        let mut route = Route::new(&full, method)?;
        for before in &self.before {
            route.before_boxed(Arc::clone(before));
        }
        route.handler_boxed(h);
        info!(
            pattern = %full,
            method = %method,
            global_before = self.before.len(),
            "Route registered"
        );
        Ok(self.push(route))
    }

    /// Append a fully built route as is. Global before-handlers are not
    /// added to it.
    pub fn push(&mut self, route: Route) -> &mut Route {
        self.routes.push(route);
        let last = self.routes.len() - 1;
        &mut self.routes[last]
    }

    /// Serve files below `fs_path` at `url_prefix/{file}`.
    ///
    /// Missing files, directories and paths escaping the root reject the
    /// route, so later routes still get a chance.
    ///
    /// # Errors
    ///
    /// Invalid prefix.
    pub fn register_static_directory(
        &mut self,
        fs_path: impl Into<PathBuf>,
        url_prefix: &str,
    ) -> Result<&mut Route, RouteError> {
        let files = Arc::new(StaticFiles::new(fs_path));
        let pattern = format!("{}/{{{FILE_VARIABLE}}}", url_prefix.trim_end_matches('/'));
        info!(
            root = %files.base_dir().display(),
            url_prefix = %url_prefix,
            "Static directory mounted"
        );
        let route = self.register(&pattern, "GET|HEAD", StaticServe)?;
        route.pattern(FILE_VARIABLE, ".+")?;
        route.before(StaticLookup::new(files));
        Ok(route)
    }

    /// Permanent redirect (301) from `pattern` to `target`.
    ///
    /// # Errors
    ///
    /// Invalid pattern, method regex or target placeholders.
    pub fn redirect(&mut self, pattern: &str, method: &str, target: &str) -> Result<&mut Route, RouteError> {
        self.redirect_with_status(pattern, method, target, 301)
    }

    /// Redirect with an explicit status code. `{name}` placeholders in
    /// `target` are filled from the matched URL variables.
    ///
    /// # Errors
    ///
    /// Invalid pattern, method regex or target placeholders, including
    /// [`RouteError::UnknownVariable`] for a placeholder `pattern` does not
    /// declare.
    pub fn redirect_with_status(
        &mut self,
        pattern: &str,
        method: &str,
        target: &str,
        status: u16,
    ) -> Result<&mut Route, RouteError> {
        let redirect = Redirect::new(target, status)?;
        let source = UrlPattern::new(pattern)?;
        if let Some(name) = redirect.variables().find(|v| !source.has_variable(v)) {
            return Err(RouteError::UnknownVariable {
                pattern: pattern.to_string(),
                name: name.to_string(),
            });
        }
        self.register(pattern, method, redirect)
    }

    /// Try each route in registration order; stop at the first that
    /// handles the request.
    ///
    /// # Errors
    ///
    /// The first handler error, unmodified.
    pub fn handle(
        &self,
        request: &mut SharedRequest,
        response: &mut SharedResponse,
        scope: &Scope,
        prefix: &str,
    ) -> anyhow::Result<bool> {
        for route in &self.routes {
            if route.handle(request, response, scope, prefix)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route with this name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.route_name() == Some(name))
    }

    /// Build the URL of the named route.
    ///
    /// # Errors
    ///
    /// [`RouteError::UnknownRoute`] or any URL building error.
    pub fn url_for<I, K, V>(&self, name: &str, values: I) -> Result<String, RouteError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.find(name)
            .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))?
            .url(values)
    }

    /// One line per route: method, patterns and name.
    #[must_use]
    pub fn route_table(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|r| {
                let patterns = r
                    .patterns()
                    .iter()
                    .map(|p| p.original())
                    .collect::<Vec<_>>()
                    .join(" | ");
                match r.route_name() {
                    Some(name) => format!("{:<10} {patterns}  ({name})", r.method()),
                    None => format!("{:<10} {patterns}", r.method()),
                }
            })
            .collect()
    }
}

impl fmt::Debug for RoutesCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutesCollection")
            .field("prefix", &self.prefix)
            .field("routes", &self.routes)
            .field("global_before", &self.before.len())
            .finish()
    }
}

#[derive(Debug)]
enum TargetPiece {
    Literal(String),
    Variable(String),
}

/// Handler writing a status code and a `Location` header.
#[derive(Debug)]
struct Redirect {
    target: Vec<TargetPiece>,
    status: u16,
}

impl Redirect {
    fn new(target: &str, status: u16) -> Result<Self, RouteError> {
        let (literals, variables) = split_template(target)?;
        let mut pieces = Vec::with_capacity(literals.len() + variables.len());
        let mut literals = literals.into_iter();
        for variable in variables {
            if let Some(lit) = literals.next() {
                pieces.push(TargetPiece::Literal(lit));
            }
            pieces.push(TargetPiece::Variable(variable.to_string()));
        }
        pieces.extend(literals.map(TargetPiece::Literal));
        Ok(Self { target: pieces, status })
    }

    fn variables(&self) -> impl Iterator<Item = &str> {
        self.target.iter().filter_map(|piece| match piece {
            TargetPiece::Variable(name) => Some(name.as_str()),
            TargetPiece::Literal(_) => None,
        })
    }

    fn location(&self, scope: &mut Scope) -> String {
        let mut location = String::new();
        for piece in &self.target {
            match piece {
                TargetPiece::Literal(s) => location.push_str(s),
                TargetPiece::Variable(name) => {
                    let value = scope.resolve::<String>(name).unwrap_or_default();
                    location.push_str(&encode_path_value(&value));
                }
            }
        }
        location
    }
}

impl Handler for Redirect {
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()> {
        let location = self.location(scope);
        debug!(status = self.status, location = %location, "Redirecting");
        let exchange = scope.invoke(|ex: Exchange| ex)?;
        exchange.with_response(|res| -> Result<(), ResponseError> {
            res.set_status(self.status)?;
            res.set_header("Location", &location)
        })??;
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "redirect"
    }
}
