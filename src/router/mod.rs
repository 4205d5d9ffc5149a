//! # Router Module
//!
//! Matches requests to routes and runs each route's handler pipeline.
//!
//! ## Overview
//!
//! - [`UrlPattern`] compiles a path template such as `/users/{id}` into an
//!   anchored regex, extracts URL-decoded variables and builds URLs back.
//! - [`Route`] owns alternative patterns, a method regex, before-handlers,
//!   one terminal handler and after-handlers, and runs them against a
//!   cloned [`Scope`](crate::scope::Scope).
//! - [`RoutesCollection`] keeps routes in registration order under a
//!   shared prefix and global before-handlers, and generates static file
//!   and redirect routes.
//!
//! ## Control flow
//!
//! Before-handlers steer the route through three boolean bindings, most
//! conveniently through the [`Control`] extractor:
//!
//! | binding              | set to  | effect                                   |
//! |----------------------|---------|------------------------------------------|
//! | `is_right_resource`  | `false` | route does not apply, try the next one   |
//! | `call_handler`       | `false` | handled, skip the handler and after chain|
//! | `stop_route`         | `true`  | handled, stop here                       |
//!
//! ## Example
//!
//! ```rust
//! use routescope::router::{Exchange, RoutesCollection};
//! use routescope::scope::{handler, Scope};
//! use routescope::server::{BufferedResponse, MemoryRequest};
//!
//! let mut routes = RoutesCollection::new();
//! routes
//!     .register("/hello/{name}", "GET", handler::from_fn(|ex: Exchange| {
//!         ex.with_response(|res| res.append_body(b"hi"))?;
//!         Ok(())
//!     }))
//!     .unwrap()
//!     .name("hello");
//!
//! let mut request = MemoryRequest::get("/hello/bob").into_shared();
//! let mut response = BufferedResponse::new().into_shared();
//! assert!(routes.handle(&mut request, &mut response, &Scope::new(), "").unwrap());
//! assert_eq!(response.borrow().body(), b"hi");
//! assert_eq!(routes.url_for("hello", [("name", "alice")]).unwrap(), "/hello/alice");
//! ```

mod collection;
mod error;
mod pattern;
mod route;
#[cfg(test)]
mod tests;

pub use collection::RoutesCollection;
pub use error::RouteError;
pub use pattern::{param, ParamVec, UrlPattern, DEFAULT_VARIABLE_REGEX, MAX_INLINE_PARAMS};
pub use route::{Control, Exchange, Route, CALL_HANDLER, IS_RIGHT_RESOURCE, REQUEST, RESPONSE, STOP_ROUTE};
