//! # routescope
//!
//! **routescope** is a small synchronous web framework built around three
//! ideas: URL patterns with named variables, route pipelines of
//! before-handlers, one handler and after-handlers, and a per-request
//! [`Scope`](scope::Scope) that injects every handler's inputs by name or
//! by type.
//!
//! ## Architecture
//!
//! - **[`scope`]** - Copy-on-write variable environment and handler injection
//! - **[`router`]** - URL patterns, routes and the ordered route collection
//! - **[`server`]** - Request/response traits, the dispatch loop and a
//!   `tiny_http` adapter
//! - **[`db`]** - Lazy, immutable query builder over any connection
//! - **[`static_files`]** - File lookup and content-type detection for
//!   static routes
//! - **[`config`]** / **[`logging`]** - YAML/TOML settings and `tracing` setup
//! - **[`cli`]** - `serve` and `routes` commands
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Adapter as HttpServer<br/>(tiny_http)
//!     participant Server as Server::dispatch
//!     participant Routes as RoutesCollection
//!     participant Route
//!     participant Handler
//!
//!     Adapter->>Server: MemoryRequest + BufferedResponse
//!     Server->>Server: Root scope from providers<br/>(request_id bound)
//!     loop each route, in order
//!         Server->>Routes: handle(request, response, scope)
//!         Routes->>Route: method + pattern match
//!         Route->>Route: Clone scope, bind URL variables
//!         Route->>Handler: before-handlers
//!         alt is_right_resource = false
//!             Route-->>Routes: try next route
//!         end
//!         Route->>Handler: handler, then after-handlers
//!         Route-->>Server: handled<br/>(request/response written back)
//!     end
//!     alt nothing matched
//!         Server->>Server: global befores + 404 handler
//!     end
//!     alt handler error or panic
//!         Server->>Server: error pipeline (500)
//!     end
//!     Server-->>Adapter: Dispatched
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use routescope::router::{Exchange, RoutesCollection};
//! use routescope::scope::{handler, FromScope, Resolver, Slot};
//! use routescope::server::{BufferedResponse, MemoryRequest, Server};
//!
//! struct Greeting {
//!     ex: Exchange,
//!     name: Slot<String>,
//! }
//!
//! impl FromScope for Greeting {
//!     fn from_scope(r: &mut Resolver<'_>) -> Self {
//!         Self {
//!             ex: Exchange::from_scope(r),
//!             name: r.named("name"),
//!         }
//!     }
//! }
//!
//! let mut routes = RoutesCollection::new();
//! routes
//!     .register("/hello/{name}", "GET", handler::from_fn(|g: Greeting| {
//!         let name = g.name.get().unwrap_or_default();
//!         g.ex.with_response(|res| res.append_body(format!("hello {name}").as_bytes()))?;
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let app = Server::builder(routes).build();
//! let out = app.dispatch(
//!     MemoryRequest::get("/hello/ada").into_shared(),
//!     BufferedResponse::new().into_shared(),
//! );
//! assert_eq!(out.response.borrow().body(), b"hello ada");
//! ```
//!
//! ## Runtime Considerations
//!
//! Scopes, requests and responses are `Rc`-based and live on the worker
//! thread that dispatches them. Handlers, providers and the route table are
//! `Send + Sync` and shared between workers.

pub mod cli;
pub mod config;
pub mod db;
pub mod ids;
pub mod logging;
pub mod router;
pub mod scope;
pub mod server;
pub mod static_files;

pub use config::AppConfig;
pub use router::{Route, RoutesCollection, UrlPattern};
pub use scope::{handler, FromScope, Handler, Scope, Slot};
pub use server::{Server, ServerBuilder};
