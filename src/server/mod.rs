//! # Server Module
//!
//! Request and response abstractions, the dispatch loop and an HTTP
//! adapter.
//!
//! [`Server::dispatch`] builds one root scope per request from the
//! registered providers, walks the routes in order, and falls back to the
//! not-found pipeline (global before-handlers plus a 404 handler) or, when
//! a handler fails or panics, to the error pipeline. It is the only place
//! where handler errors are caught.

pub mod http_server;
pub mod metrics;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use metrics::DispatchMetrics;
pub use request::{MemoryRequest, Request, SharedRequest};
pub use response::{status_reason, BufferedResponse, Response, ResponseError, SharedResponse};
pub use service::{
    DispatchFailure, DispatchOutcome, Dispatched, Provider, Server, ServerBuilder, ERROR, REQUEST_ID,
};
