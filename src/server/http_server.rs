//! `tiny_http` adapter: a fixed pool of worker threads pulling requests off
//! one listener and running each through [`Server::dispatch`].

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::request::MemoryRequest;
use super::response::{status_reason, BufferedResponse};
use super::service::Server;

/// Default request body limit; larger bodies get 413 Payload Too Large.
pub const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct HttpServer {
    app: Arc<Server>,
    workers: usize,
    max_body_bytes: u64,
}

pub struct ServerHandle {
    addr: SocketAddr,
    listener: Arc<tiny_http::Server>,
    stopping: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll until the listener accepts TCP connections.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting requests and wait for the workers to finish the
    /// requests they are on.
    pub fn stop(self) {
        self.stopping.store(true, Ordering::SeqCst);
        for _ in 0..self.workers.len() {
            self.listener.unblock();
        }
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("HTTP worker panicked during shutdown");
            }
        }
        info!(addr = %self.addr, "HTTP server stopped");
    }

    /// Block until every worker exits.
    pub fn join(self) -> thread::Result<()> {
        for worker in self.workers {
            worker.join()?;
        }
        Ok(())
    }
}

impl HttpServer {
    pub fn new(app: Arc<Server>) -> Self {
        let workers = app.config().workers.max(1);
        let max_body_bytes = app.config().max_body_bytes;
        Self {
            app,
            workers,
            max_body_bytes,
        }
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Bind `addr` and spawn the workers.
    ///
    /// # Errors
    ///
    /// Address resolution or bind failures.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let listener = tiny_http::Server::http(addr).map_err(|e| io::Error::other(e.to_string()))?;
        let addr = listener.server_addr().to_ip().unwrap_or(addr);
        let listener = Arc::new(listener);
        let stopping = Arc::new(AtomicBool::new(false));

        let workers = (0..self.workers)
            .map(|i| {
                let app = Arc::clone(&self.app);
                let listener = Arc::clone(&listener);
                let stopping = Arc::clone(&stopping);
                let limit = self.max_body_bytes;
                thread::Builder::new()
                    .name(format!("routescope-http-{i}"))
                    .spawn(move || worker_loop(&app, &listener, &stopping, limit))
            })
            .collect::<io::Result<Vec<_>>>()?;

        info!(addr = %addr, workers = workers.len(), "HTTP server listening");
        Ok(ServerHandle {
            addr,
            listener,
            stopping,
            workers,
        })
    }
}

fn worker_loop(app: &Server, listener: &tiny_http::Server, stopping: &AtomicBool, limit: u64) {
    while !stopping.load(Ordering::SeqCst) {
        match listener.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => {
                if let Err(err) = serve_one(app, request, limit) {
                    debug!(error = %err, "Failed to write response");
                }
            }
            Ok(None) => {}
            Err(err) => {
                if !stopping.load(Ordering::SeqCst) {
                    warn!(error = %err, "Listener error");
                }
            }
        }
    }
}

/// Read the whole body, or `None` when it is larger than `limit`.
fn read_body(request: &mut tiny_http::Request, limit: u64) -> io::Result<Option<Vec<u8>>> {
    let declared = request.body_length().map(|n| u64::try_from(n).unwrap_or(u64::MAX));
    if declared.is_some_and(|n| n > limit) {
        return Ok(None);
    }
    let mut body = Vec::new();
    request
        .as_reader()
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)?;
    if u64::try_from(body.len()).unwrap_or(u64::MAX) > limit {
        return Ok(None);
    }
    Ok(Some(body))
}

fn serve_one(app: &Server, mut request: tiny_http::Request, limit: u64) -> io::Result<()> {
    let Some(body) = read_body(&mut request, limit)? else {
        warn!(
            method = %request.method(),
            url = %request.url(),
            limit,
            "Request body too large"
        );
        let refused = tiny_http::Response::from_string(status_reason(413)).with_status_code(413);
        return request.respond(refused);
    };

    let mut inbound = MemoryRequest::new(request.method().as_str(), request.url()).with_body(body);
    let mut secure = false;
    for header in request.headers() {
        let name = header.field.as_str().as_str();
        let value = header.value.as_str();
        if name.eq_ignore_ascii_case("x-forwarded-proto") {
            secure = value.eq_ignore_ascii_case("https");
        }
        inbound = inbound.with_header(name, value);
    }
    let inbound = inbound.secure(secure);

    let dispatched = app.dispatch(inbound.into_shared(), BufferedResponse::new().into_shared());
    let outbound = {
        let res = dispatched.response.borrow();
        let mut out = tiny_http::Response::from_data(res.body().to_vec()).with_status_code(res.status());
        for (name, value) in res.headers() {
            match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                Ok(header) => out.add_header(header),
                Err(()) => warn!(header = %name, "Dropping invalid response header"),
            }
        }
        out
    };
    request.respond(outbound)
}
