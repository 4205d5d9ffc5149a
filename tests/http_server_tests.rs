use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use routescope::cli::build_app;
use routescope::config::{AppConfig, StaticMount};
use routescope::router::{Exchange, RoutesCollection};
use routescope::scope::handler;
use routescope::server::{HttpServer, Server, ServerHandle};

mod common;
use common::http::{body, get, send_request, status_line};

fn start(app: Server) -> ServerHandle {
    let handle = HttpServer::new(Arc::new(app))
        .workers(2)
        .start("127.0.0.1:0")
        .unwrap();
    handle.wait_ready().unwrap();
    handle
}

#[test]
fn test_health_and_static_over_tcp() {
    let config = AppConfig {
        static_dirs: vec![StaticMount {
            path: "tests/staticdata".into(),
            url_prefix: "/static".to_string(),
        }],
        ..AppConfig::default()
    };
    let handle = start(build_app(&config).unwrap());
    let addr = handle.addr();

    let resp = get(&addr, "/health");
    assert!(status_line(&resp).contains("200"), "{resp}");
    assert_eq!(body(&resp), r#"{"status":"ok"}"#);
    assert!(resp.to_ascii_lowercase().contains("x-request-id:"));

    let resp = get(&addr, "/static/hello.txt");
    assert!(status_line(&resp).contains("200"), "{resp}");
    assert_eq!(body(&resp), "Hello\n");

    let resp = get(&addr, "/static/absent.txt");
    assert!(status_line(&resp).contains("404"), "{resp}");

    let resp = get(&addr, "/metrics");
    assert!(body(&resp).contains("routescope_requests_total 3"), "{resp}");

    handle.stop();
}

#[test]
fn test_body_and_forwarded_proto_reach_handlers() {
    let mut routes = RoutesCollection::new();
    routes
        .register(
            "/echo",
            "POST",
            handler::from_fn(|ex: Exchange| {
                let req = ex.request()?;
                let scheme = if req.is_secure_transport() { "https" } else { "http" };
                let mut out = format!("{scheme}:").into_bytes();
                out.extend_from_slice(req.raw_body());
                ex.with_response(|res| res.append_body(&out))?;
                Ok(())
            }),
        )
        .unwrap();
    let handle = start(Server::builder(routes).build());

    let resp = send_request(
        &handle.addr(),
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nX-Forwarded-Proto: https\r\n\
         Content-Length: 5\r\nConnection: close\r\n\r\nhello",
    );
    assert_eq!(body(&resp), "https:hello");
    handle.stop();
}

#[test]
fn test_oversized_body_is_refused_before_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut routes = RoutesCollection::new();
    routes
        .register(
            "/len",
            "POST",
            handler::from_fn(move |ex: Exchange| {
                counter.fetch_add(1, Ordering::SeqCst);
                let len = ex.request()?.raw_body().len();
                ex.with_response(|res| res.append_body(len.to_string().as_bytes()))?;
                Ok(())
            }),
        )
        .unwrap();
    let handle = HttpServer::new(Arc::new(Server::builder(routes).build()))
        .workers(1)
        .max_body_bytes(16)
        .start("127.0.0.1:0")
        .unwrap();
    handle.wait_ready().unwrap();
    let addr = handle.addr();

    let post = |payload: &str| {
        send_request(
            &addr,
            &format!(
                "POST /len HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n{payload}",
                payload.len()
            ),
        )
    };

    let resp = post("0123456789abcdef");
    assert!(status_line(&resp).contains("200"), "{resp}");
    assert_eq!(body(&resp), "16");

    let resp = post("0123456789abcdefXYZW");
    assert!(status_line(&resp).contains("413"), "{resp}");
    assert_eq!(body(&resp), "Payload Too Large");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.stop();
}
