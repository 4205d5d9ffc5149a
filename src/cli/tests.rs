//! Unit tests for CLI commands

use std::sync::Arc;

use clap::Parser;

use crate::cli::{build_app, build_routes, Cli, Commands};
use crate::config::{AppConfig, StaticMount};
use crate::server::{BufferedResponse, DispatchMetrics, DispatchOutcome, MemoryRequest, Request, Response};

#[test]
fn test_serve_command_with_flags() {
    let cli = Cli::try_parse_from([
        "routescope",
        "serve",
        "--config",
        "app.yaml",
        "--addr",
        "127.0.0.1:9000",
        "--print-errors",
    ])
    .unwrap();

    match cli.command {
        Commands::Serve {
            config,
            addr,
            print_errors,
        } => {
            assert_eq!(config.to_string_lossy(), "app.yaml");
            assert_eq!(addr.as_deref(), Some("127.0.0.1:9000"));
            assert!(print_errors);
        }
        Commands::Routes { .. } => panic!("Expected Serve command"),
    }
}

#[test]
fn test_routes_command() {
    let cli = Cli::try_parse_from(["routescope", "routes", "-c", "app.toml"]).unwrap();
    assert!(matches!(cli.command, Commands::Routes { .. }));
    assert!(Cli::try_parse_from(["routescope", "routes"]).is_err());
}

#[test]
fn test_route_table_lists_mounts_first() {
    let config = AppConfig {
        static_dirs: vec![StaticMount {
            path: "public".into(),
            url_prefix: "/assets".to_string(),
        }],
        ..AppConfig::default()
    };
    let routes = build_routes(&config, &Arc::new(DispatchMetrics::new())).unwrap();
    assert_eq!(routes.len(), 3);
    assert_eq!(routes.routes()[0].route_name(), Some("static:/assets"));
    assert!(routes.find("health").is_some());
    assert!(routes.find("metrics").is_some());
}

#[test]
fn test_health_and_metrics_routes() {
    let app = build_app(&AppConfig::default()).unwrap();

    let res = BufferedResponse::new().into_shared();
    let out = app.dispatch(MemoryRequest::get("/health").into_shared(), res);
    assert_eq!(out.outcome, DispatchOutcome::Handled);
    let response = out.response.borrow();
    assert_eq!(response.status(), 200);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.body(), br#"{"status":"ok"}"#);
    drop(response);

    let out = app.dispatch(
        MemoryRequest::get("/metrics").into_shared(),
        BufferedResponse::new().into_shared(),
    );
    let body = String::from_utf8(out.response.borrow().body().to_vec()).unwrap();
    assert!(body.contains("routescope_requests_total 1"), "{body}");
    assert_eq!(out.request.path(), "/metrics");
}
