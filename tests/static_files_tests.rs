use routescope::router::RoutesCollection;
use routescope::scope::handler;
use routescope::server::{DispatchOutcome, Server};
use routescope::static_files::StaticFiles;

mod common;
use common::exchange::{body, get, pair, status};

fn app() -> Server {
    let mut routes = RoutesCollection::new();
    routes
        .register_static_directory("tests/staticdata", "/assets")
        .unwrap();
    routes
        .register("/assets/{file}", "GET", handler::noop())
        .unwrap()
        .pattern("file", ".+")
        .unwrap()
        .name("fallback");
    Server::builder(routes).build()
}

fn content_type(out: &routescope::server::Dispatched) -> Option<String> {
    out.response.borrow().header("content-type").map(str::to_string)
}

#[test]
fn test_js_bundle() {
    let sf = StaticFiles::new("tests/staticdata");
    let (bytes, ct) = sf.load("bundle.js").unwrap();
    assert_eq!(ct, "application/javascript");
    assert_eq!(String::from_utf8(bytes).unwrap(), "console.log('bundled');\n");
}

#[test]
fn test_traversal_prevented() {
    let sf = StaticFiles::new("tests/staticdata");
    assert!(sf.load("../Cargo.toml").is_err());
    assert!(sf.load("nested/../../Cargo.toml").is_err());
    assert!(sf.load("nested").is_err());
    assert!(sf.load("nested/data.json").is_ok());
}

#[test]
fn test_serves_files_with_content_type() {
    let app = app();

    let out = get(&app, "/assets/hello.txt");
    assert_eq!(out.outcome, DispatchOutcome::Handled);
    assert_eq!(body(&out), "Hello\n");
    assert_eq!(content_type(&out).as_deref(), Some("text/plain"));

    let out = get(&app, "/assets/style.css");
    assert_eq!(content_type(&out).as_deref(), Some("text/css"));

    let out = get(&app, "/assets/icon.svg");
    assert_eq!(content_type(&out).as_deref(), Some("image/svg+xml"));

    let out = get(&app, "/assets/index.html");
    assert_eq!(content_type(&out).as_deref(), Some("text/html"));

    let out = get(&app, "/assets/nested/data.json");
    assert_eq!(content_type(&out).as_deref(), Some("application/json"));
    assert_eq!(body(&out), "{\"nested\": true}\n");
}

#[test]
fn test_missing_files_reject_to_later_routes() {
    let app = app();
    for path in ["/assets/nope.txt", "/assets/nested", "/assets/../Cargo.toml"] {
        let out = get(&app, path);
        assert_eq!(out.outcome, DispatchOutcome::Handled, "{path}");
        assert_eq!(status(&out), 200, "{path}");
        assert_eq!(body(&out), "", "{path}");
    }
}

#[test]
fn test_static_route_method() {
    let mut routes = RoutesCollection::new();
    routes
        .register_static_directory("tests/staticdata", "/assets/")
        .unwrap();
    let app = Server::builder(routes).build();

    let (req, res) = pair("HEAD", "/assets/hello.txt");
    assert_eq!(app.dispatch(req, res).outcome, DispatchOutcome::Handled);

    let (req, res) = pair("POST", "/assets/hello.txt");
    let out = app.dispatch(req, res);
    assert_eq!(out.outcome, DispatchOutcome::NotFound);
    assert_eq!(status(&out), 404);
}
