use super::{param, Control, Exchange, Route, RouteError, RoutesCollection, UrlPattern};
use crate::scope::{handler, FromScope, Scope};
use crate::server::{BufferedResponse, MemoryRequest, SharedRequest, SharedResponse};

fn exchange(method: &str, target: &str) -> (SharedRequest, SharedResponse) {
    (
        MemoryRequest::new(method, target).into_shared(),
        BufferedResponse::new().into_shared(),
    )
}

fn try_route(route: &Route, method: &str, target: &str) -> bool {
    let (mut req, mut res) = exchange(method, target);
    route.handle(&mut req, &mut res, &Scope::new(), "").unwrap()
}

#[test]
fn test_root_path() {
    let p = UrlPattern::new("/").unwrap();
    let m = p.matches("/").unwrap();
    assert!(m.is_empty());
    assert!(p.matches("").is_none());
}

#[test]
fn test_literal_segments_are_case_sensitive() {
    let p = UrlPattern::new("/About").unwrap();
    assert!(p.matches("/About").is_some());
    assert!(p.matches("/about").is_none());
    assert!(p.matches("/ABOUT").is_none());

    let mut route = Route::new("/About", "GET").unwrap();
    route.handler(handler::noop());
    assert!(try_route(&route, "get", "/About"));
    assert!(!try_route(&route, "GET", "/about"));
}

#[test]
fn test_default_variable_round_trip() {
    let p = UrlPattern::new("/{v}").unwrap();
    let url = p.build_url([("v", "abc_123")]).unwrap();
    assert_eq!(url, "/abc_123");
    let m = p.matches(&url).unwrap();
    assert_eq!(param(&m, "v"), Some("abc_123"));

    assert!(p.matches("/a-b").is_none());
    assert!(matches!(
        p.build_url([("v", "a-b")]),
        Err(RouteError::ParameterMismatch { .. })
    ));
}

#[test]
fn test_parameterized_path() {
    let p = UrlPattern::new("/items/{id}").unwrap();
    let m = p.matches("/items/123").unwrap();
    assert_eq!(param(&m, "id"), Some("123"));
    assert_eq!(p.variables().collect::<Vec<_>>(), vec!["id"]);
}

#[test]
fn test_nested_path() {
    let p = UrlPattern::new("/a/{b}/c").unwrap();
    assert!(p.matches("/a/1/c").is_some());
    assert!(p.matches("/a/1/c/").is_none());
}

#[test]
fn test_matching_is_anchored() {
    let p = UrlPattern::new("/{a}/{b}").unwrap();
    let m = p.matches("/x/y").unwrap();
    assert_eq!(param(&m, "a"), Some("x"));
    assert_eq!(param(&m, "b"), Some("y"));
    assert!(p.matches("/x").is_none());
    assert!(p.matches("/x/y/z").is_none());
    assert!(p.matches("//").is_none());
    assert!(p.matches("prefix/x/y").is_none());
}

#[test]
fn test_override_variable_regex() {
    let mut p = UrlPattern::new("/user/{id}").unwrap();
    p.set_variable_pattern("id", r"\d+").unwrap();
    assert!(p.matches("/user/42").is_some());
    assert!(p.matches("/user/abc").is_none());
    assert_eq!(p.build_url([("id", "42")]).unwrap(), "/user/42");
    assert!(matches!(
        p.build_url([("id", "abc")]),
        Err(RouteError::ParameterMismatch { .. })
    ));
}

#[test]
fn test_unknown_variable_is_rejected() {
    let mut p = UrlPattern::new("/user/{id}").unwrap();
    assert!(matches!(
        p.set_variable_pattern("nope", r"\d+"),
        Err(RouteError::UnknownVariable { .. })
    ));
}

#[test]
fn test_build_url_missing_parameter() {
    let p = UrlPattern::new("/{a}/{b}").unwrap();
    assert!(matches!(
        p.build_url([("a", "1")]),
        Err(RouteError::MissingParameter { .. })
    ));
    assert_eq!(p.build_url([("b", "2"), ("a", "1"), ("c", "3")]).unwrap(), "/1/2");
}

#[test]
fn test_route_var_end_to_end() {
    let route = Route::new("/{var}", "GET")
        .map(|mut r| {
            r.handler(handler::noop());
            r
        })
        .unwrap();
    assert!(try_route(&route, "GET", "/test"));
    assert!(try_route(&route, "GET", "/1"));
    assert!(!try_route(&route, "GET", "/"));
    assert!(!try_route(&route, "GET", "/test-test"));
    assert!(!try_route(&route, "GET", "/test/test"));
}

#[test]
fn test_method_mismatch() {
    let mut route = Route::new("/", "test").unwrap();
    route.handler(handler::noop());
    assert!(!try_route(&route, "GET", "/"));
    assert!(!try_route(&route, "POST", "/"));
    assert!(try_route(&route, "test", "/"));
}

#[test]
fn test_method_regex_is_anchored_and_case_insensitive() {
    let mut route = Route::new("/", "GET|POST").unwrap();
    route.handler(handler::noop());
    assert!(try_route(&route, "get", "/"));
    assert!(try_route(&route, "POST", "/"));
    assert!(!try_route(&route, "GETX", "/"));
}

#[test]
fn test_stop_route_skips_handler() {
    let mut route = Route::new("/", "GET").unwrap();
    route.before(handler::from_fn(|c: Control| {
        c.stop_route();
        Ok(())
    }));
    route.handler(handler::with_resolver(|_| anyhow::bail!("handler reached")));
    assert!(try_route(&route, "GET", "/"));
}

#[test]
fn test_skip_handler_returns_handled() {
    let mut route = Route::new("/", "GET").unwrap();
    route.before(handler::from_fn(|c: Control| {
        c.skip_handler();
        Ok(())
    }));
    route.handler(handler::with_resolver(|_| anyhow::bail!("handler reached")));
    route.after(handler::with_resolver(|_| anyhow::bail!("after reached")));
    assert!(try_route(&route, "GET", "/"));
}

#[test]
fn test_reject_falls_through_to_next_route() {
    let mut routes = RoutesCollection::new();
    routes
        .register("/{page}", "GET", handler::with_resolver(|_| anyhow::bail!("first handler reached")))
        .unwrap()
        .before(handler::from_fn(|c: Control| {
            c.reject();
            Ok(())
        }));
    routes
        .register("/{page}", "GET", handler::from_fn(|ex: Exchange| {
            ex.with_response(|res| res.append_body(b"second"))?;
            Ok(())
        }))
        .unwrap();

    let (mut req, mut res) = exchange("GET", "/about");
    assert!(routes.handle(&mut req, &mut res, &Scope::new(), "").unwrap());
    assert_eq!(res.borrow().body(), b"second");
}

#[test]
fn test_handler_error_propagates() {
    let mut route = Route::new("/", "GET").unwrap();
    route.handler(handler::with_resolver(|_| anyhow::bail!("boom")));
    let (mut req, mut res) = exchange("GET", "/");
    let err = route.handle(&mut req, &mut res, &Scope::new(), "").unwrap_err();
    assert_eq!(err.to_string(), "boom");
}

#[test]
fn test_missing_handler_fails_when_invoked() {
    let route = Route::new("/", "GET").unwrap();
    let (mut req, mut res) = exchange("GET", "/");
    let err = route.handle(&mut req, &mut res, &Scope::new(), "").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RouteError>(),
        Some(RouteError::MissingHandler { .. })
    ));
}

#[test]
fn test_zero_pattern_route() {
    let mut route = Route::without_pattern("GET").unwrap();
    route.handler(handler::noop());
    assert!(try_route(&route, "GET", "/"));
    assert!(!try_route(&route, "GET", "/x"));
}

#[test]
fn test_prefix_is_stripped() {
    let mut route = Route::new("/users", "GET").unwrap();
    route.handler(handler::noop());
    let (mut req, mut res) = exchange("GET", "/api/users");
    assert!(route.handle(&mut req, &mut res, &Scope::new(), "/api").unwrap());
    let (mut req, mut res) = exchange("GET", "/users");
    assert!(!route.handle(&mut req, &mut res, &Scope::new(), "/api").unwrap());
}

#[test]
fn test_alternative_patterns_first_match_wins() {
    let mut route = Route::new("/post/{id}", "GET").unwrap();
    route.add_pattern("/p/{id}").unwrap();
    route.pattern("id", r"\d+").unwrap();
    route.handler(handler::noop());
    assert!(try_route(&route, "GET", "/post/1"));
    assert!(try_route(&route, "GET", "/p/2"));
    assert!(!try_route(&route, "GET", "/p/x"));
}

#[test]
fn test_url_variables_are_bound() {
    let mut route = Route::new("/greet/{name}", "GET").unwrap();
    route.handler(handler::with_resolver(|r| {
        let name = r.named::<String>("name").get().unwrap_or_default();
        let ex = Exchange::from_scope(r);
        ex.with_response(|res| res.append_body(name.as_bytes()))?;
        Ok(())
    }));
    let (mut req, mut res) = exchange("GET", "/greet/ann%20lee");
    // The default regex rejects the encoded space.
    assert!(!route.handle(&mut req, &mut res, &Scope::new(), "").unwrap());

    route.pattern("name", "[^/]+").unwrap();
    assert!(route.handle(&mut req, &mut res, &Scope::new(), "").unwrap());
    assert_eq!(res.borrow().body(), b"ann lee");
}

#[test]
fn test_prefix_locked_after_register() {
    let mut routes = RoutesCollection::with_prefix("/v1");
    routes.register("/a", "GET", handler::noop()).unwrap();
    assert_eq!(routes.routes()[0].patterns()[0].original(), "/v1/a");
    assert!(matches!(
        routes.set_prefix("/v2"),
        Err(RouteError::PrefixLocked { .. })
    ));
}
