use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use routescope::router::{RoutesCollection, UrlPattern};
use routescope::scope::{handler, Scope};
use routescope::server::{BufferedResponse, MemoryRequest, Server};

const ROUTES: &[(&str, &str)] = &[
    ("/", "GET"),
    ("/zoo/animals", "GET|POST"),
    ("/zoo/animals/{id}", "GET|PUT|PATCH|DELETE"),
    ("/zoo/animals/{id}/toys/{toy_id}", "GET"),
    ("/zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}", "GET"),
    ("/inventory/{warehouse_id}/feeds/{feed_id}/items/{item_id}/batches/{batch_id}", "POST"),
    ("/complex/{a}/{b}/{c}/{d}/{e}/{f}/{g}/{h}/{i}", "GET"),
    ("/zoo/health", "HEAD|OPTIONS"),
];

const REQUESTS: &[(&str, &str)] = &[
    ("GET", "/zoo/animals/123"),
    ("GET", "/zoo/animals/123/toys/456"),
    ("GET", "/zoo/cats/animals/123/habitats/88/sections/5"),
    ("POST", "/inventory/1/feeds/2/items/3/batches/4"),
    ("GET", "/complex/1/2/3/4/5/6/7/8/9"),
];

fn collection() -> RoutesCollection {
    let mut routes = RoutesCollection::new();
    for (pattern, method) in ROUTES {
        routes
            .register(pattern, method, handler::noop())
            .expect("benchmark route");
    }
    routes
}

fn bench_pattern_match(c: &mut Criterion) {
    let patterns: Vec<UrlPattern> = ROUTES
        .iter()
        .map(|(p, _)| UrlPattern::new(p).expect("benchmark pattern"))
        .collect();
    c.bench_function("pattern_match", |b| {
        b.iter(|| {
            for (_, path) in REQUESTS {
                let hit = patterns.iter().find_map(|p| p.matches(path));
                black_box(&hit);
            }
        })
    });
}

fn bench_route_throughput(c: &mut Criterion) {
    let routes = collection();
    let root = Scope::new();
    c.bench_function("route_match", |b| {
        b.iter(|| {
            for (method, path) in REQUESTS {
                let mut req = MemoryRequest::new(*method, path).into_shared();
                let mut res = BufferedResponse::new().into_shared();
                let handled = routes.handle(&mut req, &mut res, &root, "");
                black_box(&handled);
            }
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let app = Server::builder(collection()).build();
    c.bench_function("dispatch", |b| {
        b.iter(|| {
            for (method, path) in REQUESTS {
                let out = app.dispatch(
                    MemoryRequest::new(*method, path).into_shared(),
                    BufferedResponse::new().into_shared(),
                );
                black_box(&out);
            }
        })
    });
}

criterion_group!(benches, bench_pattern_match, bench_route_throughput, bench_dispatch);
criterion_main!(benches);
