//! Middleware overhead benchmarks
//!
//! Each request goes through `oneshot` on a fresh clone of the stack, the
//! way a server drives a service per connection.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::time::Duration;
use tokio::runtime::Runtime;
use tower::{service_fn, Layer, Service, ServiceExt};
use towerkit_core::{body, Body};
use towerkit_extras::logging::default_level;
use towerkit_extras::{
    generate_key_with_prefix, CacheLayer, LoggerConfig, LoggerLayer, MemoryStore, NoCacheLayer,
    RecoveryLayer, PAGE_CACHE_PREFIX,
};

async fn handler(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
    Ok(Response::new(body::full(r#"{"id":1,"name":"ferris"}"#)))
}

fn request() -> Request<Body> {
    Request::builder()
        .uri("/users/1?expand=true")
        .header("user-agent", "bench")
        .header("x-forwarded-for", "10.0.0.1")
        .body(body::full(r#"{"name":"ferris"}"#))
        .unwrap()
}

fn drive<S>(rt: &Runtime, svc: &S)
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible> + Clone,
{
    rt.block_on(async {
        let res = svc.clone().oneshot(request()).await.unwrap();
        black_box(body::collect(res.into_body()).await.unwrap());
    })
}

/// Silence records so the benchmark measures the middleware, not the writer
fn quiet() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(tracing::subscriber::NoSubscriber::default())
}

fn bench_layers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = quiet();
    let mut group = c.benchmark_group("layers");

    let bare = service_fn(handler);
    group.bench_function("bare", |b| b.iter(|| drive(&rt, &bare)));

    let logger = LoggerLayer::default().layer(service_fn(handler));
    group.bench_function("logger", |b| b.iter(|| drive(&rt, &logger)));

    let capture =
        LoggerLayer::new(LoggerConfig::default().enable_body(true)).layer(service_fn(handler));
    group.bench_function("logger_body_capture", |b| b.iter(|| drive(&rt, &capture)));

    let recovery = RecoveryLayer::new().layer(service_fn(handler));
    group.bench_function("recovery", |b| b.iter(|| drive(&rt, &recovery)));

    let nocache = NoCacheLayer::new().layer(service_fn(handler));
    group.bench_function("nocache", |b| b.iter(|| drive(&rt, &nocache)));

    let cache = CacheLayer::new(MemoryStore::new(), Duration::from_secs(600))
        .key_fn(|_| Some("bench".to_string()))
        .layer(service_fn(handler));
    group.bench_function("cache_hit", |b| b.iter(|| drive(&rt, &cache)));

    group.finish();
}

fn bench_helpers(c: &mut Criterion) {
    let mut group = c.benchmark_group("helpers");

    for code in [200u16, 404, 503] {
        let status = StatusCode::from_u16(code).unwrap();
        group.bench_with_input(BenchmarkId::new("default_level", code), &status, |b, s| {
            b.iter(|| default_level(black_box(*s)))
        });
    }

    let short = "1:2".to_string();
    let long = "x".repeat(512);
    group.bench_function("cache_key_short", |b| {
        b.iter(|| generate_key_with_prefix(PAGE_CACHE_PREFIX, black_box(&short)))
    });
    group.bench_function("cache_key_hashed", |b| {
        b.iter(|| generate_key_with_prefix(PAGE_CACHE_PREFIX, black_box(&long)))
    });

    group.finish();
}

criterion_group!(benches, bench_layers, bench_helpers);
criterion_main!(benches);
