//! Hello Cache demo for expedite
//!
//! This demo shows:
//! - Building cache options with a TTL and a status-code override
//! - Installing the middleware in front of a handler
//! - A miss that captures, followed by a hit served from the store
//! - Deriving a second instance with a longer TTL
//!
//! Run with: cargo run -p hello-cache
//! Set RUST_LOG=expedite=debug to watch the cache decisions.

use bytes::Bytes;
use expedite::{CacheBody, CacheMiddleware, CacheOptions, Next, Request, Response};
use http_body_util::BodyExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A handler that pretends to do expensive work.
fn expensive_handler() -> Next {
    let invocations = Arc::new(AtomicUsize::new(0));
    Arc::new(move |req: Request| {
        let count = invocations.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            // Simulated database round trip.
            tokio::time::sleep(Duration::from_millis(200)).await;
            let body = format!(
                "{{\"path\":\"{}\",\"handler_invocations\":{count}}}",
                req.uri().path()
            );
            http::Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .header("content-length", body.len().to_string())
                .body(CacheBody::full(body))
                .unwrap()
        }) as Pin<Box<dyn Future<Output = Response> + Send>>
    })
}

fn request(path: &str) -> Request {
    http::Request::builder()
        .method("GET")
        .uri(path)
        .body(Bytes::new())
        .unwrap()
}

async fn serve(label: &str, cache: &CacheMiddleware, next: &Next, path: &str) {
    let started = std::time::Instant::now();
    let response = cache.handle(request(path), next.clone()).await;
    let indicator = response
        .headers()
        .get("x-expedite-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("demo body never errors")
        .to_bytes();
    println!(
        "{label}: {indicator:>4} in {:>5.1?}  {}",
        started.elapsed(),
        String::from_utf8_lossy(&body)
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expedite=info".into()),
        )
        .init();

    let cache = CacheMiddleware::new(
        CacheOptions::builder()
            .namespace("hello")
            .default_ttl("30 seconds")
            .expire_status(404, "5 seconds")
            .build()?,
    );
    let next = expensive_handler();

    // Cold: the handler runs and the response is captured on the way out.
    serve("first request ", &cache, &next, "/greeting").await;
    // Give the background store write a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Warm: served straight from the store, handler untouched.
    serve("second request", &cache, &next, "/greeting").await;

    // A derived instance with a longer TTL shares the same store.
    let slow_cache = cache.with_ttl("10 minutes")?;
    serve("derived cache ", &slow_cache, &next, "/greeting").await;

    cache.flush(Some("hello")).await?;
    serve("after flush   ", &cache, &next, "/greeting").await;

    Ok(())
}
