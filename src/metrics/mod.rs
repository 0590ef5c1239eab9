//! Metrics exposition for the storage layer.
//!
//! The facade feeds two gauges: `stored_objects` carries the high-water mark
//! of the object count per key prefix, `watch_subscriptions` the number of
//! live backend subscriptions. Both are safe to read while writers are
//! active; observability collaborators poll them through the `/metrics`
//! endpoint served here.

mod high_water_mark;
pub use high_water_mark::*;

#[cfg(test)]
mod high_water_mark_test;
#[cfg(test)]
mod metrics_test;

use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref STORED_OBJECTS_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("stored_objects", "High-water mark of the stored object count per key prefix"),
        &["prefix"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_SUBSCRIPTIONS_METRIC: IntGauge =
        IntGauge::new("watch_subscriptions", "Number of live watch subscriptions")
            .expect("metric can not be created");

    pub static ref GUARDED_UPDATE_CONFLICTS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "guarded_update_conflicts",
            "Conditional writes lost to a concurrent writer, by key prefix"
        ),
        &["prefix"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(STORED_OBJECTS_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_SUBSCRIPTIONS_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(GUARDED_UPDATE_CONFLICTS_METRIC.clone()))
        .expect("collector can be registered");
}

/// Serves `/metrics` until `shutdown_signal` fires.
pub async fn start_server(port: u16, mut shutdown_signal: watch::Receiver<()>) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        eprintln!("could not encode custom metrics: {}", e);
    };
    let res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    Ok(res)
}
