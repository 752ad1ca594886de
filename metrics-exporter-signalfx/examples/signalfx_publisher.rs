//! Publishes a randomly changing gauge to SignalFx.
//!
//! Set `SIGNALFX_AUTH_TOKEN` to a valid ingest token, and optionally `SIGNALFX_ENDPOINT` to upload somewhere other than
//! the default ingest endpoint.
use std::{sync::Arc, time::Duration};

use metrics_exporter_signalfx::{registry::Registry, SignalFxBuilder, TracingLogger};
use rand::Rng as _;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    let auth_token = std::env::var("SIGNALFX_AUTH_TOKEN").unwrap_or_default();

    let mut builder = SignalFxBuilder::new(auth_token)
        .with_diff_frequency(Duration::from_secs(5))
        .with_full_frequency(Duration::from_secs(30))
        .with_verbose(true)
        .with_logger(TracingLogger);

    if let Ok(endpoint) = std::env::var("SIGNALFX_ENDPOINT") {
        builder = builder.with_endpoint(endpoint).expect("invalid endpoint");
    }

    let registry = Arc::new(Registry::new());
    let gauge = registry.gauge("some_metric").expect("failed to register gauge");

    builder.spawn(Arc::clone(&registry)).expect("failed to spawn publisher");

    // Most updates land on one of a handful of values, so many cycles have nothing to send.
    loop {
        gauge.update(rand::rng().random_range(0..4));
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
}
