//! A publisher that periodically pushes the changed values of a metrics registry to [SignalFx][sfx].
//!
//! [sfx]: https://docs.splunk.com/observability/en/gdi/other-ingestion-methods/rest-APIs-for-datapoints.html
//!
//! # Usage
//!
//! Metrics are registered in a [`Registry`][registry::Registry], and a publisher is spawned to report them:
//!
//! ```no_run
//! # use std::{sync::Arc, time::Duration};
//! # use metrics_exporter_signalfx::{registry::Registry, SignalFxBuilder, TracingLogger};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Arc::new(Registry::new());
//! let requests = registry.counter("requests").expect("name already used by another kind");
//!
//! // Spawns the publisher on the current runtime. Outside of a runtime, a background thread is spawned instead.
//! SignalFxBuilder::new("<auth token>")
//!     .with_diff_frequency(Duration::from_secs(10))
//!     .with_logger(TracingLogger)
//!     .spawn(Arc::clone(&registry))
//!     .expect("failed to spawn publisher");
//!
//! requests.inc(1);
//! # }
//! ```
//!
//! The publisher can also be driven directly, with [`publish_to_signalfx`] returning the future that runs it, or with
//! [`Publisher::publish_once`] running a single cycle.
//!
//! # Features
//!
//! ## Diffing
//!
//! Every diff period (15 seconds by default), each metric is decomposed into scalar observations. Counters and gauges
//! map to a single observation, while histograms, meters and timers fan out into one observation per statistic, named
//! `<name>.<suffix>`. Only observations never published before, or whose value changed since they were last published
//! successfully, are sent.
//!
//! ## Full resyncs
//!
//! Every full period (60 seconds by default), the record of published values is cleared, so the next cycle sends every
//! observation again. This bounds how long the backend can stay out of date after losing data.
//!
//! ## Failure handling
//!
//! A failed cycle discards its client and forgets every value it tried to send, so that they are all sent again by the
//! next cycle with a freshly created client. Failures are reported to the configured [`Logger`], if any.
//!
//! ## Pluggable transport
//!
//! Batches are uploaded as protocol buffer encoded datapoints over HTTP(S) by default. Any other [`Connect`]
//! implementation can be used through [`SignalFxBuilder::build_with_connector`]. The HTTP transport can be disabled by
//! turning off the default `http-transport` feature.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
#[cfg(feature = "http-transport")]
pub use self::builder::publish_to_signalfx;
pub use self::builder::{BuildError, Options, PublisherFuture, SignalFxBuilder, UnrecognizedMetricPolicy};

mod cache;
pub use self::cache::{BoundedCache, UnboundedCache, ValueCache};

mod decompose;
pub use self::decompose::{
    decompose, decompose_histogram, decompose_meter, decompose_timer, UnrecognizedMetric, PERCENTILES,
};

mod diff;
pub use self::diff::{PendingChanges, Update};

mod logger;
pub use self::logger::{Logger, TracingLogger};

mod observation;
pub use self::observation::{Kind, Observation, ScalarValue};

mod publisher;
pub use self::publisher::Publisher;

pub mod registry;
mod schedule;
pub mod transport;
pub use self::transport::{Connect, Transport, TransportError};
