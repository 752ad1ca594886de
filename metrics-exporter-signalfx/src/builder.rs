use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::warn;

use crate::{
    cache::{BoundedCache, UnboundedCache, ValueCache},
    logger::Logger,
    publisher::{Publisher, PublisherConfiguration},
    transport::Connect,
};
#[cfg(feature = "http-transport")]
use crate::{
    registry::MetricRegistry,
    transport::{SignalFxConnector, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT},
};

const DEFAULT_DIFF_FREQUENCY: Duration = Duration::from_secs(15);
const DEFAULT_FULL_FREQUENCY: Duration = Duration::from_secs(60);

/// A never-completing future that publishes a registry.
pub type PublisherFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors that could occur while building a publisher.
#[derive(Debug, Error)]
pub enum BuildError {
    /// More than one set of options was given.
    #[error("expected at most one set of options, got {count}")]
    MultipleOptions {
        /// Number of option sets given.
        count: usize,
    },

    /// Failed to parse the endpoint.
    #[error("invalid endpoint: {reason}")]
    InvalidEndpoint {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The auth token cannot be sent as an HTTP header value.
    #[error("invalid auth token: {reason}")]
    InvalidAuthToken {
        /// Details about the failure.
        reason: String,
    },

    /// Failed to create the runtime or thread driving the publisher.
    #[error("failed to create runtime for publisher: {0}")]
    FailedToCreateRuntime(String),
}

/// What to do with registry values that cannot be decomposed into observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnrecognizedMetricPolicy {
    /// Leave the value out of the batch, reporting it at error level.
    ///
    /// The rest of the cycle proceeds as usual.
    #[default]
    Skip,

    /// Panic, taking down the publisher task.
    Panic,
}

/// Publishing options.
///
/// A zero duration selects the default for that duration.
#[derive(Clone, Default)]
pub struct Options {
    /// Interval between publish cycles. Defaults to 15 seconds.
    pub diff_frequency: Duration,

    /// Interval at which the record of published values is cleared, causing every observation to be sent again.
    /// Defaults to 60 seconds.
    pub full_frequency: Duration,

    /// Sink for error reports and verbose output. Without one, the publisher reports nothing.
    pub logger: Option<Arc<dyn Logger>>,

    /// Report every cache reset and the full change set of every cycle.
    pub verbose: bool,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("diff_frequency", &self.diff_frequency)
            .field("full_frequency", &self.full_frequency)
            .field("logger", &self.logger.as_ref().map(|_| "<logger>"))
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Builder for a SignalFx publisher.
pub struct SignalFxBuilder {
    #[cfg_attr(not(feature = "http-transport"), allow(dead_code))]
    auth_token: String,
    #[cfg(feature = "http-transport")]
    endpoint: hyper::Uri,
    #[cfg(feature = "http-transport")]
    timeout: Duration,
    diff_frequency: Duration,
    full_frequency: Duration,
    verbose: bool,
    logger: Option<Arc<dyn Logger>>,
    unrecognized_metric_policy: UnrecognizedMetricPolicy,
    cache_capacity: Option<usize>,
}

impl SignalFxBuilder {
    /// Creates a new `SignalFxBuilder` that authenticates with the given auth token.
    pub fn new<T>(auth_token: T) -> Self
    where
        T: Into<String>,
    {
        Self {
            auth_token: auth_token.into(),
            #[cfg(feature = "http-transport")]
            endpoint: hyper::Uri::from_static(DEFAULT_ENDPOINT),
            #[cfg(feature = "http-transport")]
            timeout: DEFAULT_TIMEOUT,
            diff_frequency: DEFAULT_DIFF_FREQUENCY,
            full_frequency: DEFAULT_FULL_FREQUENCY,
            verbose: false,
            logger: None,
            unrecognized_metric_policy: UnrecognizedMetricPolicy::default(),
            cache_capacity: None,
        }
    }

    /// Applies a set of [`Options`].
    ///
    /// Zero durations in `options` leave the corresponding setting unchanged.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        if !options.diff_frequency.is_zero() {
            self.diff_frequency = options.diff_frequency;
        }
        if !options.full_frequency.is_zero() {
            self.full_frequency = options.full_frequency;
        }
        self.logger = options.logger;
        self.verbose = options.verbose;
        self
    }

    /// Set the interval between publish cycles.
    ///
    /// Each cycle sends only the observations that changed since they were last published. A zero interval selects
    /// the default.
    ///
    /// Defaults to 15 seconds.
    #[must_use]
    pub fn with_diff_frequency(mut self, frequency: Duration) -> Self {
        self.diff_frequency = if frequency.is_zero() { DEFAULT_DIFF_FREQUENCY } else { frequency };
        self
    }

    /// Set the interval at which the record of published values is cleared.
    ///
    /// The first cycle after a reset sends every observation, so the backend converges even if it lost data. Resets are
    /// only applied at the start of a cycle, so an interval shorter than the diff interval resets before every cycle.
    /// A zero interval selects the default.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_full_frequency(mut self, frequency: Duration) -> Self {
        self.full_frequency = if frequency.is_zero() { DEFAULT_FULL_FREQUENCY } else { frequency };
        self
    }

    /// Set whether cache resets and change sets are reported to the logger.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the logger that publishing errors, and verbose output, are reported to.
    ///
    /// Defaults to no logger.
    #[must_use]
    pub fn with_logger<L>(mut self, logger: L) -> Self
    where
        L: Logger + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Set what to do with registry values that cannot be decomposed.
    ///
    /// Defaults to [`UnrecognizedMetricPolicy::Skip`].
    #[must_use]
    pub fn with_unrecognized_metric_policy(mut self, policy: UnrecognizedMetricPolicy) -> Self {
        self.unrecognized_metric_policy = policy;
        self
    }

    /// Bound the number of published values remembered between cycles.
    ///
    /// When full, the least recently written value is forgotten and will be sent again by the next cycle that
    /// observes it.
    ///
    /// Defaults to remembering every published value.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Set the endpoint that datapoints are uploaded to.
    ///
    /// Defaults to `https://ingest.signalfx.com/v2/datapoint`.
    ///
    /// # Errors
    ///
    /// If the given endpoint cannot be parsed as a URI, an error will be returned indicating the reason.
    #[cfg(feature = "http-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http-transport")))]
    pub fn with_endpoint<E>(mut self, endpoint: E) -> Result<Self, BuildError>
    where
        E: AsRef<str>,
    {
        self.endpoint = endpoint
            .as_ref()
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| BuildError::InvalidEndpoint { reason: e.to_string() })?;
        Ok(self)
    }

    /// Set the time allowed for a single upload request.
    ///
    /// A request still in flight when the timeout is reached fails the cycle.
    ///
    /// Defaults to 5 seconds.
    #[cfg(feature = "http-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http-transport")))]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds a publisher that delivers batches through clients created by `connector`.
    ///
    /// The auth token, endpoint and timeout are not used.
    pub fn build_with_connector<C>(self, connector: C) -> Publisher<C>
    where
        C: Connect,
    {
        if self.full_frequency < self.diff_frequency {
            warn!(
                diff_frequency = ?self.diff_frequency,
                full_frequency = ?self.full_frequency,
                "Full frequency is shorter than diff frequency. Caches will be cleared before every cycle."
            );
        }

        let cache: Box<dyn ValueCache> = match self.cache_capacity {
            Some(capacity) => Box::new(BoundedCache::with_capacity(capacity)),
            None => Box::new(UnboundedCache::new()),
        };

        let config = PublisherConfiguration {
            diff_frequency: self.diff_frequency,
            full_frequency: self.full_frequency,
            verbose: self.verbose,
            logger: self.logger,
            unrecognized_metric_policy: self.unrecognized_metric_policy,
            cache,
        };

        Publisher::new(connector, config)
    }

    /// Builds a publisher that uploads to SignalFx over HTTP(S).
    ///
    /// # Errors
    ///
    /// If the auth token cannot be sent as an HTTP header value, an error will be returned.
    #[cfg(feature = "http-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http-transport")))]
    pub fn build(self) -> Result<Publisher<SignalFxConnector>, BuildError> {
        let auth_token = hyper::header::HeaderValue::from_str(&self.auth_token)
            .map_err(|e| BuildError::InvalidAuthToken { reason: e.to_string() })?;
        let connector = SignalFxConnector::new(self.endpoint.clone(), auth_token, self.timeout);

        Ok(self.build_with_connector(connector))
    }

    /// Builds a publisher for `registry` and returns the future driving it.
    ///
    /// The future never completes, and must be spawned on a Tokio runtime by the caller.
    ///
    /// # Errors
    ///
    /// If the auth token cannot be sent as an HTTP header value, an error will be returned.
    #[cfg(feature = "http-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http-transport")))]
    pub fn into_future<R>(self, registry: R) -> Result<PublisherFuture, BuildError>
    where
        R: MetricRegistry + Send + Sync + 'static,
    {
        let publisher = self.build()?;
        Ok(Box::pin(publisher.run(registry)))
    }

    /// Builds a publisher for `registry` and spawns it in the background.
    ///
    /// If called from within a Tokio runtime, the publisher is spawned on that runtime. Otherwise, a dedicated thread is
    /// spawned to run the publisher on its own single-threaded runtime.
    ///
    /// # Errors
    ///
    /// If the auth token cannot be sent as an HTTP header value, or the runtime or thread cannot be created, an error
    /// will be returned.
    #[cfg(feature = "http-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http-transport")))]
    pub fn spawn<R>(self, registry: R) -> Result<(), BuildError>
    where
        R: MetricRegistry + Send + Sync + 'static,
    {
        let future = self.into_future(registry)?;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(future);
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

        std::thread::Builder::new()
            .name("metrics-exporter-signalfx-publisher".to_string())
            .spawn(move || runtime.block_on(future))
            .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

        Ok(())
    }
}

/// Returns the future publishing `registry` to SignalFx, authenticated with `auth_token`.
///
/// At most one set of options may be given. Without one, defaults are used.
///
/// The future never completes, and must be spawned on a Tokio runtime by the caller.
///
/// # Errors
///
/// If more than one set of options is given, or the auth token cannot be sent as an HTTP header value, an error will
/// be returned.
#[cfg(feature = "http-transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "http-transport")))]
pub fn publish_to_signalfx<R>(registry: R, auth_token: &str, options: &[Options]) -> Result<PublisherFuture, BuildError>
where
    R: MetricRegistry + Send + Sync + 'static,
{
    let builder = match options {
        [] => SignalFxBuilder::new(auth_token),
        [options] => SignalFxBuilder::new(auth_token).with_options(options.clone()),
        _ => return Err(BuildError::MultipleOptions { count: options.len() }),
    };

    builder.into_future(registry)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{Options, SignalFxBuilder, UnrecognizedMetricPolicy};
    use crate::{
        logger::TracingLogger,
        observation::Observation,
        transport::{SubmitFuture, Transport, TransportError},
    };

    struct Discard;

    impl Transport for Discard {
        fn submit<'a>(&'a mut self, _: &'a [Observation]) -> SubmitFuture<'a> {
            Box::pin(async { Ok(()) })
        }
    }

    fn connector() -> Result<Discard, TransportError> {
        Err(TransportError::Connect { reason: String::from("unused") })
    }

    #[test]
    fn defaults() {
        let publisher = SignalFxBuilder::new("token").build_with_connector(connector);
        assert_eq!(publisher.diff_frequency(), Duration::from_secs(15));
        assert_eq!(publisher.full_frequency(), Duration::from_secs(60));
        assert!(!publisher.is_connected());
    }

    #[test]
    fn zero_durations_select_defaults() {
        let publisher = SignalFxBuilder::new("token")
            .with_diff_frequency(Duration::from_secs(5))
            .with_options(Options::default())
            .build_with_connector(connector);
        assert_eq!(publisher.diff_frequency(), Duration::from_secs(5));
        assert_eq!(publisher.full_frequency(), Duration::from_secs(60));

        let publisher = SignalFxBuilder::new("token")
            .with_diff_frequency(Duration::ZERO)
            .with_full_frequency(Duration::ZERO)
            .build_with_connector(connector);
        assert_eq!(publisher.diff_frequency(), Duration::from_secs(15));
        assert_eq!(publisher.full_frequency(), Duration::from_secs(60));
    }

    #[test]
    fn options_override_durations() {
        let options = Options {
            diff_frequency: Duration::from_secs(1),
            full_frequency: Duration::from_millis(500),
            logger: Some(Arc::new(TracingLogger)),
            verbose: true,
        };
        let publisher = SignalFxBuilder::new("token")
            .with_options(options)
            .with_unrecognized_metric_policy(UnrecognizedMetricPolicy::Panic)
            .build_with_connector(connector);

        assert_eq!(publisher.diff_frequency(), Duration::from_secs(1));
        assert_eq!(publisher.full_frequency(), Duration::from_millis(500));
    }

    #[test]
    fn bounded_cache() {
        let publisher = SignalFxBuilder::new("token").with_cache_capacity(2).build_with_connector(connector);
        assert!(publisher.cache().is_empty());
    }

    #[cfg(feature = "http-transport")]
    mod http {
        use std::{sync::Arc, time::Duration};

        use super::super::{publish_to_signalfx, BuildError, Options, SignalFxBuilder};
        use crate::{registry::Registry, transport::DEFAULT_ENDPOINT};

        #[test]
        fn default_endpoint() {
            let publisher = SignalFxBuilder::new("token").build().unwrap();
            assert!(!publisher.is_connected());
            assert_eq!(publisher.connector().endpoint().to_string(), DEFAULT_ENDPOINT);
            assert_eq!(publisher.connector().timeout(), Duration::from_secs(5));
        }

        #[test]
        fn invalid_endpoint() {
            let result = SignalFxBuilder::new("token").with_endpoint("not a uri");
            assert!(matches!(result, Err(BuildError::InvalidEndpoint { .. })));
        }

        #[test]
        fn invalid_auth_token() {
            let result = SignalFxBuilder::new("bad\ntoken").build();
            assert!(matches!(result, Err(BuildError::InvalidAuthToken { .. })));
        }

        #[test]
        fn at_most_one_set_of_options() {
            let registry = Arc::new(Registry::new());

            assert!(publish_to_signalfx(Arc::clone(&registry), "token", &[]).is_ok());
            assert!(publish_to_signalfx(Arc::clone(&registry), "token", &[Options::default()]).is_ok());

            let result = publish_to_signalfx(registry, "token", &[Options::default(), Options::default()]);
            assert!(matches!(result, Err(BuildError::MultipleOptions { count: 2 })));
        }
    }
}
