use std::{fmt, mem, sync::Arc, time::Duration};

use tracing::{debug, error, trace, Level};

use crate::{
    builder::UnrecognizedMetricPolicy,
    cache::ValueCache,
    decompose::decompose,
    diff::{PendingChanges, Update},
    logger::Logger,
    observation::Observation,
    registry::MetricRegistry,
    schedule::Schedule,
    transport::{Connect, Transport, TransportError},
};

enum ClientState<T> {
    // Before the first cycle, or after a cycle that failed.
    Disconnected,

    // A client exists and its last submission, if any, succeeded.
    Ready(T),
}

pub(crate) struct PublisherConfiguration {
    pub diff_frequency: Duration,
    pub full_frequency: Duration,
    pub verbose: bool,
    pub logger: Option<Arc<dyn Logger>>,
    pub unrecognized_metric_policy: UnrecognizedMetricPolicy,
    pub cache: Box<dyn ValueCache>,
}

/// Publishes the changed values of a metrics registry.
///
/// Every diff period, all metrics are decomposed into scalar observations and compared against the values last
/// published successfully. Only observations whose value changed, or which were never published, are submitted. Every
/// full period, the record of published values is cleared so that everything gets sent again.
///
/// Publishers are created with [`SignalFxBuilder`][crate::SignalFxBuilder].
pub struct Publisher<C: Connect> {
    connector: C,
    client_state: ClientState<C::Transport>,
    cache: Box<dyn ValueCache>,
    diff_frequency: Duration,
    full_frequency: Duration,
    verbose: bool,
    logger: Option<Arc<dyn Logger>>,
    unrecognized_metric_policy: UnrecognizedMetricPolicy,
}

impl<C: Connect> Publisher<C> {
    pub(crate) fn new(connector: C, config: PublisherConfiguration) -> Self {
        Self {
            connector,
            client_state: ClientState::Disconnected,
            cache: config.cache,
            diff_frequency: config.diff_frequency,
            full_frequency: config.full_frequency,
            verbose: config.verbose,
            logger: config.logger,
            unrecognized_metric_policy: config.unrecognized_metric_policy,
        }
    }

    /// Returns the connector used to create clients.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the interval between publish cycles.
    pub fn diff_frequency(&self) -> Duration {
        self.diff_frequency
    }

    /// Returns the interval between cache resets.
    pub fn full_frequency(&self) -> Duration {
        self.full_frequency
    }

    /// Returns `true` if a client exists for the next cycle to use.
    pub fn is_connected(&self) -> bool {
        matches!(self.client_state, ClientState::Ready(_))
    }

    /// Returns the record of values published so far.
    pub fn cache(&self) -> &dyn ValueCache {
        self.cache.as_ref()
    }

    /// Forgets every published value, so that the next cycle sends every observation.
    pub fn reset_caches(&mut self) {
        if self.verbose {
            self.report(Level::INFO, format_args!("clearing caches"));
        }

        debug!(entries = self.cache.len(), "Clearing published value cache.");
        self.cache.clear();
    }

    /// Runs a single publish cycle against `registry`.
    ///
    /// Returns the number of observations submitted, which is zero when nothing changed. On failure, the client is
    /// discarded and every value staged by this cycle is forgotten, so that it is sent again by the next cycle.
    ///
    /// # Errors
    ///
    /// If the client cannot be created or the batch cannot be delivered, an error is returned.
    ///
    /// # Panics
    ///
    /// If the registry holds a metric that cannot be decomposed and the publisher was configured with
    /// [`UnrecognizedMetricPolicy::Panic`], this function panics.
    pub async fn publish_once<R>(&mut self, registry: &R) -> Result<usize, TransportError>
    where
        R: MetricRegistry + ?Sized,
    {
        let mut transport = match mem::replace(&mut self.client_state, ClientState::Disconnected) {
            ClientState::Ready(transport) => transport,
            ClientState::Disconnected => {
                debug!("Creating client.");
                self.connector.connect()?
            }
        };

        let (batch, changes) = self.collect_changes(registry);

        if self.verbose {
            self.report(Level::INFO, format_args!("changes to flush {changes:?}"));
        }

        if batch.is_empty() {
            trace!("No changes to flush.");
            self.client_state = ClientState::Ready(transport);
            return Ok(0);
        }

        self.submit(&mut transport, &batch, changes).await?;
        self.client_state = ClientState::Ready(transport);

        Ok(batch.len())
    }

    async fn submit(
        &mut self,
        transport: &mut C::Transport,
        batch: &[Observation],
        changes: PendingChanges,
    ) -> Result<(), TransportError> {
        trace!(observations = batch.len(), "Submitting batch.");

        match transport.submit(batch).await {
            Ok(()) => {
                changes.commit(self.cache.as_mut());
                Ok(())
            }
            Err(e) => {
                debug!(staged = changes.len(), "Submission failed. Forgetting staged values.");
                changes.invalidate(self.cache.as_mut());
                Err(e)
            }
        }
    }

    fn collect_changes<R>(&self, registry: &R) -> (Vec<Observation>, PendingChanges)
    where
        R: MetricRegistry + ?Sized,
    {
        let mut update = Update::new(self.cache.as_ref());

        registry.for_each(&mut |name, metric| {
            if let Err(e) = decompose(name, metric, |observation| update.consider(observation)) {
                match self.unrecognized_metric_policy {
                    UnrecognizedMetricPolicy::Skip => {
                        error!(metric_name = name, type_name = e.type_name, "Skipping unrecognized metric.");
                        self.report(Level::ERROR, format_args!("{e}"));
                    }
                    UnrecognizedMetricPolicy::Panic => panic!("{e}"),
                }
            }
        });

        update.into_parts()
    }

    fn report(&self, level: Level, message: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.log(level, message);
        }
    }

    /// Publishes `registry` forever.
    ///
    /// The first cycle runs one diff period after this is first polled. Failed cycles are reported to the logger and
    /// retried on the next diff tick with a new client.
    pub async fn run<R>(mut self, registry: R)
    where
        R: MetricRegistry,
    {
        debug!(
            diff_frequency = ?self.diff_frequency,
            full_frequency = ?self.full_frequency,
            "Publisher started."
        );

        let mut schedule = Schedule::new(self.diff_frequency, self.full_frequency);
        loop {
            let tick = schedule.tick().await;
            if tick.resync {
                self.reset_caches();
            }

            match self.publish_once(&registry).await {
                Ok(0) => {}
                Ok(observations) => debug!(observations, "Published changes."),
                Err(e) => {
                    debug!(error = %e, "Publish cycle failed.");
                    self.report(Level::ERROR, format_args!("unable to publish to SignalFx: {e}"));
                }
            }
        }
    }
}
