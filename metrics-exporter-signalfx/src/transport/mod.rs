//! Delivery of batches to the ingestion endpoint.
//!
//! A [`Connect`] implementation creates [`Transport`] clients on demand: the publisher creates one before its first
//! cycle, and again after any cycle whose submission failed.

use std::{future::Future, pin::Pin, time::Duration};

use thiserror::Error;

use crate::observation::Observation;

#[cfg(feature = "http-transport")]
mod http;
#[cfg(feature = "http-transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "http-transport")))]
pub use self::http::{HttpTransport, SignalFxConnector, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};

pub mod proto;

/// Errors that could occur while delivering a batch.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client could not be created.
    #[error("failed to create client: {reason}")]
    Connect {
        /// Details about the failure.
        reason: String,
    },

    /// The request could not be built or sent.
    #[error("failed to send request: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No response arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,

        /// Response body, or a placeholder when it could not be read.
        body: String,
    },
}

/// Future returned by [`Transport::submit`].
pub type SubmitFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

/// A client able to deliver batches of observations.
///
/// Clients are used by one publish cycle at a time and are dropped after their first failed submission.
pub trait Transport: Send {
    /// Submits a non-empty batch of observations.
    fn submit<'a>(&'a mut self, batch: &'a [Observation]) -> SubmitFuture<'a>;
}

/// A factory for [`Transport`] clients.
///
/// Closures returning a `Result<T, TransportError>` implement this trait.
pub trait Connect: Send {
    /// Type of client created.
    type Transport: Transport;

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// If the client cannot be created, an error is returned and the publish cycle fails.
    fn connect(&self) -> Result<Self::Transport, TransportError>;
}

impl<F, T> Connect for F
where
    F: Fn() -> Result<T, TransportError> + Send,
    T: Transport,
{
    type Transport = T;

    fn connect(&self) -> Result<T, TransportError> {
        self()
    }
}
