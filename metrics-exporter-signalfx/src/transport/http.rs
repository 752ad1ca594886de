use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use http_body_util::{BodyExt as _, Collected, Full};
use hyper::{
    body::Bytes,
    header::{self, HeaderValue},
    http::uri::Scheme,
    Method, Request, Uri,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tracing::{debug, trace};

use super::{
    proto::{DataPointUploadMessage, CONTENT_TYPE},
    Connect, SubmitFuture, Transport, TransportError,
};
use crate::observation::Observation;

/// Default ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://ingest.signalfx.com/v2/datapoint";

/// Default time allowed for a single upload request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const AUTH_TOKEN_HEADER: &str = "x-sf-token";
const USER_AGENT: &str = concat!("metrics-exporter-signalfx/", env!("CARGO_PKG_VERSION"));

/// Creates [`HttpTransport`] clients for a SignalFx ingestion endpoint.
#[derive(Clone, Debug)]
pub struct SignalFxConnector {
    endpoint: Uri,
    auth_token: HeaderValue,
    timeout: Duration,
}

impl SignalFxConnector {
    pub(crate) fn new(endpoint: Uri, mut auth_token: HeaderValue, timeout: Duration) -> Self {
        auth_token.set_sensitive(true);
        Self { endpoint, auth_token, timeout }
    }

    /// Returns the endpoint batches are uploaded to.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Returns the time allowed for a single upload request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn https_connector(&self) -> Result<HttpsConnector<HttpConnector>, TransportError> {
        let builder = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            // Plaintext endpoints never need a root store, so a host without one can still reach them.
            Err(e) if self.endpoint.scheme() == Some(&Scheme::HTTP) => {
                debug!(error = %e, "No native root certificates found. Continuing without them.");
                HttpsConnectorBuilder::new().with_tls_config(empty_tls_config()?)
            }
            Err(e) => {
                return Err(TransportError::Connect {
                    reason: format!("failed to load native root certificates: {e}"),
                })
            }
        };

        Ok(builder.https_or_http().enable_http1().build())
    }
}

fn empty_tls_config() -> Result<rustls::ClientConfig, TransportError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Connect { reason: e.to_string() })?
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();

    Ok(config)
}

impl Connect for SignalFxConnector {
    type Transport = HttpTransport;

    fn connect(&self) -> Result<HttpTransport, TransportError> {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(self.https_connector()?);

        debug!(endpoint = %self.endpoint, "Created SignalFx client.");

        Ok(HttpTransport {
            client,
            endpoint: self.endpoint.clone(),
            auth_token: self.auth_token.clone(),
            timeout: self.timeout,
        })
    }
}

/// Uploads batches as protocol buffer encoded datapoints over HTTP(S).
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    endpoint: Uri,
    auth_token: HeaderValue,
    timeout: Duration,
}

impl HttpTransport {
    async fn upload(&self, batch: &[Observation]) -> Result<(), TransportError> {
        let body = DataPointUploadMessage::from_batch(batch, unix_timestamp_ms()).encode_to_vec();
        let body_len = body.len();

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .header(header::USER_AGENT, USER_AGENT)
            .header(AUTH_TOKEN_HEADER, self.auth_token.clone())
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| TransportError::Request(Box::new(e)))?;

        trace!(datapoints = batch.len(), body_len, "Sending upload request.");

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|e| TransportError::Request(Box::new(e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map(Collected::to_bytes)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_else(|_| String::from("<failed to read response body>"));

        Err(TransportError::UnexpectedStatus { status: status.as_u16(), body })
    }
}

impl Transport for HttpTransport {
    fn submit<'a>(&'a mut self, batch: &'a [Observation]) -> SubmitFuture<'a> {
        Box::pin(self.upload(batch))
    }
}

fn unix_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
