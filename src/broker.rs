//! A single broker: one connection, its negotiated API versions, and the
//! correlation counter.
//!
//! Every exchange holds the broker lock from encode to decode, so
//! correlation ids on the wire are strictly monotonic and each response is
//! parsed at the same version chosen while sending. Connection bring-up is
//! lazy: the first request after construction (or after an I/O failure
//! closed the connection) dials, negotiates ApiVersions, and runs SASL
//! authentication when credentials are configured.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::constants::{BRING_UP_CLIENT_ID, SASL_CLIENT_ID};
use crate::error::{Error, Result};
use crate::network::BrokerConnection;
use crate::protocol::{
    encode_request, pick_version, ApiKey, ApiVersionRange, ApiVersionsRequest, FetchRequest,
    KafkaRequest, KafkaResponse, SaslAuthenticateRequest, SaslHandshakeRequest, SaslMechanism,
};
use crate::types::{BrokerId, CorrelationId};

#[derive(Debug, Default)]
struct BrokerInner {
    conn: Option<BrokerConnection>,
    api_versions: Vec<ApiVersionRange>,
    correlation: CorrelationId,
}

/// Handle to one cluster node. Cheap to clone; all clones share the
/// connection and serialize through its lock.
#[derive(Debug, Clone)]
pub struct Broker {
    node_id: BrokerId,
    address: String,
    config: Arc<ClientConfig>,
    inner: Arc<Mutex<BrokerInner>>,
}

impl Broker {
    /// Create a handle without dialing; the connection opens on first use.
    pub fn new(address: &str, node_id: BrokerId, config: Arc<ClientConfig>) -> Self {
        Self {
            node_id,
            address: address.to_string(),
            config,
            inner: Arc::new(Mutex::new(BrokerInner::default())),
        }
    }

    pub fn node_id(&self) -> BrokerId {
        self.node_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The API version table learned from this broker, empty when the
    /// connection has never been opened.
    pub async fn api_versions(&self) -> Vec<ApiVersionRange> {
        self.inner.lock().await.api_versions.clone()
    }

    /// Close the connection. The next request reopens it.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.conn = None;
    }

    /// The single synchronous RPC entrypoint: encode, write, read, decode,
    /// all under the broker lock.
    ///
    /// A non-zero top-level error code in the response surfaces as
    /// [`Error::Kafka`]; the connection stays healthy in that case.
    pub async fn request<R: KafkaRequest>(&self, request: &R) -> Result<R::Response> {
        let mut inner = self.inner.lock().await;
        Self::open_if_needed(&mut inner, &self.config, &self.address).await?;

        match Self::exchange(&mut inner, &self.config, request, &self.config.client_id).await {
            Ok(response) => match response.error() {
                Some(code) => Err(Error::Kafka(code)),
                None => Ok(response),
            },
            Err(e) => {
                if e.poisons_connection() {
                    warn!(broker = %self.address, error = %e, "closing connection");
                    inner.conn = None;
                }
                Err(e)
            }
        }
    }

    /// Issue a Fetch and hand the response body back as a streaming reader
    /// instead of buffering it.
    ///
    /// The returned [`FetchStream`] owns the broker lock; other requests on
    /// this broker wait until the body is drained or the stream is dropped.
    /// Dropping the stream before the body is exhausted closes the
    /// connection (its state is unknown mid-frame).
    pub async fn request_streaming(&self, request: &FetchRequest) -> Result<FetchStream> {
        let mut guard = self.inner.clone().lock_owned().await;
        Self::open_if_needed(&mut guard, &self.config, &self.address).await?;

        let version = pick_version(ApiKey::Fetch, &guard.api_versions);
        guard.correlation = guard.correlation.next();
        let correlation_id = guard.correlation;
        let frame = encode_request(request, version, correlation_id, &self.config.client_id)?;
        let read_timeout = self.config.timeout_for(ApiKey::Fetch);

        debug!(
            broker = %self.address,
            version,
            correlation = %correlation_id,
            "sending streaming fetch"
        );

        let started = async {
            let conn = guard.conn.as_mut().ok_or(Error::NoAvailableBroker)?;
            conn.send(&frame).await?;
            let frame_len = conn.recv_frame_len(read_timeout).await?;
            if frame_len < 4 {
                return Err(Error::BadLength(frame_len as i32));
            }
            let echoed = conn.recv_exact(4).await?;
            let received = i32::from_be_bytes(echoed[..4].try_into().expect("4 bytes"));
            if received != correlation_id.value() {
                return Err(Error::CorrelationMismatch {
                    sent: correlation_id.value(),
                    received,
                });
            }
            Ok(frame_len - 4)
        }
        .await;

        match started {
            Ok(remaining) => Ok(FetchStream {
                guard,
                remaining,
                version,
            }),
            Err(e) => {
                if e.poisons_connection() {
                    guard.conn = None;
                }
                Err(e)
            }
        }
    }

    /// Dial and run connection bring-up if the connection is closed:
    /// ApiVersions negotiation first (sent at version 0, before the
    /// broker's table is known), then SASL when configured. Any failure
    /// tears the connection back down.
    async fn open_if_needed(
        inner: &mut BrokerInner,
        config: &ClientConfig,
        address: &str,
    ) -> Result<()> {
        if inner.conn.is_some() {
            return Ok(());
        }

        inner.conn = Some(BrokerConnection::connect(address, config).await?);
        inner.api_versions.clear();
        inner.correlation = CorrelationId::default();

        let bring_up = async {
            let response =
                Self::exchange(inner, config, &ApiVersionsRequest, BRING_UP_CLIENT_ID).await?;
            if let Some(code) = response.error() {
                return Err(Error::Kafka(code));
            }
            debug!(
                broker = address,
                apis = response.api_versions.len(),
                "negotiated api versions"
            );
            inner.api_versions = response.api_versions;

            if config.sasl.is_some() {
                Self::authenticate(inner, config).await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = bring_up {
            warn!(broker = address, error = %e, "connection bring-up failed");
            inner.conn = None;
            return Err(e);
        }
        Ok(())
    }

    /// SaslHandshake then SaslAuthenticate with the configured credentials.
    async fn authenticate(inner: &mut BrokerInner, config: &ClientConfig) -> Result<()> {
        let sasl = config
            .sasl
            .as_ref()
            .ok_or_else(|| Error::Config("sasl credentials are not set".to_string()))?;

        let handshake = SaslHandshakeRequest::new(sasl.mechanism);
        let response = Self::exchange(inner, config, &handshake, SASL_CLIENT_ID).await?;
        if let Some(code) = response.error() {
            return Err(Error::Kafka(code));
        }

        let token = match sasl.mechanism {
            SaslMechanism::Plain => crate::protocol::sasl::plain_token(&sasl.user, &sasl.password),
            other => {
                return Err(Error::Config(format!(
                    "sasl mechanism {} is not implemented by this client",
                    other.name()
                )))
            }
        };

        let authenticate = SaslAuthenticateRequest::new(token);
        let response = Self::exchange(inner, config, &authenticate, SASL_CLIENT_ID).await?;
        if let Some(code) = response.error() {
            return Err(Error::Kafka(code));
        }
        Ok(())
    }

    /// One request/response exchange on an open connection. Stamps the next
    /// correlation id, picks the wire version against the broker's table,
    /// and verifies the echoed correlation id before decoding.
    async fn exchange<R: KafkaRequest>(
        inner: &mut BrokerInner,
        config: &ClientConfig,
        request: &R,
        client_id: &str,
    ) -> Result<R::Response> {
        let api = request.api_key();
        let version = pick_version(api, &inner.api_versions);
        inner.correlation = inner.correlation.next();
        let correlation_id = inner.correlation;

        let frame = encode_request(request, version, correlation_id, client_id)?;
        debug!(
            api = api.as_str(),
            version,
            correlation = %correlation_id,
            size = frame.len(),
            "sending request"
        );

        let conn = inner.conn.as_mut().ok_or(Error::NoAvailableBroker)?;
        conn.send(&frame).await?;
        let payload = conn.recv(config.timeout_for(api)).await?;

        if payload.len() < 4 {
            return Err(Error::Parsing(payload));
        }
        let received = i32::from_be_bytes(payload[..4].try_into().expect("4 bytes"));
        if received != correlation_id.value() {
            return Err(Error::CorrelationMismatch {
                sent: correlation_id.value(),
                received,
            });
        }

        R::Response::parse(payload.slice(4..), version)
    }
}

/// Streaming reader over a Fetch response body.
///
/// Holds the broker lock until dropped. Draining the body to completion
/// leaves the connection healthy for the next request; dropping early (or
/// calling [`abort`](FetchStream::abort)) closes it.
pub struct FetchStream {
    guard: OwnedMutexGuard<BrokerInner>,
    remaining: usize,
    version: i16,
}

impl FetchStream {
    /// Bytes of body not yet consumed.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// The negotiated Fetch version, for decoding the framing downstream.
    pub fn version(&self) -> i16 {
        self.version
    }

    /// The next slice of the body, or `None` once it is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let conn = self.guard.conn.as_mut().ok_or(Error::NoAvailableBroker)?;
        match conn.recv_chunk(self.remaining).await {
            Ok(chunk) => {
                self.remaining -= chunk.len();
                Ok(Some(chunk))
            }
            Err(e) => {
                self.guard.conn = None;
                self.remaining = 0;
                Err(e)
            }
        }
    }

    /// Drain the rest of the body into one buffer.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut collected = Vec::with_capacity(self.remaining);
        while let Some(chunk) = self.next_chunk().await? {
            collected.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(collected))
    }

    /// Cancel the stream, closing the connection.
    pub fn abort(mut self) {
        self.guard.conn = None;
        self.remaining = 0;
    }
}

impl Drop for FetchStream {
    fn drop(&mut self) {
        // A half-read frame leaves the stream unusable.
        if self.remaining > 0 {
            self.guard.conn = None;
        }
    }
}
