//! Physical channels a call can travel over.
//!
//! Both implementations yield the same [`TransportResponse`] shape; the
//! gateway never needs to know which one carried the call.

mod direct;
mod relay;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use serde_json::Value;
use thiserror::Error;

use crate::config::{EnvironmentDescriptor, GatewayConfig, TransportMode};
use crate::descriptor::Verb;

pub use direct::DirectTransport;
pub use relay::{RelayChannel, RelayConfig, RelayEnvelope, RelayTransport};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One attempt of a call, with headers already attached.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub verb: Verb,
    /// Path relative to the environment's base address, query included
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

/// Status and decoded body of a response that reached the client.
///
/// Empty bodies decode to `Value::Null`; non-JSON bodies are kept as
/// `Value::String`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub data: Value,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status_code: u16, data: Value) -> Self {
        Self { status_code, data }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Failure before any response status was received.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("transport attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend unreachable: {0}")]
    Connect(#[source] BoxError),

    #[error("relay channel unavailable: {0}")]
    Unavailable(String),

    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("transport failure: {0}")]
    Other(#[source] BoxError),
}

/// A channel that carries one attempt and reports what came back.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one attempt. No retries happen at this layer.
    ///
    /// # Errors
    /// Returns [`TransportError`] when no response status was received.
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;

    /// Short name for logs (`"direct"`, `"relay"`).
    fn name(&self) -> &'static str;
}

/// Pick the transport for an environment.
///
/// Relay mode never falls back to direct HTTP: without a `relay` channel the
/// returned transport fails every call with [`TransportError::Unavailable`].
///
/// # Errors
/// Returns [`TransportError::Other`] if the HTTPS connector cannot be built.
pub fn select_transport(
    descriptor: &EnvironmentDescriptor,
    config: &GatewayConfig,
    relay: Option<Arc<dyn RelayChannel>>,
) -> Result<Arc<dyn Transport>, TransportError> {
    let transport: Arc<dyn Transport> = match descriptor.transport_mode {
        TransportMode::Direct => Arc::new(DirectTransport::new(
            &descriptor.base_address,
            config.request_timeout,
            &config.user_agent,
        )?),
        TransportMode::Relay => Arc::new(RelayTransport::new(
            relay,
            RelayConfig {
                env: config.relay_env_id.clone(),
            },
            &descriptor.base_address,
            config.request_timeout,
        )),
    };
    tracing::debug!(
        transport = transport.name(),
        base_address = %descriptor.base_address,
        environment = %descriptor.label,
        "transport selected"
    );
    Ok(transport)
}
