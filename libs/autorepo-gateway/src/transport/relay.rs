use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use super::{OutboundRequest, Transport, TransportError, TransportResponse};
use crate::descriptor::Verb;

/// Relay routing block; `env` selects the backend container environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayConfig {
    pub env: String,
}

/// What the host relay receives for one attempt.
///
/// The environment identifier travels in `config`, never in `header`.
#[derive(Clone, PartialEq, Serialize)]
pub struct RelayEnvelope {
    pub config: RelayConfig,
    /// Base prefix plus call path (`/api/repos`)
    pub path: String,
    pub method: Verb,
    pub header: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Debug for RelayEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayEnvelope")
            .field("config", &self.config)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("header", &self.header.keys().collect::<Vec<_>>())
            .field("data", &self.data)
            .finish()
    }
}

/// Host-provided call-through-container capability.
#[async_trait]
pub trait RelayChannel: Send + Sync {
    /// Whether the host can relay calls right now. Checked before every
    /// attempt.
    fn is_available(&self) -> bool {
        true
    }

    /// Deliver one envelope and report the backend's response.
    ///
    /// # Errors
    /// Implementations classify their own failures as
    /// [`TransportError::Timeout`], [`TransportError::Connect`] or
    /// [`TransportError::Other`].
    async fn call_container(
        &self,
        envelope: RelayEnvelope,
    ) -> Result<TransportResponse, TransportError>;
}

/// Transport over the host relay.
///
/// Without a channel, or when the channel reports itself unavailable, every
/// attempt fails with [`TransportError::Unavailable`] and nothing is sent.
pub struct RelayTransport {
    channel: Option<Arc<dyn RelayChannel>>,
    config: RelayConfig,
    base_path: String,
    timeout: Duration,
}

impl RelayTransport {
    #[must_use]
    pub fn new(
        channel: Option<Arc<dyn RelayChannel>>,
        config: RelayConfig,
        base_path: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            channel,
            config,
            base_path: base_path.to_owned(),
            timeout,
        }
    }

    fn envelope(&self, request: OutboundRequest) -> RelayEnvelope {
        RelayEnvelope {
            config: self.config.clone(),
            path: format!("{}{}", self.base_path, request.path),
            method: request.verb,
            header: header_map(&request.headers),
            data: request.body,
        }
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

#[async_trait]
impl Transport for RelayTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let channel = match &self.channel {
            Some(channel) if channel.is_available() => channel,
            _ => {
                tracing::warn!(path = %request.path, "relay channel is not available on this host");
                return Err(TransportError::Unavailable(
                    "container relay is not supported by this host".to_owned(),
                ));
            }
        };

        let envelope = self.envelope(request);
        tracing::debug!(
            method = %envelope.method,
            path = %envelope.path,
            env = %envelope.config.env,
            "relay request"
        );

        let response = tokio::time::timeout(self.timeout, channel.call_container(envelope))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        tracing::debug!(status_code = response.status_code, "relay response");
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}
