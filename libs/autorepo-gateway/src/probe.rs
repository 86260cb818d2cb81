//! Connectivity check against the backend root of a direct environment.

use std::time::Duration;

use http::HeaderMap;
use serde_json::Value;

use crate::config::{EnvironmentDescriptor, TransportMode};
use crate::descriptor::Verb;
use crate::error::{CallError, ErrorKind};
use crate::transport::{DirectTransport, OutboundRequest, Transport, TransportError};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the probe saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub url: String,
    /// `true` only for status `200`
    pub success: bool,
    pub status_code: Option<u16>,
    pub message: String,
    pub detail: String,
}

/// `GET` the backend root (base address with its first `/api` removed).
///
/// Unreachable backends produce an unsuccessful report, not an error.
///
/// # Errors
/// Returns [`ErrorKind::ConfigError`] for relay environments or a base
/// address that cannot be dialled directly.
pub async fn probe_connectivity(
    environment: &EnvironmentDescriptor,
    user_agent: &str,
) -> Result<ProbeReport, CallError> {
    if environment.transport_mode == TransportMode::Relay {
        return Err(CallError::new(
            ErrorKind::ConfigError,
            "connectivity probe needs a direct environment",
        ));
    }

    let url = environment.base_address.replacen("/api", "", 1);
    let transport = DirectTransport::new(&url, PROBE_TIMEOUT, user_agent).map_err(|e| {
        CallError::new(ErrorKind::UnknownError, "cannot build HTTP client").with_cause(e)
    })?;

    let request = OutboundRequest {
        verb: Verb::Get,
        path: String::new(),
        headers: HeaderMap::new(),
        body: None,
    };

    tracing::info!(%url, "probing backend");
    let report = match transport.send(request).await {
        Ok(response) if response.status_code == 200 => ProbeReport {
            url,
            success: true,
            status_code: Some(200),
            message: "connection succeeded".to_owned(),
            detail: pretty(&response.data),
        },
        Ok(response) => ProbeReport {
            url,
            success: false,
            status_code: Some(response.status_code),
            message: format!("connection failed (status {})", response.status_code),
            detail: pretty(&response.data),
        },
        Err(TransportError::Config(message)) => {
            return Err(CallError::new(ErrorKind::ConfigError, message));
        }
        Err(e) => ProbeReport {
            url,
            success: false,
            status_code: None,
            message: "network request failed".to_owned(),
            detail: e.to_string(),
        },
    };
    tracing::info!(
        url = %report.url,
        success = report.success,
        status_code = report.status_code,
        "probe finished"
    );
    Ok(report)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
