use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, USER_AGENT};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use serde_json::Value;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};

use super::{OutboundRequest, Transport, TransportError, TransportResponse};

type HttpService =
    BoxCloneSyncService<http::Request<Full<Bytes>>, http::Response<Incoming>, TransportError>;

/// Plain HTTP(S) transport to `base_address + path`.
///
/// Each attempt is bounded by a tower [`TimeoutLayer`]; reading the body is
/// bounded by the same duration.
#[derive(Clone)]
pub struct DirectTransport {
    service: HttpService,
    base_address: String,
    timeout: Duration,
    user_agent: Option<HeaderValue>,
}

impl DirectTransport {
    /// # Errors
    /// Returns [`TransportError::Other`] if the TLS connector cannot be built.
    pub fn new(
        base_address: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, TransportError> {
        let provider = rustls::crypto::CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| TransportError::Other(Box::new(e)))?
            .https_or_http()
            .enable_all_versions()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        let service = BoxCloneSyncService::new(
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(timeout))
                .service(client)
                .map_err(move |e: tower::BoxError| map_tower_error(e, timeout)),
        );

        let user_agent = match HeaderValue::from_str(user_agent) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(user_agent, error = %e, "ignoring invalid user agent");
                None
            }
        };

        Ok(Self {
            service,
            base_address: base_address.to_owned(),
            timeout,
            user_agent,
        })
    }

    /// Compose the absolute URI of a call.
    ///
    /// A base address without a scheme (the relay's `/api` prefix, for
    /// example) cannot be dialled directly.
    fn compose_uri(&self, path: &str) -> Result<http::Uri, TransportError> {
        let address = format!("{}{path}", self.base_address);
        let uri: http::Uri = address
            .parse()
            .map_err(|e| TransportError::Config(format!("invalid address {address:?}: {e}")))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(TransportError::Config(format!(
                "address {address:?} has no scheme; direct transport needs an absolute URL"
            )));
        }
        Ok(uri)
    }

    fn build_request(
        &self,
        request: OutboundRequest,
    ) -> Result<http::Request<Full<Bytes>>, TransportError> {
        let uri = self.compose_uri(&request.path)?;
        let body = match &request.body {
            Some(value) => {
                Bytes::from(serde_json::to_vec(value).map_err(|e| TransportError::Other(e.into()))?)
            }
            None => Bytes::new(),
        };

        let mut http_request = http::Request::builder()
            .method(request.verb.as_method())
            .uri(uri)
            .body(Full::new(body))
            .map_err(|e| TransportError::Other(e.into()))?;
        *http_request.headers_mut() = request.headers;
        if let Some(ua) = &self.user_agent {
            http_request.headers_mut().insert(USER_AGENT, ua.clone());
        }
        Ok(http_request)
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let verb = request.verb;
        let http_request = self.build_request(request)?;
        let uri = http_request.uri().clone();
        tracing::debug!(%verb, %uri, "direct request");

        let response = self.service.clone().oneshot(http_request).await?;
        let status_code = response.status().as_u16();

        let collected = tokio::time::timeout(self.timeout, response.into_body().collect())
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|e| TransportError::Other(Box::new(e)))?;

        tracing::debug!(%verb, %uri, status_code, "direct response");
        Ok(TransportResponse::new(
            status_code,
            decode_body(&collected.to_bytes()),
        ))
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

fn decode_body(raw: &[u8]) -> Value {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

/// Map tower errors to [`TransportError`], separating timeouts and connect
/// failures from everything else.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> TransportError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return TransportError::Timeout(timeout);
    }
    match err.downcast::<hyper_util::client::legacy::Error>() {
        Ok(client_err) if client_err.is_connect() => TransportError::Connect(client_err),
        Ok(client_err) => TransportError::Other(client_err),
        Err(other) => TransportError::Other(other),
    }
}
