use std::sync::Arc;

use http::HeaderMap;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::builder::GatewayBuilder;
use crate::config::{EnvironmentDescriptor, GatewayConfig};
use crate::credential::{Credential, CredentialStore};
use crate::descriptor::{CallDescriptor, Verb};
use crate::detail::error_message;
use crate::error::{CallError, ErrorKind};
use crate::login::{LoginError, LoginExchange};
use crate::reauth::ReauthFlow;
use crate::transport::{OutboundRequest, Transport, TransportError, TransportResponse};

/// Outcome of one dispatch, including its timeout resubmissions.
enum Dispatch {
    Resolved(Value),
    AuthRequired,
}

/// Typed remote call gateway.
///
/// Turns a [`CallDescriptor`] into the decoded response body or a
/// [`CallError`]. A `401` runs the [`ReauthFlow`] and replays the original
/// descriptor once; transport timeouts are resubmitted while the descriptor's
/// retry budget lasts.
///
/// `CallGateway` is `Send + Sync`; share it behind an `Arc`.
pub struct CallGateway {
    environment: EnvironmentDescriptor,
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    exchange: Arc<dyn LoginExchange>,
    reauth: ReauthFlow,
    timeout_retries: u32,
}

impl CallGateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub(crate) fn from_parts(
        environment: EnvironmentDescriptor,
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
        exchange: Arc<dyn LoginExchange>,
        reauth: ReauthFlow,
        timeout_retries: u32,
    ) -> Self {
        Self {
            environment,
            transport,
            credentials,
            exchange,
            reauth,
            timeout_retries,
        }
    }

    #[must_use]
    pub fn environment(&self) -> &EnvironmentDescriptor {
        &self.environment
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    #[must_use]
    pub fn reauth(&self) -> &ReauthFlow {
        &self.reauth
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// Execute a call.
    ///
    /// # Errors
    /// Returns a [`CallError`] classified by [`ErrorKind`] for every outcome
    /// other than a `2xx` response.
    pub async fn call(&self, descriptor: CallDescriptor) -> Result<Value, CallError> {
        match self.dispatch(&descriptor).await? {
            Dispatch::Resolved(value) => Ok(value),
            Dispatch::AuthRequired => {
                tracing::info!(
                    verb = %descriptor.verb(),
                    path = descriptor.path(),
                    "401 received; starting re-authentication"
                );
                self.reauth.run(|| self.replay(&descriptor)).await
            }
        }
    }

    /// Execute a call and decode the body into `T`.
    ///
    /// # Errors
    /// As [`call`](Self::call); a body that does not decode as `T` is
    /// [`ErrorKind::UnknownError`].
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        descriptor: CallDescriptor,
    ) -> Result<T, CallError> {
        let value = self.call(descriptor).await?;
        serde_json::from_value(value).map_err(|e| {
            let message = format!("unexpected response body: {e}");
            CallError::new(ErrorKind::UnknownError, message).with_cause(e)
        })
    }

    /// `GET path` with the configured timeout budget.
    ///
    /// # Errors
    /// See [`call_json`](Self::call_json).
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CallError> {
        self.call_json(self.descriptor(Verb::Get, path, None)).await
    }

    /// # Errors
    /// See [`call_json`](Self::call_json).
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CallError> {
        let body = encode_body(body)?;
        self.call_json(self.descriptor(Verb::Post, path, Some(body)))
            .await
    }

    /// # Errors
    /// See [`call_json`](Self::call_json).
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CallError> {
        let body = encode_body(body)?;
        self.call_json(self.descriptor(Verb::Put, path, Some(body)))
            .await
    }

    /// # Errors
    /// See [`call_json`](Self::call_json).
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CallError> {
        let body = encode_body(body)?;
        self.call_json(self.descriptor(Verb::Patch, path, Some(body)))
            .await
    }

    /// # Errors
    /// See [`call_json`](Self::call_json).
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, CallError> {
        self.call_json(self.descriptor(Verb::Delete, path, None))
            .await
    }

    /// Descriptor carrying the configured timeout retry budget.
    #[must_use]
    pub fn descriptor(&self, verb: Verb, path: &str, body: Option<Value>) -> CallDescriptor {
        let descriptor = CallDescriptor::new(verb, path).with_retries(self.timeout_retries);
        match body {
            Some(body) => descriptor.with_body(body),
            None => descriptor,
        }
    }

    /// Exchange a fresh login code and store the resulting credential.
    ///
    /// # Errors
    /// Returns [`LoginError`] if the exchange fails; the stored credential is
    /// left unchanged.
    pub async fn login(&self) -> Result<Credential, LoginError> {
        let credential = self.exchange.exchange().await?;
        self.credentials.store(credential.clone());
        Ok(credential)
    }

    /// Log in only if no credential is stored (startup auto-login).
    ///
    /// # Errors
    /// See [`login`](Self::login).
    pub async fn ensure_logged_in(&self) -> Result<Credential, LoginError> {
        match self.credentials.current() {
            Some(credential) => Ok(credential),
            None => self.login().await,
        }
    }

    pub fn logout(&self) {
        self.credentials.clear();
    }

    /// The single replay after a successful re-login.
    async fn replay(&self, descriptor: &CallDescriptor) -> Result<Value, CallError> {
        match self.dispatch(descriptor).await? {
            Dispatch::Resolved(value) => Ok(value),
            Dispatch::AuthRequired => {
                tracing::warn!(
                    path = descriptor.path(),
                    "401 on replay after re-login; clearing credential"
                );
                self.credentials.clear();
                Err(CallError::unauthorized("unauthorized after re-login"))
            }
        }
    }

    /// Send `descriptor`, resubmitting after timeouts while its budget lasts.
    async fn dispatch(&self, descriptor: &CallDescriptor) -> Result<Dispatch, CallError> {
        let mut attempt = descriptor.clone();
        loop {
            match self.transport.send(self.outbound(&attempt)).await {
                Ok(response) => return classify(response),
                Err(TransportError::Timeout(after)) => {
                    let Some(next) = attempt.resubmission() else {
                        tracing::warn!(
                            verb = %attempt.verb(),
                            path = attempt.path(),
                            ?after,
                            "attempt timed out; retry budget exhausted"
                        );
                        return Err(map_transport_error(TransportError::Timeout(after)));
                    };
                    tracing::warn!(
                        verb = %attempt.verb(),
                        path = attempt.path(),
                        retries_remaining = next.retries_remaining(),
                        "attempt timed out; resubmitting"
                    );
                    attempt = next;
                }
                Err(e) => {
                    tracing::debug!(
                        verb = %attempt.verb(),
                        path = attempt.path(),
                        transport = self.transport.name(),
                        error = %e,
                        "transport failure"
                    );
                    return Err(map_transport_error(e));
                }
            }
        }
    }

    fn outbound(&self, descriptor: &CallDescriptor) -> OutboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = self.credentials.token() {
            match token.bearer_header() {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    tracing::warn!("stored token is not a valid header value; sending without it");
                }
            }
        }
        OutboundRequest {
            verb: descriptor.verb(),
            path: descriptor.path().to_owned(),
            headers,
            body: descriptor.body().cloned(),
        }
    }
}

fn classify(response: TransportResponse) -> Result<Dispatch, CallError> {
    match response.status_code {
        200..=299 => Ok(Dispatch::Resolved(response.data)),
        401 => Ok(Dispatch::AuthRequired),
        status => {
            let message = error_message(&response.data);
            tracing::debug!(status_code = status, %message, "call failed");
            Err(CallError::from_status(status, message))
        }
    }
}

fn map_transport_error(err: TransportError) -> CallError {
    match err {
        TransportError::Timeout(after) => CallError::new(
            ErrorKind::Timeout,
            format!("request timed out after {after:?}"),
        ),
        TransportError::Connect(source) => {
            CallError::new(ErrorKind::NetworkError, "backend unreachable").with_cause(source)
        }
        TransportError::Unavailable(message) => {
            CallError::new(ErrorKind::SystemUnavailable, message)
        }
        TransportError::Config(message) => CallError::new(ErrorKind::ConfigError, message),
        TransportError::Other(source) => {
            CallError::new(ErrorKind::UnknownError, "transport failure").with_cause(source)
        }
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, CallError> {
    serde_json::to_value(body).map_err(|e| {
        let message = format!("request body is not valid JSON: {e}");
        CallError::new(ErrorKind::UnknownError, message).with_cause(e)
    })
}
