//! Exchange of a one-time login code for a bearer credential.

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::credential::Credential;
use crate::descriptor::Verb;
use crate::transport::{OutboundRequest, Transport, TransportError};

/// Login endpoint, relative to the environment base address
pub const LOGIN_PATH: &str = "/auth/login";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LoginError {
    #[error("login code unavailable: {0}")]
    CodeUnavailable(String),

    #[error("login request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("login failed: {status}")]
    Rejected { status: u16 },

    #[error("invalid login response: {0}")]
    InvalidResponse(#[source] serde_json::Error),
}

/// Obtains a fresh credential. Invoked once per login; never retried here.
#[async_trait]
pub trait LoginExchange: Send + Sync {
    /// # Errors
    /// Returns [`LoginError`] if no credential could be obtained.
    async fn exchange(&self) -> Result<Credential, LoginError>;
}

/// Host source of one-time login codes.
#[async_trait]
pub trait CodeIssuer: Send + Sync {
    /// # Errors
    /// Returns [`LoginError::CodeUnavailable`] if the host cannot issue a code.
    async fn issue_code(&self) -> Result<String, LoginError>;
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    openid: String,
}

/// `POST /auth/login {"code"}` over the environment's transport.
///
/// The request carries no `Authorization` header. Only status `200` counts as
/// success.
pub struct HttpLoginExchange {
    transport: Arc<dyn Transport>,
    issuer: Arc<dyn CodeIssuer>,
}

impl HttpLoginExchange {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, issuer: Arc<dyn CodeIssuer>) -> Self {
        Self { transport, issuer }
    }
}

#[async_trait]
impl LoginExchange for HttpLoginExchange {
    async fn exchange(&self) -> Result<Credential, LoginError> {
        let code = self.issuer.issue_code().await?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request = OutboundRequest {
            verb: Verb::Post,
            path: LOGIN_PATH.to_owned(),
            headers,
            body: Some(json!({ "code": code })),
        };

        let response = self.transport.send(request).await?;
        if response.status_code != 200 {
            tracing::warn!(status_code = response.status_code, "login rejected");
            return Err(LoginError::Rejected {
                status: response.status_code,
            });
        }

        let body: LoginResponse =
            serde_json::from_value(response.data).map_err(LoginError::InvalidResponse)?;
        tracing::info!(user_id = %body.openid, "login exchange succeeded");
        Ok(Credential::new(body.token, body.openid))
    }
}
