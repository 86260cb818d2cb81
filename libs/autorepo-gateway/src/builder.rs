use std::sync::Arc;

use thiserror::Error;

use crate::config::{EnvironmentDescriptor, GatewayConfig};
use crate::credential::CredentialStore;
use crate::gateway::CallGateway;
use crate::login::{CodeIssuer, HttpLoginExchange, LoginExchange};
use crate::reauth::{ConfirmationDialog, DialogPrompt, NavigationReset, ReauthFlow};
use crate::storage::{KeyValueStorage, MemoryStorage};
use crate::transport::{RelayChannel, Transport, TransportError, select_transport};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BuildError {
    #[error("missing host collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Builder for [`CallGateway`].
///
/// The confirmation dialog, navigation reset and a code issuer (or a
/// complete [`LoginExchange`]) are required. Storage defaults to
/// [`MemoryStorage`].
#[must_use]
pub struct GatewayBuilder {
    config: GatewayConfig,
    environment: Option<EnvironmentDescriptor>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    relay: Option<Arc<dyn RelayChannel>>,
    transport: Option<Arc<dyn Transport>>,
    dialog: Option<Arc<dyn ConfirmationDialog>>,
    code_issuer: Option<Arc<dyn CodeIssuer>>,
    login_exchange: Option<Arc<dyn LoginExchange>>,
    navigation: Option<Arc<dyn NavigationReset>>,
    prompt: Option<DialogPrompt>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            environment: None,
            storage: None,
            relay: None,
            transport: None,
            dialog: None,
            code_issuer: None,
            login_exchange: None,
            navigation: None,
            prompt: None,
        }
    }

    /// Use this descriptor instead of the one selected by the config.
    pub fn environment(mut self, environment: EnvironmentDescriptor) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Host relay capability for relay environments.
    pub fn relay_channel(mut self, relay: Arc<dyn RelayChannel>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Replace the selected transport entirely.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn dialog(mut self, dialog: Arc<dyn ConfirmationDialog>) -> Self {
        self.dialog = Some(dialog);
        self
    }

    pub fn prompt(mut self, prompt: DialogPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Source of one-time codes for the built-in `/auth/login` exchange.
    pub fn code_issuer(mut self, issuer: Arc<dyn CodeIssuer>) -> Self {
        self.code_issuer = Some(issuer);
        self
    }

    /// Replace the built-in login exchange.
    pub fn login_exchange(mut self, exchange: Arc<dyn LoginExchange>) -> Self {
        self.login_exchange = Some(exchange);
        self
    }

    pub fn navigation(mut self, navigation: Arc<dyn NavigationReset>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Build the gateway, restoring any persisted credential.
    ///
    /// # Errors
    /// - [`BuildError::MissingCollaborator`] if a required host collaborator
    ///   was not supplied
    /// - [`BuildError::Transport`] if the HTTPS connector cannot be built
    pub fn build(self) -> Result<CallGateway, BuildError> {
        let dialog = self
            .dialog
            .ok_or(BuildError::MissingCollaborator("confirmation dialog"))?;
        let navigation = self
            .navigation
            .ok_or(BuildError::MissingCollaborator("navigation reset"))?;

        let environment = self
            .environment
            .unwrap_or_else(|| self.config.descriptor());
        let transport = match self.transport {
            Some(transport) => transport,
            None => select_transport(&environment, &self.config, self.relay)?,
        };

        let exchange: Arc<dyn LoginExchange> = match (self.login_exchange, self.code_issuer) {
            (Some(exchange), _) => exchange,
            (None, Some(issuer)) => Arc::new(HttpLoginExchange::new(transport.clone(), issuer)),
            (None, None) => return Err(BuildError::MissingCollaborator("code issuer")),
        };

        let storage = self.storage.unwrap_or_else(|| {
            tracing::debug!("no storage supplied; credentials last for this process only");
            Arc::new(MemoryStorage::new())
        });
        let credentials = Arc::new(CredentialStore::load(storage));

        let mut reauth = ReauthFlow::new(credentials.clone(), exchange.clone(), dialog, navigation);
        if let Some(prompt) = self.prompt {
            reauth = reauth.with_prompt(prompt);
        }

        tracing::info!(
            environment = %environment.label,
            transport = transport.name(),
            authenticated = credentials.is_authenticated(),
            "call gateway ready"
        );

        Ok(CallGateway::from_parts(
            environment,
            transport,
            credentials,
            exchange,
            reauth,
            self.config.timeout_retries,
        ))
    }
}
