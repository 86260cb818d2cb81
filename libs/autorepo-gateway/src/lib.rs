#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Typed remote call gateway for the `AutoRepo` backend
//!
//! This crate turns a `(path, verb, payload)` tuple into a decoded JSON value
//! or a [`CallError`] with a fixed [`ErrorKind`]. It provides:
//! - Two interchangeable transports: direct HTTP (hyper + rustls) and a
//!   host-managed relay channel, selected once from the environment table
//! - Bearer credentials persisted through host key-value storage
//! - Bounded resubmission of calls whose transport attempt timed out
//! - A single-flight re-authentication flow on `401`, followed by exactly
//!   one replay of the original call
//!
//! # Example
//!
//! ```ignore
//! use autorepo_gateway::{CallGateway, GatewayConfig, MemoryStorage};
//! use std::sync::Arc;
//!
//! let gateway = CallGateway::builder(GatewayConfig::default())
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .dialog(dialog)
//!     .code_issuer(issuer)
//!     .navigation(navigation)
//!     .build()?;
//!
//! let repos: serde_json::Value = gateway.get("/repos").await?;
//! ```

mod builder;
mod config;
mod credential;
mod descriptor;
mod detail;
mod error;
mod gateway;
mod login;
mod probe;
mod reauth;
mod secret;
mod storage;
pub mod transport;

pub use builder::{BuildError, GatewayBuilder};
pub use config::{
    DEFAULT_RELAY_ENV_ID, DEFAULT_USER_AGENT, EnvironmentDescriptor, EnvironmentName,
    GatewayConfig, TransportMode,
};
pub use credential::{Credential, CredentialStore, OPENID_KEY, TOKEN_KEY};
pub use descriptor::{CallDescriptor, Verb};
pub use detail::{DEFAULT_FAILURE_MESSAGE, error_message};
pub use error::{CallError, ErrorKind};
pub use gateway::CallGateway;
pub use login::{CodeIssuer, HttpLoginExchange, LOGIN_PATH, LoginError, LoginExchange};
pub use probe::{PROBE_TIMEOUT, ProbeReport, probe_connectivity};
pub use reauth::{
    ConfirmationDialog, DialogChoice, DialogError, DialogPrompt, NavigationReset, ReauthFlow,
    ReauthGuard, ReauthPermit, ReauthState,
};
pub use secret::SecretString;
pub use storage::{JsonFileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use transport::{Transport, TransportError, TransportResponse};
