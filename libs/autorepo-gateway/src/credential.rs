use std::sync::Arc;

use parking_lot::RwLock;

use crate::secret::SecretString;
use crate::storage::KeyValueStorage;

/// Storage key for the bearer token
pub const TOKEN_KEY: &str = "autorepo_token";
/// Storage key for the user identifier
pub const OPENID_KEY: &str = "autorepo_openid";

/// Bearer token plus the user identifier returned with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: SecretString,
    pub user_id: String,
}

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token),
            user_id: user_id.into(),
        }
    }
}

/// Current credential, mirrored to host storage.
///
/// The in-memory copy is authoritative for the running process. Storage
/// failures are logged and otherwise ignored, so a broken store degrades to a
/// session-only login instead of failing calls.
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStorage>,
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Restore the credential persisted by a previous run, if both halves
    /// are present. A half-written pair is removed.
    #[must_use]
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let current = Self::read_persisted(storage.as_ref());
        let store = Self {
            storage,
            current: RwLock::new(current),
        };
        if store.current.read().is_none() {
            store.remove_persisted();
        }
        store
    }

    fn read_persisted(storage: &dyn KeyValueStorage) -> Option<Credential> {
        let token = storage.get(TOKEN_KEY);
        let user_id = storage.get(OPENID_KEY);
        match (token, user_id) {
            (Ok(Some(token)), Ok(Some(user_id))) if !token.is_empty() => {
                tracing::debug!(user_id = %user_id, "restored persisted credential");
                Some(Credential::new(token, user_id))
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "failed to read persisted credential");
                None
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    /// Raw bearer token of the current credential.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.current.read().as_ref().map(|c| c.token.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the current credential and persist both keys.
    pub fn store(&self, credential: Credential) {
        for (key, value) in [
            (TOKEN_KEY, credential.token.expose()),
            (OPENID_KEY, credential.user_id.as_str()),
        ] {
            if let Err(e) = self.storage.set(key, value) {
                tracing::warn!(key, error = %e, "failed to persist credential");
            }
        }
        tracing::info!(user_id = %credential.user_id, "credential stored");
        *self.current.write() = Some(credential);
    }

    /// Forget the current credential in memory and in storage.
    pub fn clear(&self) {
        let previous = self.current.write().take();
        self.remove_persisted();
        if previous.is_some() {
            tracing::info!("credential cleared");
        }
    }

    fn remove_persisted(&self) {
        for key in [TOKEN_KEY, OPENID_KEY] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove persisted credential");
            }
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}
