//! Single-flight re-authentication after a `401`.
//!
//! ```text
//! Idle -> Prompting -> Exchanging -> Resumed
//!             |             |
//!             v             v
//!         Cancelled       Failed
//! ```
//!
//! At most one flow runs at a time. A caller that hits `401` while a flow is
//! active gets [`ErrorKind::UnauthorizedInProgress`] immediately and no second
//! dialog is shown.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::credential::CredentialStore;
use crate::error::{CallError, ErrorKind};
use crate::login::LoginExchange;

/// Text shown by the re-login confirmation dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogPrompt {
    pub title: String,
    pub body: String,
    pub confirm_label: String,
    pub cancel_label: String,
}

impl Default for DialogPrompt {
    fn default() -> Self {
        Self {
            title: "Session expired".to_owned(),
            body: "Your login has expired. Log in again to continue?".to_owned(),
            confirm_label: "Log in".to_owned(),
            cancel_label: "Cancel".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogChoice {
    Confirmed,
    Declined,
}

/// The dialog could not be shown or was dismissed abnormally.
#[derive(Error, Debug)]
#[error("confirmation dialog failed: {message}")]
pub struct DialogError {
    message: String,
}

impl DialogError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Host UI asking the user whether to log in again.
#[async_trait]
pub trait ConfirmationDialog: Send + Sync {
    /// # Errors
    /// Returns [`DialogError`] if the dialog cannot be shown; the flow treats
    /// this like a decline.
    async fn confirm(&self, prompt: &DialogPrompt) -> Result<DialogChoice, DialogError>;
}

/// Host navigation: replace the view stack with the landing view.
pub trait NavigationReset: Send + Sync {
    fn reset_to_landing(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthState {
    Idle,
    Prompting,
    Exchanging,
    Resumed,
    Cancelled,
    Failed,
}

impl fmt::Display for ReauthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Prompting => "prompting",
            Self::Exchanging => "exchanging",
            Self::Resumed => "resumed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        })
    }
}

/// "Re-authentication in progress" flag.
///
/// Acquisition is a single compare-exchange; the returned permit clears the
/// flag when dropped, including when the owning task panics or is cancelled.
#[derive(Debug, Default)]
pub struct ReauthGuard {
    active: AtomicBool,
}

impl ReauthGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` if another flow holds the guard.
    #[must_use]
    pub fn try_acquire(&self) -> Option<ReauthPermit<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReauthPermit { guard: self })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`ReauthGuard`].
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct ReauthPermit<'a> {
    guard: &'a ReauthGuard,
}

impl Drop for ReauthPermit<'_> {
    fn drop(&mut self) {
        self.guard.active.store(false, Ordering::Release);
    }
}

/// Prompt, exchange, store, then resume the interrupted call once.
pub struct ReauthFlow {
    guard: ReauthGuard,
    state: Mutex<ReauthState>,
    credentials: Arc<CredentialStore>,
    exchange: Arc<dyn LoginExchange>,
    dialog: Arc<dyn ConfirmationDialog>,
    navigation: Arc<dyn NavigationReset>,
    prompt: DialogPrompt,
}

impl ReauthFlow {
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialStore>,
        exchange: Arc<dyn LoginExchange>,
        dialog: Arc<dyn ConfirmationDialog>,
        navigation: Arc<dyn NavigationReset>,
    ) -> Self {
        Self {
            guard: ReauthGuard::new(),
            state: Mutex::new(ReauthState::Idle),
            credentials,
            exchange,
            dialog,
            navigation,
            prompt: DialogPrompt::default(),
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: DialogPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.is_active()
    }

    /// State reached by the most recent flow.
    #[must_use]
    pub fn state(&self) -> ReauthState {
        *self.state.lock()
    }

    fn transition(&self, to: ReauthState) {
        let from = std::mem::replace(&mut *self.state.lock(), to);
        tracing::debug!(%from, %to, "re-authentication state change");
    }

    /// Run the flow, then `resume` exactly once if a new credential was
    /// obtained.
    ///
    /// The guard stays held while `resume` runs, so a `401` on the resumed
    /// call cannot start a nested flow.
    ///
    /// # Errors
    /// - [`ErrorKind::UnauthorizedInProgress`] if another flow is active
    /// - [`ErrorKind::Unauthorized`] if the user declines or the exchange
    ///   fails
    /// - whatever `resume` returns
    pub async fn run<F, Fut, T>(&self, resume: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let Some(permit) = self.guard.try_acquire() else {
            tracing::debug!("401 while re-authentication is in progress");
            return Err(CallError::new(
                ErrorKind::UnauthorizedInProgress,
                "re-authentication already in progress",
            )
            .with_status(401));
        };

        self.transition(ReauthState::Prompting);
        self.credentials.clear();

        match self.dialog.confirm(&self.prompt).await {
            Ok(DialogChoice::Confirmed) => {}
            Ok(DialogChoice::Declined) => {
                tracing::info!("user declined re-login");
                return Err(self.cancel(permit, None));
            }
            Err(e) => {
                tracing::warn!(error = %e, "re-login dialog failed");
                return Err(self.cancel(permit, Some(e)));
            }
        }

        self.transition(ReauthState::Exchanging);
        let credential = match self.exchange.exchange().await {
            Ok(credential) => credential,
            Err(e) => {
                self.transition(ReauthState::Failed);
                drop(permit);
                tracing::warn!(error = %e, "re-login exchange failed");
                return Err(CallError::unauthorized("re-login failed").with_cause(e));
            }
        };

        self.credentials.store(credential);
        self.transition(ReauthState::Resumed);
        let outcome = resume().await;
        drop(permit);
        outcome
    }

    fn cancel(&self, permit: ReauthPermit<'_>, cause: Option<DialogError>) -> CallError {
        self.transition(ReauthState::Cancelled);
        drop(permit);
        self.navigation.reset_to_landing();
        let err = CallError::unauthorized("user cancelled login");
        match cause {
            Some(e) => err.with_cause(e),
            None => err,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use crate::login::LoginError;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedDialog {
        choice: Option<DialogChoice>,
        shown: AtomicUsize,
    }

    #[async_trait]
    impl ConfirmationDialog for ScriptedDialog {
        async fn confirm(&self, _prompt: &DialogPrompt) -> Result<DialogChoice, DialogError> {
            self.shown.fetch_add(1, Ordering::SeqCst);
            self.choice.ok_or_else(|| DialogError::new("no window"))
        }
    }

    struct FixedExchange(Option<Credential>);

    #[async_trait]
    impl LoginExchange for FixedExchange {
        async fn exchange(&self) -> Result<Credential, LoginError> {
            self.0
                .clone()
                .ok_or(LoginError::Rejected { status: 500 })
        }
    }

    #[derive(Default)]
    struct CountingNavigation(AtomicUsize);

    impl NavigationReset for CountingNavigation {
        fn reset_to_landing(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        flow: ReauthFlow,
        credentials: Arc<CredentialStore>,
        dialog: Arc<ScriptedDialog>,
        navigation: Arc<CountingNavigation>,
    }

    fn fixture(choice: Option<DialogChoice>, credential: Option<Credential>) -> Fixture {
        let credentials = Arc::new(CredentialStore::load(Arc::new(MemoryStorage::new())));
        credentials.store(Credential::new("stale", "u0"));
        let dialog = Arc::new(ScriptedDialog {
            choice,
            shown: AtomicUsize::new(0),
        });
        let navigation = Arc::new(CountingNavigation::default());
        let flow = ReauthFlow::new(
            credentials.clone(),
            Arc::new(FixedExchange(credential)),
            dialog.clone(),
            navigation.clone(),
        );
        Fixture {
            flow,
            credentials,
            dialog,
            navigation,
        }
    }

    #[test]
    fn guard_is_single_slot() {
        let guard = ReauthGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_active());
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(!guard.is_active());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn confirm_stores_credential_and_resumes_once() {
        let f = fixture(
            Some(DialogChoice::Confirmed),
            Some(Credential::new("abc", "u1")),
        );
        let counter = AtomicUsize::new(0);
        let resumed = &counter;

        let out = f
            .flow
            .run(move || async move {
                resumed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallError>("payload")
            })
            .await
            .unwrap();

        assert_eq!(out, "payload");
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
        assert_eq!(f.credentials.current().unwrap().user_id, "u1");
        assert_eq!(f.flow.state(), ReauthState::Resumed);
        assert!(!f.flow.is_active());
    }

    #[tokio::test]
    async fn decline_resets_navigation_and_leaves_store_empty() {
        let f = fixture(Some(DialogChoice::Declined), None);

        let err = f
            .flow
            .run(|| async { Ok::<_, CallError>(()) })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), "user cancelled login");
        assert_eq!(f.navigation.0.load(Ordering::SeqCst), 1);
        assert!(!f.credentials.is_authenticated());
        assert_eq!(f.flow.state(), ReauthState::Cancelled);
        assert!(!f.flow.is_active());
    }

    #[tokio::test]
    async fn dialog_error_counts_as_cancel() {
        let f = fixture(None, None);

        let err = f
            .flow
            .run(|| async { Ok::<_, CallError>(()) })
            .await
            .unwrap_err();

        assert_eq!(err.message(), "user cancelled login");
        assert_eq!(f.navigation.0.load(Ordering::SeqCst), 1);
        assert!(!f.flow.is_active());
    }

    #[tokio::test]
    async fn exchange_failure_is_unauthorized() {
        let f = fixture(Some(DialogChoice::Confirmed), None);

        let err = f
            .flow
            .run(|| async { Ok::<_, CallError>(()) })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), "re-login failed");
        assert_eq!(f.navigation.0.load(Ordering::SeqCst), 0);
        assert_eq!(f.flow.state(), ReauthState::Failed);
        assert!(!f.flow.is_active());
    }

    #[tokio::test]
    async fn busy_guard_fails_fast_without_dialog() {
        let f = fixture(Some(DialogChoice::Confirmed), None);
        let _held = f.flow.guard.try_acquire().unwrap();

        let err = f
            .flow
            .run(|| async { Ok::<_, CallError>(()) })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnauthorizedInProgress);
        assert_eq!(f.dialog.shown.load(Ordering::SeqCst), 0);
        assert!(f.credentials.is_authenticated());
    }

    #[tokio::test]
    async fn cancelled_task_releases_guard() {
        struct PendingDialog;

        #[async_trait]
        impl ConfirmationDialog for PendingDialog {
            async fn confirm(&self, _prompt: &DialogPrompt) -> Result<DialogChoice, DialogError> {
                std::future::pending().await
            }
        }

        let credentials = Arc::new(CredentialStore::load(Arc::new(MemoryStorage::new())));
        let flow = ReauthFlow::new(
            credentials,
            Arc::new(FixedExchange(None)),
            Arc::new(PendingDialog),
            Arc::new(CountingNavigation::default()),
        );

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            flow.run(|| async { Ok::<_, CallError>(()) }),
        )
        .await;

        assert!(attempt.is_err());
        assert!(!flow.is_active());
    }
}
