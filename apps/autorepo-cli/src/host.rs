//! Terminal implementations of the host collaborators the gateway needs.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use autorepo_gateway::{
    CodeIssuer, ConfirmationDialog, DialogChoice, DialogError, DialogPrompt, LoginError,
    NavigationReset,
};
use parking_lot::Mutex;

/// Asks on stderr and reads the answer from stdin.
pub struct TerminalDialog {
    assume_yes: bool,
}

impl TerminalDialog {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl ConfirmationDialog for TerminalDialog {
    async fn confirm(&self, prompt: &DialogPrompt) -> Result<DialogChoice, DialogError> {
        if self.assume_yes {
            tracing::info!(title = %prompt.title, "re-login confirmed by --yes");
            return Ok(DialogChoice::Confirmed);
        }

        let question = format!(
            "{}\n{} [{}: y / {}: N] ",
            prompt.title, prompt.body, prompt.confirm_label, prompt.cancel_label
        );
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(question.as_bytes())?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| DialogError::new(e.to_string()))?
        .map_err(|e| DialogError::new(e.to_string()))?;

        Ok(parse_answer(&answer))
    }
}

/// Anything but an explicit yes declines.
pub fn parse_answer(answer: &str) -> DialogChoice {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => DialogChoice::Confirmed,
        _ => DialogChoice::Declined,
    }
}

/// Hands out the login code given on the command line, once.
///
/// Codes are single-use on the backend, so a second request fails instead of
/// replaying a spent code.
pub struct OneShotCodeIssuer {
    code: Mutex<Option<String>>,
}

impl OneShotCodeIssuer {
    pub fn new(code: Option<String>) -> Self {
        Self {
            code: Mutex::new(code.filter(|c| !c.trim().is_empty())),
        }
    }
}

#[async_trait]
impl CodeIssuer for OneShotCodeIssuer {
    async fn issue_code(&self) -> Result<String, LoginError> {
        self.code.lock().take().ok_or_else(|| {
            LoginError::CodeUnavailable(
                "pass --code or set AUTOREPO_LOGIN_CODE with a fresh login code".to_owned(),
            )
        })
    }
}

/// The terminal has no view stack; returning to the landing view means
/// telling the user how to start over.
pub struct LandingHint;

impl NavigationReset for LandingHint {
    fn reset_to_landing(&self) {
        tracing::info!("session ended, back to landing");
        eprintln!("Not logged in. Run `autorepo login --code <CODE>` to start a new session.");
    }
}

/// `<config dir>/autorepo/credentials.json`
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("autorepo").join("credentials.json"))
}
