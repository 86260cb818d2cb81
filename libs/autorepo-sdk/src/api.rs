//! `AutoRepoApi` trait definition.

use async_trait::async_trait;
use autorepo_gateway::CallError;

use crate::models::{Commit, Issue, IssuePatch, IssueStatus, Repo, RepoStats};

/// Resource operations of the `AutoRepo` backend.
///
/// Every method resolves through the call gateway, so a `401` on any of them
/// may open the re-login dialog before the method returns.
///
/// ```ignore
/// let api: Arc<dyn AutoRepoApi> = Arc::new(AutoRepoClient::new(gateway));
/// for repo in api.list_repos().await? {
///     println!("{}", repo.name);
/// }
/// ```
#[async_trait]
pub trait AutoRepoApi: Send + Sync {
    /// All vehicles of the current user.
    async fn list_repos(&self) -> Result<Vec<Repo>, CallError>;

    /// # Errors
    /// `RequestFailed` with the validation message if required fields are
    /// missing.
    async fn create_repo(&self, repo: &Repo) -> Result<Repo, CallError>;

    /// # Errors
    /// `NotFound` for an unknown id, `RequestFailed` for a malformed one.
    async fn get_repo(&self, id: &str) -> Result<Repo, CallError>;

    async fn delete_repo(&self, id: &str) -> Result<(), CallError>;

    async fn repo_stats(&self, id: &str) -> Result<RepoStats, CallError>;

    /// Maintenance records of one vehicle.
    async fn list_commits(&self, repo_id: &str) -> Result<Vec<Commit>, CallError>;

    /// Creating a record also moves the vehicle's mileage and head forward.
    async fn create_commit(&self, commit: &Commit) -> Result<Commit, CallError>;

    async fn get_commit(&self, id: &str) -> Result<Commit, CallError>;

    /// Reminders of one vehicle, optionally filtered by status.
    async fn list_issues(
        &self,
        repo_id: &str,
        status: Option<IssueStatus>,
    ) -> Result<Vec<Issue>, CallError>;

    async fn create_issue(&self, issue: &Issue) -> Result<Issue, CallError>;

    async fn update_issue(&self, id: &str, patch: &IssuePatch) -> Result<Issue, CallError>;

    async fn delete_issue(&self, id: &str) -> Result<(), CallError>;
}
