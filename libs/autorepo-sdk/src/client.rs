use std::sync::Arc;

use async_trait::async_trait;
use autorepo_gateway::{CallError, CallGateway};
use serde_json::Value;

use crate::api::AutoRepoApi;
use crate::models::{Commit, Issue, IssuePatch, IssueStatus, Repo, RepoStats};

/// [`AutoRepoApi`] over a shared [`CallGateway`].
#[derive(Clone)]
pub struct AutoRepoClient {
    gateway: Arc<CallGateway>,
}

impl AutoRepoClient {
    #[must_use]
    pub fn new(gateway: Arc<CallGateway>) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<CallGateway> {
        &self.gateway
    }
}

/// `/{collection}/{id}` with the id percent-encoded.
fn item_path(collection: &str, id: &str) -> String {
    format!("/{collection}/{}", urlencoding::encode(id))
}

fn query_path(path: &str, pairs: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{path}?{query}")
}

#[async_trait]
impl AutoRepoApi for AutoRepoClient {
    async fn list_repos(&self) -> Result<Vec<Repo>, CallError> {
        self.gateway.get("/repos").await
    }

    async fn create_repo(&self, repo: &Repo) -> Result<Repo, CallError> {
        let created: Repo = self.gateway.post("/repos", repo).await?;
        tracing::info!(repo_id = created.id.as_deref(), name = %created.name, "repo created");
        Ok(created)
    }

    async fn get_repo(&self, id: &str) -> Result<Repo, CallError> {
        self.gateway.get(&item_path("repos", id)).await
    }

    async fn delete_repo(&self, id: &str) -> Result<(), CallError> {
        let _: Value = self.gateway.delete(&item_path("repos", id)).await?;
        tracing::info!(repo_id = id, "repo deleted");
        Ok(())
    }

    async fn repo_stats(&self, id: &str) -> Result<RepoStats, CallError> {
        self.gateway
            .get(&format!("{}/stats", item_path("repos", id)))
            .await
    }

    async fn list_commits(&self, repo_id: &str) -> Result<Vec<Commit>, CallError> {
        self.gateway
            .get(&query_path("/commits", &[("repo_id", repo_id)]))
            .await
    }

    async fn create_commit(&self, commit: &Commit) -> Result<Commit, CallError> {
        let created: Commit = self.gateway.post("/commits", commit).await?;
        tracing::info!(
            commit_id = created.id.as_deref(),
            repo_id = %created.repo_id,
            "commit created"
        );
        Ok(created)
    }

    async fn get_commit(&self, id: &str) -> Result<Commit, CallError> {
        self.gateway.get(&item_path("commits", id)).await
    }

    async fn list_issues(
        &self,
        repo_id: &str,
        status: Option<IssueStatus>,
    ) -> Result<Vec<Issue>, CallError> {
        let mut pairs = vec![("repo_id", repo_id)];
        if let Some(status) = status {
            pairs.push(("status", status.as_str()));
        }
        self.gateway.get(&query_path("/issues", &pairs)).await
    }

    async fn create_issue(&self, issue: &Issue) -> Result<Issue, CallError> {
        self.gateway.post("/issues", issue).await
    }

    async fn update_issue(&self, id: &str, patch: &IssuePatch) -> Result<Issue, CallError> {
        self.gateway.patch(&item_path("issues", id), patch).await
    }

    async fn delete_issue(&self, id: &str) -> Result<(), CallError> {
        let _: Value = self.gateway.delete(&item_path("issues", id)).await?;
        Ok(())
    }
}
