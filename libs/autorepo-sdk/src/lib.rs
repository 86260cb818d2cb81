#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `AutoRepo` SDK
//!
//! Typed access to vehicles ("repos"), maintenance records ("commits") and
//! reminders ("issues") over the [`autorepo_gateway`] call gateway.
//!
//! ## Usage
//!
//! ```ignore
//! use autorepo_sdk::{AutoRepoApi, AutoRepoClient, IssueStatus};
//!
//! let client = AutoRepoClient::new(gateway);
//! let open = client.list_issues(&repo_id, Some(IssueStatus::Open)).await?;
//! ```

pub mod api;
pub mod client;
pub mod models;

pub use api::AutoRepoApi;
pub use client::AutoRepoClient;
pub use models::{
    Commit, Cost, Issue, IssuePatch, IssuePriority, IssueStatus, Repo, RepoStats, now_millis,
};

pub use autorepo_gateway::{CallError, ErrorKind};
