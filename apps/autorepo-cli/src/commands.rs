//! Resource subcommands: thin wrappers over [`AutoRepoApi`] that print JSON.

use anyhow::Result;
use autorepo_sdk::{
    AutoRepoApi, Commit, Cost, Issue, IssuePatch, IssuePriority, IssueStatus, Repo, now_millis,
};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// List your vehicles
    List,
    /// Show one vehicle
    Show { id: String },
    /// Register a vehicle
    Create(CreateRepoArgs),
    /// Delete a vehicle
    Delete { id: String },
    /// Cost and record totals for a vehicle
    Stats { id: String },
}

#[derive(Args, Debug)]
pub struct CreateRepoArgs {
    pub name: String,
    #[arg(long)]
    pub brand: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub plate: Option<String>,
    /// Odometer reading in km
    #[arg(long, default_value_t = 0)]
    pub mileage: u64,
}

#[derive(Subcommand, Debug)]
pub enum CommitCommand {
    /// Maintenance records of a vehicle
    List { repo_id: String },
    /// Show one record
    Show { id: String },
    /// Add a maintenance record
    Create(CreateCommitArgs),
}

#[derive(Args, Debug)]
pub struct CreateCommitArgs {
    pub repo_id: String,
    pub title: String,
    /// Record type, e.g. maintenance, repair, fuel
    #[arg(long = "type", default_value = "maintenance")]
    pub kind: String,
    /// Odometer reading in km
    #[arg(long)]
    pub mileage: u64,
    #[arg(long)]
    pub message: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    pub parts: f64,
    #[arg(long, default_value_t = 0.0)]
    pub labor: f64,
    /// Issue ids resolved by this record
    #[arg(long = "closes")]
    pub closes_issues: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum IssueCommand {
    /// Reminders of a vehicle
    List {
        repo_id: String,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Add a reminder
    Create(CreateIssueArgs),
    /// Mark a reminder done
    Close { id: String },
    /// Open a closed reminder again
    Reopen { id: String },
    /// Delete a reminder
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct CreateIssueArgs {
    pub repo_id: String,
    pub title: String,
    #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
    pub priority: PriorityArg,
    #[arg(long)]
    pub description: Option<String>,
    /// Due at this odometer reading (km)
    #[arg(long)]
    pub due_mileage: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    Open,
    Closed,
}

impl From<StatusArg> for IssueStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Open => IssueStatus::Open,
            StatusArg::Closed => IssueStatus::Closed,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for IssuePriority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => IssuePriority::Low,
            PriorityArg::Medium => IssuePriority::Medium,
            PriorityArg::High => IssuePriority::High,
        }
    }
}

pub async fn run_repos(api: &dyn AutoRepoApi, command: RepoCommand) -> Result<()> {
    match command {
        RepoCommand::List => print_json(&api.list_repos().await?),
        RepoCommand::Show { id } => print_json(&api.get_repo(&id).await?),
        RepoCommand::Create(args) => print_json(&api.create_repo(&args.into_repo()).await?),
        RepoCommand::Delete { id } => {
            api.delete_repo(&id).await?;
            println!("deleted repo {id}");
            Ok(())
        }
        RepoCommand::Stats { id } => print_json(&api.repo_stats(&id).await?),
    }
}

pub async fn run_commits(api: &dyn AutoRepoApi, command: CommitCommand) -> Result<()> {
    match command {
        CommitCommand::List { repo_id } => print_json(&api.list_commits(&repo_id).await?),
        CommitCommand::Show { id } => print_json(&api.get_commit(&id).await?),
        CommitCommand::Create(args) => print_json(&api.create_commit(&args.into_commit()).await?),
    }
}

pub async fn run_issues(api: &dyn AutoRepoApi, command: IssueCommand) -> Result<()> {
    match command {
        IssueCommand::List { repo_id, status } => {
            print_json(&api.list_issues(&repo_id, status.map(Into::into)).await?)
        }
        IssueCommand::Create(args) => print_json(&api.create_issue(&args.into_issue()).await?),
        IssueCommand::Close { id } => {
            print_json(&api.update_issue(&id, &IssuePatch::close(now_millis())).await?)
        }
        IssueCommand::Reopen { id } => {
            print_json(&api.update_issue(&id, &IssuePatch::reopen()).await?)
        }
        IssueCommand::Delete { id } => {
            api.delete_issue(&id).await?;
            println!("deleted issue {id}");
            Ok(())
        }
    }
}

impl CreateRepoArgs {
    fn into_repo(self) -> Repo {
        Repo {
            brand: self.brand,
            model: self.model,
            license_plate: self.plate,
            initial_mileage: Some(self.mileage),
            current_mileage: self.mileage,
            ..Repo::new(self.name)
        }
    }
}

impl CreateCommitArgs {
    fn into_commit(self) -> Commit {
        let mut commit = Commit::new(self.repo_id, self.kind, self.title, self.mileage);
        commit.message = self.message;
        commit.closes_issues = self.closes_issues;
        if self.parts > 0.0 || self.labor > 0.0 {
            commit.cost = Some(Cost {
                parts: self.parts,
                labor: self.labor,
                ..Cost::default()
            });
        }
        commit
    }
}

impl CreateIssueArgs {
    fn into_issue(self) -> Issue {
        let mut issue = Issue::new(self.repo_id, self.title, self.priority.into());
        issue.description = self.description;
        issue.due_mileage = self.due_mileage;
        issue
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
