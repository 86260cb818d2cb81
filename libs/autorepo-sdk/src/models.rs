//! Wire models of the `AutoRepo` backend.
//!
//! Identifiers travel as `_id`. Timestamps are milliseconds since the Unix
//! epoch, as floating point numbers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_currency() -> String {
    "CNY".to_owned()
}

/// Milliseconds since the Unix epoch, now.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

/// Cost split of a maintenance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    #[serde(default)]
    pub parts: f64,
    #[serde(default)]
    pub labor: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for Cost {
    fn default() -> Self {
        Self {
            parts: 0.0,
            labor: 0.0,
            currency: default_currency(),
        }
    }
}

impl Cost {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.parts + self.labor
    }
}

/// A vehicle profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_mileage: Option<u64>,
    #[serde(default)]
    pub current_mileage: u64,
    /// Title of the latest maintenance record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_expiry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compulsory_insurance_expiry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_insurance_expiry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_openid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
}

impl Repo {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A maintenance or expense record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub repo_id: String,
    /// Record category (`maintenance`, `repair`, `fuel`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub mileage: u64,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,
    /// Reminder items this record resolves
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub closes_issues: Vec<String>,
}

impl Commit {
    /// New record stamped with the current time.
    #[must_use]
    pub fn new(
        repo_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        mileage: u64,
    ) -> Self {
        Self {
            id: None,
            repo_id: repo_id.into(),
            kind: kind.into(),
            title: title.into(),
            message: None,
            mileage,
            timestamp: now_millis(),
            cost: None,
            closes_issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.cost.as_ref().map_or(0.0, Cost::total)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    #[default]
    Open,
    Closed,
}

impl IssueStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuePriority {
    Low,
    #[default]
    Medium,
    High,
}

impl IssuePriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for IssuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reminder item, triggered by a date or a mileage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub repo_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: IssueStatus,
    #[serde(default)]
    pub priority: IssuePriority,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_mileage: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by_commit_id: Option<String>,
}

impl Issue {
    /// New open reminder stamped with the current time.
    #[must_use]
    pub fn new(
        repo_id: impl Into<String>,
        title: impl Into<String>,
        priority: IssuePriority,
    ) -> Self {
        Self {
            id: None,
            repo_id: repo_id.into(),
            title: title.into(),
            description: None,
            status: IssueStatus::Open,
            priority,
            labels: Vec::new(),
            due_date: None,
            due_mileage: None,
            created_at: Some(now_millis()),
            closed_at: None,
            closed_by_commit_id: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }
}

/// Partial update of an [`Issue`]. Absent fields are left unchanged.
///
/// `closed_at: Some(None)` serializes as `null` and clears the timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<IssuePriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_mileage: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_by_commit_id: Option<String>,
}

impl IssuePatch {
    /// Mark closed at `closed_at` (epoch milliseconds).
    #[must_use]
    pub fn close(closed_at: f64) -> Self {
        Self {
            status: Some(IssueStatus::Closed),
            closed_at: Some(Some(closed_at)),
            ..Self::default()
        }
    }

    /// Mark open again and clear the close timestamp.
    #[must_use]
    pub fn reopen() -> Self {
        Self {
            status: Some(IssueStatus::Open),
            closed_at: Some(None),
            ..Self::default()
        }
    }
}

/// Aggregates for one vehicle.
///
/// Fields the client does not know about are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoStats {
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub parts_cost: f64,
    #[serde(default)]
    pub labor_cost: f64,
    #[serde(default)]
    pub commit_count: u64,
    #[serde(default)]
    pub open_issues: u64,
    /// Total cost per record category
    #[serde(default)]
    pub cost_by_type: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RepoStats {
    /// Share of `total_cost` spent on one category, in percent.
    ///
    /// Returns `0.0` when nothing was spent.
    #[must_use]
    pub fn share_percent(&self, kind: &str) -> f64 {
        if self.total_cost <= 0.0 {
            return 0.0;
        }
        self.cost_by_type.get(kind).copied().unwrap_or(0.0) / self.total_cost * 100.0
    }
}
