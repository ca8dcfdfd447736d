//! GitHub API response types, deserialized from REST JSON.

use serde::Deserialize;
use std::collections::HashMap;

/// A pull request as returned by the issue search endpoint. Read-only;
/// nothing is persisted locally between reconciliation passes.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    /// `None` while the pull request is open.
    pub closed_at: Option<String>,
    /// "COLLABORATOR", "MEMBER", "NONE", etc.
    pub author_association: String,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

/// The triggering deployment, read from the workflow event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub id: u64,
    /// The pull request number, stringly typed on the wire. Identifying the
    /// deployment by PR number makes GitHub designate prior deployments for
    /// the same pull request as inactive when a new one is created.
    pub environment: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchResults {
    pub incomplete_results: bool,
    pub items: Vec<PullRequest>,
}

/// Fresh rate-limit snapshot, fetched before each guarded call and never
/// cached across calls.
#[derive(Debug, Deserialize)]
pub struct RateLimitSnapshot {
    pub resources: HashMap<String, ResourceLimit>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResourceLimit {
    pub remaining: u64,
    pub limit: u64,
}
