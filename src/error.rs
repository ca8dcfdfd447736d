//! Fatal error taxonomy.
//!
//! None of these are retried locally. The tool is invoked by a periodic
//! scheduler, so a failed run is retried wholesale on the next tick, and a
//! pass that fails mid-way performs no further mutations.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The remaining quota ratio fell below the guard threshold.
    #[error("refusing to deplete the \"{resource}\" API quota ({remaining}/{limit} remaining)")]
    QuotaGuardTripped {
        resource: &'static str,
        remaining: u64,
        limit: u64,
    },

    /// Any non-2xx response from the GitHub API.
    #[error("GitHub API {method} {url} failed ({status}): {body}")]
    ForgeRequestFailed {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },

    /// GitHub reported a truncated search result set. A partial
    /// reconciliation could corrupt convergence, so the pass aborts before
    /// attempting any mutation.
    #[error("pull request search returned incomplete results")]
    IncompleteSearchResults,

    /// The polling budget ran out before the preview came online.
    #[error("deployment did not become available after {seconds} seconds")]
    DeploymentTimeout { seconds: u64 },
}
