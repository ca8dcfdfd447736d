//! Quota-guarded `reqwest` client for the GitHub REST API.
//!
//! Every public operation first fetches a fresh rate-limit snapshot and
//! refuses to proceed when the remaining quota for the relevant resource
//! category is below a fixed threshold. The guard is an explicit check at
//! the top of each call path rather than ambient middleware, and the
//! snapshot is never cached.
//!
//! Any non-success response is fatal. There is no retry and no backoff;
//! the invoking scheduler retries the entire run later.

use super::types::{Deployment, PullRequest, RateLimitSnapshot, SearchResults};
use crate::error::SyncError;
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method};
use std::time::Duration;

/// The ratio of "requests remaining" to "total request quota" below which
/// the guard refuses to interact with the API.
const RATE_LIMIT_THRESHOLD: f64 = 0.2;

/// True when the remaining quota has fallen below the guard threshold.
/// A reported limit of zero means rate limiting is disabled on the host.
fn below_threshold(remaining: u64, limit: u64) -> bool {
    limit > 0 && (remaining as f64) / (limit as f64) < RATE_LIMIT_THRESHOLD
}

/// Handle to one GitHub project. Host, project slug, and token are passed
/// in explicitly; the client holds no ambient global state.
pub struct Project {
    client: Client,
    host: String,
    github_project: String,
    token: String,
}

impl Project {
    pub fn new(host: &str, github_project: &str, token: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("preview-sync/0.1 (reqwest)")
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            github_project: github_project.to_string(),
            token: token.to_string(),
        })
    }

    /// Issue one authenticated request, returning the response body.
    /// Non-success statuses map to `SyncError::ForgeRequestFailed`.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> anyhow::Result<String> {
        tracing::info!(%method, url, "issuing request");

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .header(
                header::ACCEPT,
                "application/vnd.github.machine-man-preview+json",
            );
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(SyncError::ForgeRequestFailed {
                method: method.to_string(),
                url: url.to_string(),
                status,
                body: text,
            }
            .into());
        }

        Ok(text)
    }

    /// Verify that the subsequent request will not deplete the allowance
    /// for `resource`. The rate-limit endpoint itself does not count
    /// against the quota:
    ///
    /// > Accessing this endpoint does not count against your REST API
    /// > rate limit.
    ///
    /// https://developer.github.com/v3/rate_limit/
    async fn guard(&self, resource: &'static str) -> anyhow::Result<()> {
        let url = format!("{}/rate_limit", self.host);
        let text = self.send(Method::GET, &url, None).await?;
        let snapshot: RateLimitSnapshot = serde_json::from_str(&text)?;

        let values = snapshot
            .resources
            .get(resource)
            .copied()
            .with_context(|| format!("rate limit response missing \"{resource}\" resource"))?;

        tracing::info!(
            resource,
            remaining = values.remaining,
            limit = values.limit,
            "API quota"
        );

        if below_threshold(values.remaining, values.limit) {
            return Err(SyncError::QuotaGuardTripped {
                resource,
                remaining: values.remaining,
                limit: values.limit,
            }
            .into());
        }

        Ok(())
    }

    /// Search for pull requests updated since the given instant. Aborts on
    /// a truncated result set, before any mutation is attempted.
    pub async fn get_pull_requests(
        &self,
        updated_since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PullRequest>> {
        self.guard("search").await?;

        let window_start = updated_since.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let url = format!(
            "{}/search/issues?q=repo:{}+is:pr+updated:>{}",
            self.host, self.github_project, window_start
        );

        tracing::info!(%window_start, "searching for pull requests");

        let results: SearchResults = serde_json::from_str(&self.send(Method::GET, &url, None).await?)?;

        if results.incomplete_results {
            return Err(SyncError::IncompleteSearchResults.into());
        }

        tracing::info!(count = results.items.len(), "found pull requests");

        Ok(results.items)
    }

    pub async fn add_label(&self, number: u64, name: &str) -> anyhow::Result<()> {
        self.guard("core").await?;

        let url = format!(
            "{}/repos/{}/issues/{}/labels",
            self.host, self.github_project, number
        );

        tracing::info!(name, number, "adding label");

        self.send(Method::POST, &url, Some(&serde_json::json!({ "labels": [name] })))
            .await?;
        Ok(())
    }

    pub async fn remove_label(&self, number: u64, name: &str) -> anyhow::Result<()> {
        self.guard("core").await?;

        let encoded = urlencoding::encode(name);
        let url = format!(
            "{}/repos/{}/issues/{}/labels/{}",
            self.host, self.github_project, number, encoded
        );

        tracing::info!(name, number, "removing label");

        self.send(Method::DELETE, &url, None).await?;
        Ok(())
    }

    pub async fn create_ref(&self, refspec: &str, revision: &str) -> anyhow::Result<()> {
        self.guard("core").await?;

        let url = format!("{}/repos/{}/git/refs", self.host, self.github_project);

        tracing::info!(refspec, revision, "creating ref");

        self.send(
            Method::POST,
            &url,
            Some(&serde_json::json!({
                "ref": format!("refs/{refspec}"),
                "sha": revision,
            })),
        )
        .await?;
        Ok(())
    }

    pub async fn update_ref(&self, refspec: &str, revision: &str) -> anyhow::Result<()> {
        self.guard("core").await?;

        let url = format!(
            "{}/repos/{}/git/refs/{}",
            self.host, self.github_project, refspec
        );

        tracing::info!(refspec, revision, "updating ref");

        self.send(Method::PATCH, &url, Some(&serde_json::json!({ "sha": revision })))
            .await?;
        Ok(())
    }

    /// Create a deployment for a pull request's head revision. The
    /// environment is the PR number so GitHub automatically marks prior
    /// deployments for the same pull request as inactive. Previews are
    /// built regardless of commit status checks, so none are required.
    pub async fn create_deployment(&self, number: u64, revision: &str) -> anyhow::Result<()> {
        self.guard("core").await?;

        let url = format!("{}/repos/{}/deployments", self.host, self.github_project);

        tracing::info!(number, revision, "creating deployment");

        self.send(
            Method::POST,
            &url,
            Some(&serde_json::json!({
                "ref": revision,
                "environment": number.to_string(),
                "required_contexts": [],
            })),
        )
        .await?;
        Ok(())
    }

    /// Post a deployment status. Status transitions for a given deployment
    /// run are monotonic: once `success` or `error` is reported, no further
    /// status is posted for that run.
    pub async fn update_deployment(
        &self,
        deployment: &Deployment,
        state: &str,
        description: &str,
        environment_url: &str,
    ) -> anyhow::Result<()> {
        self.guard("core").await?;

        let url = format!(
            "{}/repos/{}/deployments/{}/statuses",
            self.host, self.github_project, deployment.id
        );

        tracing::info!(id = deployment.id, state, "updating deployment status");

        self.send(
            Method::POST,
            &url,
            Some(&serde_json::json!({
                "state": state,
                "description": description,
                "environment_url": environment_url,
            })),
        )
        .await?;
        Ok(())
    }
}
