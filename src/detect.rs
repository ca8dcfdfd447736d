//! Deployment polling: wait for a preview build to come online and report
//! the outcome to GitHub as a deployment status.

use crate::error::SyncError;
use crate::github::client::Project;
use crate::github::types::Deployment;
use anyhow::Context;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Seconds to wait between attempts to verify that a deployment has
/// occurred.
const POLLING_PERIOD: Duration = Duration::from_secs(5);

/// Read the triggering deployment from the workflow event payload.
fn read_event_deployment(path: &str) -> anyhow::Result<Deployment> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event payload at {path}"))?;
    let event: serde_json::Value = serde_json::from_str(&raw)?;

    tracing::info!(event = %event, "event payload");

    let deployment = event
        .get("deployment")
        .context("event payload has no deployment")?;
    Ok(serde_json::from_value(deployment.clone())?)
}

/// Check whether the preview host is serving the deployed revision. Any
/// transport failure or non-success status counts as "not deployed yet".
async fn is_deployed(client: &reqwest::Client, target: &str, deployment: &Deployment) -> bool {
    let url = format!(
        "{}/.git/worktrees/{}/HEAD",
        target.trim_end_matches('/'),
        deployment.environment
    );

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(text) => text.trim() == deployment.sha,
            Err(_) => false,
        },
        _ => false,
    }
}

/// Run `probe` at a fixed period until it reports success or the timeout
/// budget is exhausted. Gives up early when another full period would not
/// fit before the deadline, so no probe runs past the budget.
pub async fn poll_until_deployed<F, Fut>(
    mut probe: F,
    period: Duration,
    timeout: Duration,
) -> Result<(), SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if probe().await {
            return Ok(());
        }
        if Instant::now() + period > deadline {
            return Err(SyncError::DeploymentTimeout {
                seconds: timeout.as_secs(),
            });
        }
        sleep(period).await;
    }
}

/// Manage the status of a GitHub deployment by polling the pull request
/// preview website until the deployment is complete or the timeout is
/// reached.
pub async fn detect(
    host: &str,
    github_project: &str,
    token: &str,
    target: &str,
    timeout: u64,
) -> anyhow::Result<()> {
    let project = Project::new(host, github_project, token)?;

    let event_path =
        std::env::var("GITHUB_EVENT_PATH").context("GITHUB_EVENT_PATH is not set")?;
    let deployment = read_event_deployment(&event_path)?;

    let environment_url = format!(
        "{}/submissions/{}/",
        target.trim_end_matches('/'),
        deployment.environment
    );

    project
        .update_deployment(&deployment, "in_progress", "", &environment_url)
        .await?;

    tracing::info!(
        timeout,
        environment = %deployment.environment,
        target,
        "waiting for pull request to be deployed"
    );

    let client = reqwest::Client::new();
    let client = &client;
    let deployment_ref = &deployment;

    let outcome = poll_until_deployed(
        move || is_deployed(client, target, deployment_ref),
        POLLING_PERIOD,
        Duration::from_secs(timeout),
    )
    .await;

    match outcome {
        Ok(()) => {
            project
                .update_deployment(&deployment, "success", "", &environment_url)
                .await?;
            Ok(())
        }
        Err(err) => {
            project
                .update_deployment(&deployment, "error", &err.to_string(), &environment_url)
                .await?;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn sleeps_three_times_when_fourth_probe_succeeds() {
        let attempts = Cell::new(0u32);
        let attempts_ref = &attempts;
        let started = Instant::now();

        let outcome = poll_until_deployed(
            move || async move {
                attempts_ref.set(attempts_ref.get() + 1);
                attempts_ref.get() >= 4
            },
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
        .await;

        assert!(outcome.is_ok());
        assert_eq!(attempts.get(), 4);
        // Three sleeps of the polling period elapsed before success.
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_at_most_three_probes() {
        let attempts = Cell::new(0u32);
        let attempts_ref = &attempts;

        let outcome = poll_until_deployed(
            move || async move {
                attempts_ref.set(attempts_ref.get() + 1);
                false
            },
            Duration::from_secs(5),
            Duration::from_secs(12),
        )
        .await;

        match outcome {
            Err(SyncError::DeploymentTimeout { seconds: 12 }) => {}
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_never_sleeps() {
        let started = Instant::now();

        let outcome = poll_until_deployed(
            || async { true },
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
        .await;

        assert!(outcome.is_ok());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
