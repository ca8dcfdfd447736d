//! Reconciliation pass: converge preview labels, mirror refs, and
//! deployments with the state of recently updated pull requests.
//!
//! Each pass is split into a pure planner, which compares desired state
//! against the observed refs and yields the minimal set of mutations, and
//! a sequential executor. Pull requests are handled one at a time in
//! search order; any failure aborts the rest of the pass.

use crate::github::client::Project;
use crate::github::types::PullRequest;
use crate::remote::Remote;
use anyhow::Context;
use chrono::Utc;

/// The pull request label which indicates that a pull request is expected
/// to be actively mirrored by the preview server.
pub const LABEL: &str = "pull-request-has-preview";

pub fn refspec_labeled(number: u64) -> String {
    format!("prs-labeled-for-preview/{number}")
}

pub fn refspec_open(number: u64) -> String {
    format!("prs-open/{number}")
}

/// Revisions observed on the remote for one pull request, re-resolved at
/// the start of every pass.
pub struct RefState {
    /// Head of `pull/<n>/head`.
    pub latest: Option<String>,
    /// Current revision of the "labeled" mirror ref, if it exists.
    pub labeled: Option<String>,
    /// Current revision of the "open" tracking ref, if it exists.
    pub open: Option<String>,
}

/// One mutation against the forge or the preview remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddLabel,
    RemoveLabel,
    CreateRef { refspec: String, revision: String },
    UpdateRef { refspec: String, revision: String },
    DeleteRef { refspec: String },
    CreateDeployment { revision: String },
}

/// A pull request is mirrored while it is open and either comes from a
/// trusted collaborator or carries the preview label.
fn should_be_mirrored(pull_request: &PullRequest) -> bool {
    pull_request.is_open()
        && (pull_request.author_association == "COLLABORATOR" || pull_request.has_label(LABEL))
}

/// Compute the minimal set of mutations that converges one pull request.
/// Planning against already-converged state yields an empty list, so a
/// second pass with unchanged inputs performs zero mutating calls.
pub fn plan(pull_request: &PullRequest, refs: &RefState) -> Vec<Action> {
    let number = pull_request.number;
    let mut actions = Vec::new();

    if should_be_mirrored(pull_request) {
        tracing::info!(number, "pull request should be mirrored");

        let Some(latest) = refs.latest.as_deref() else {
            tracing::warn!(number, "head revision could not be resolved, skipping");
            return actions;
        };

        if !pull_request.has_label(LABEL) {
            actions.push(Action::AddLabel);
        }

        // A new deployment is triggered only when the labeled ref is
        // created or moved; the open ref is tracked independently.
        match refs.labeled.as_deref() {
            None => {
                actions.push(Action::CreateRef {
                    refspec: refspec_labeled(number),
                    revision: latest.to_string(),
                });
                actions.push(Action::CreateDeployment {
                    revision: latest.to_string(),
                });
            }
            Some(current) if current != latest => {
                actions.push(Action::UpdateRef {
                    refspec: refspec_labeled(number),
                    revision: latest.to_string(),
                });
                actions.push(Action::CreateDeployment {
                    revision: latest.to_string(),
                });
            }
            Some(_) => {}
        }

        match refs.open.as_deref() {
            None => actions.push(Action::CreateRef {
                refspec: refspec_open(number),
                revision: latest.to_string(),
            }),
            Some(current) if current != latest => actions.push(Action::UpdateRef {
                refspec: refspec_open(number),
                revision: latest.to_string(),
            }),
            Some(_) => {}
        }
    } else {
        tracing::info!(number, "pull request should not be mirrored");

        if pull_request.has_label(LABEL) {
            actions.push(Action::RemoveLabel);
        }

        if refs.labeled.is_some() {
            actions.push(Action::DeleteRef {
                refspec: refspec_labeled(number),
            });
        }

        // The open-tracking ref only comes down once the pull request has
        // actually closed; an open pull request that merely lost its
        // preview eligibility keeps it.
        if refs.open.is_some() && !pull_request.is_open() {
            actions.push(Action::DeleteRef {
                refspec: refspec_open(number),
            });
        }
    }

    actions
}

async fn execute(
    project: &Project,
    remote: &Remote,
    pull_request: &PullRequest,
    actions: &[Action],
) -> anyhow::Result<()> {
    for action in actions {
        match action {
            Action::AddLabel => project.add_label(pull_request.number, LABEL).await?,
            Action::RemoveLabel => project.remove_label(pull_request.number, LABEL).await?,
            Action::CreateRef { refspec, revision } => project.create_ref(refspec, revision).await?,
            Action::UpdateRef { refspec, revision } => project.update_ref(refspec, revision).await?,
            Action::DeleteRef { refspec } => remote.delete_ref(refspec).await?,
            Action::CreateDeployment { revision } => {
                project.create_deployment(pull_request.number, revision).await?
            }
        }
    }
    Ok(())
}

/// Inspect all pull requests modified within the trailing window. Add or
/// remove the preview label and update or delete the relevant git refs
/// according to the status of each pull request.
pub async fn synchronize(
    host: &str,
    github_project: &str,
    token: &str,
    remote_name: &str,
    window: u64,
) -> anyhow::Result<()> {
    let project = Project::new(host, github_project, token)?;
    let remote = Remote::new(remote_name);

    let window = i64::try_from(window).context("window does not fit in a signed duration")?;
    let updated_since = Utc::now() - chrono::Duration::seconds(window);
    let pull_requests = project.get_pull_requests(updated_since).await?;

    for pull_request in &pull_requests {
        let number = pull_request.number;
        tracing::info!(number, "processing pull request");

        let refs = RefState {
            latest: remote.get_revision(&format!("pull/{number}/head")).await?,
            labeled: remote.get_revision(&refspec_labeled(number)).await?,
            open: remote.get_revision(&refspec_open(number)).await?,
        };

        let actions = plan(pull_request, &refs);
        if actions.is_empty() {
            tracing::info!(number, "already converged");
        }
        execute(&project, &remote, pull_request, &actions).await?;
    }

    Ok(())
}
