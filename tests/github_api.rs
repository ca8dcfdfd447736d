//! HTTP-level tests for the quota-guarded GitHub client.
//!
//! Each test stands up a wiremock server acting as the GitHub API and
//! asserts both the request shapes and the guard behavior, including that
//! a tripped guard never issues the underlying request.

use preview_sync::error::SyncError;
use preview_sync::github::client::Project;
use preview_sync::github::types::Deployment;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rate_limit_body(remaining: u64, limit: u64) -> serde_json::Value {
    json!({
        "resources": {
            "core": { "remaining": remaining, "limit": limit },
            "search": { "remaining": remaining, "limit": limit }
        }
    })
}

async fn mount_rate_limit(server: &MockServer, remaining: u64, limit: u64) {
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rate_limit_body(remaining, limit)))
        .mount(server)
        .await;
}

fn project(server: &MockServer) -> Project {
    Project::new(&server.uri(), "org/repo", "secret").unwrap()
}

#[tokio::test]
async fn tripped_guard_never_issues_the_underlying_request() {
    let server = MockServer::start().await;
    // 10/100 remaining: ratio 0.10 is below the 0.2 threshold.
    mount_rate_limit(&server, 10, 100).await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/issues/5/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = project(&server)
        .add_label(5, "pull-request-has-preview")
        .await
        .unwrap_err();

    match err.downcast_ref::<SyncError>() {
        Some(SyncError::QuotaGuardTripped {
            resource: "core",
            remaining: 10,
            limit: 100,
        }) => {}
        other => panic!("expected QuotaGuardTripped, got {other:?}"),
    }
}

#[tokio::test]
async fn healthy_quota_lets_the_call_proceed() {
    let server = MockServer::start().await;
    // 30/100 remaining: ratio 0.30 is at or above the threshold.
    mount_rate_limit(&server, 30, 100).await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/issues/5/labels"))
        .and(body_json(json!({ "labels": ["pull-request-has-preview"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    project(&server)
        .add_label(5, "pull-request-has-preview")
        .await
        .unwrap();
}

#[tokio::test]
async fn non_success_response_is_fatal() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/git/refs"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Reference already exists" })),
        )
        .mount(&server)
        .await;

    let err = project(&server)
        .create_ref("prs-open/5", "f00dface")
        .await
        .unwrap_err();

    match err.downcast_ref::<SyncError>() {
        Some(SyncError::ForgeRequestFailed { status, .. }) => {
            assert_eq!(*status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        }
        other => panic!("expected ForgeRequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn incomplete_search_results_abort_the_pass() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "incomplete_results": true,
            "items": []
        })))
        .mount(&server)
        .await;

    let err = project(&server)
        .get_pull_requests(chrono::Utc::now())
        .await
        .unwrap_err();

    match err.downcast_ref::<SyncError>() {
        Some(SyncError::IncompleteSearchResults) => {}
        other => panic!("expected IncompleteSearchResults, got {other:?}"),
    }
}

#[tokio::test]
async fn search_parses_pull_requests() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "incomplete_results": false,
            "items": [
                {
                    "number": 12,
                    "closed_at": null,
                    "author_association": "COLLABORATOR",
                    "labels": [{ "name": "pull-request-has-preview" }]
                },
                {
                    "number": 13,
                    "closed_at": "2024-03-01T12:00:00Z",
                    "author_association": "NONE",
                    "labels": []
                }
            ]
        })))
        .mount(&server)
        .await;

    let pull_requests = project(&server)
        .get_pull_requests(chrono::Utc::now())
        .await
        .unwrap();

    assert_eq!(pull_requests.len(), 2);
    assert!(pull_requests[0].is_open());
    assert!(pull_requests[0].has_label("pull-request-has-preview"));
    assert!(!pull_requests[1].is_open());
}

#[tokio::test]
async fn remove_label_deletes_the_named_label() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("DELETE"))
        .and(path("/repos/org/repo/issues/5/labels/pull-request-has-preview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    project(&server)
        .remove_label(5, "pull-request-has-preview")
        .await
        .unwrap();
}

#[tokio::test]
async fn create_ref_posts_a_fully_qualified_ref() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/git/refs"))
        .and(body_json(json!({
            "ref": "refs/prs-labeled-for-preview/5",
            "sha": "f00dface"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    project(&server)
        .create_ref("prs-labeled-for-preview/5", "f00dface")
        .await
        .unwrap();
}

#[tokio::test]
async fn update_ref_patches_the_revision() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("PATCH"))
        .and(path("/repos/org/repo/git/refs/prs-open/5"))
        .and(body_json(json!({ "sha": "f00dface" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    project(&server)
        .update_ref("prs-open/5", "f00dface")
        .await
        .unwrap();
}

#[tokio::test]
async fn deployment_environment_is_the_pull_request_number() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/deployments"))
        .and(body_json(json!({
            "ref": "f00dface",
            "environment": "5",
            "required_contexts": []
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    project(&server).create_deployment(5, "f00dface").await.unwrap();
}

#[tokio::test]
async fn deployment_status_carries_state_and_environment_url() {
    let server = MockServer::start().await;
    mount_rate_limit(&server, 100, 100).await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/deployments/42/statuses"))
        .and(body_json(json!({
            "state": "error",
            "description": "deployment did not become available after 30 seconds",
            "environment_url": "https://preview.example/submissions/5/"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let deployment = Deployment {
        id: 42,
        environment: "5".to_string(),
        sha: "f00dface".to_string(),
    };

    project(&server)
        .update_deployment(
            &deployment,
            "error",
            "deployment did not become available after 30 seconds",
            "https://preview.example/submissions/5/",
        )
        .await
        .unwrap();
}
