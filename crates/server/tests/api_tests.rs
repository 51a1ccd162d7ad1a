use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use breachsim_core::{GroundTruth, Scenario};
use breachsim_episode::{Episode, EpisodeConfig};
use breachsim_server::{AppState, router};

// -- Helpers --------------------------------------------------------------

fn sample_scenario() -> Scenario {
    serde_json::from_value(json!({
        "scenario_id": "seed-001",
        "entities": {
            "hosts": [{"host_id": "h-001"}, {"host_id": "h-002"}],
            "users": [{"user_id": "u-001"}],
            "domains": [{"domain": "evil-mail.com", "domain_type": "attacker"}],
            "data_targets": [{"target_id": "t-001"}]
        },
        "patient_zero_host": "h-001",
        "compromised_user": "u-001",
        "attacker_domain": "evil-mail.com",
        "data_target": "t-001",
        "attack_plan": {
            "timeline": [
                {"step": 0, "artifacts": [
                    {"artifact_type": "email", "artifact_id": "email-001"}
                ]}
            ]
        },
        "seed_artifacts": {
            "emails": [{
                "email_id": "email-001",
                "sender": "billing@evil-mail.com",
                "recipient": "u-001@corp.example",
                "subject": "Overdue invoice",
                "body": "open the attachment",
                "trust_tier": "untrusted"
            }],
            "log_templates": []
        }
    }))
    .unwrap()
}

fn ground_truth() -> GroundTruth {
    serde_json::from_value(json!({
        "attribution": {
            "patient_zero_host": "h-001",
            "compromised_user": "u-001",
            "attacker_domain": "evil-mail.com",
            "data_target": "t-001",
            "initial_vector": "phish"
        },
        "containment_requirements": {
            "isolate_hosts": ["h-001"],
            "block_domains": ["evil-mail.com"],
            "reset_users": ["u-001"]
        }
    }))
    .unwrap()
}

fn test_router() -> axum::Router {
    let episode = Episode::new(EpisodeConfig::default(), sample_scenario(), Some(ground_truth()))
        .expect("episode should build");
    router(AppState::new(episode))
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("request should succeed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be json")
    };
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

// -- Tests ----------------------------------------------------------------

#[tokio::test]
async fn health_is_public() {
    let app = test_router();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn reset_returns_the_first_observation() {
    let app = test_router();
    let (status, body) = send(&app, post_json("/reset", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reward"], 0.0);
    assert_eq!(body["done"], false);
    assert_eq!(body["observation"]["scenario_id"], "seed-001");
    assert_eq!(body["observation"]["step_index"], 0);
    assert_eq!(body["observation"]["new_emails"], json!(["email-001"]));
    assert_eq!(body["observation"]["attacker_state"], "phish_sent");
}

#[tokio::test]
async fn step_applies_defender_actions() {
    let app = test_router();
    send(&app, post_json("/reset", json!({}))).await;

    let (status, body) = send(
        &app,
        post_json("/step", json!({"action_type": "query_logs", "params": {"sql": "SELECT 1"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["observation"]["step_index"], 1);
    assert_eq!(body["observation"]["last_action_result"]["ok"], true);

    let (_, body) = send(
        &app,
        post_json(
            "/step",
            json!({"action_type": "isolate_host", "params": {"host_id": "h-001"}}),
        ),
    )
    .await;
    assert_eq!(
        body["observation"]["containment"]["isolated_hosts"],
        json!(["h-001"])
    );
}

#[tokio::test]
async fn non_select_sql_is_rejected_in_band() {
    let app = test_router();
    send(&app, post_json("/reset", json!({}))).await;

    let (status, body) = send(
        &app,
        post_json(
            "/step",
            json!({"action_type": "query_logs", "params": {"sql": "DROP TABLE alerts"}}),
        ),
    )
    .await;
    // The HTTP call succeeds; the rejection rides in the action result.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["observation"]["last_action_result"]["ok"], false);
}

#[tokio::test]
async fn submit_report_scores_and_finishes() {
    let app = test_router();
    send(&app, post_json("/reset", json!({}))).await;

    let report = json!({
        "patient_zero_host": "h-001",
        "compromised_user": "u-001",
        "attacker_domain": "evil-mail.com",
        "data_target": "t-001",
        "initial_vector": "phish"
    });
    let (status, body) = send(
        &app,
        post_json(
            "/step",
            json!({"action_type": "submit_report", "params": {"summary_json": report}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["done"], true);
    // Attribution only; nothing was contained and no steps preceded.
    assert_eq!(body["reward"], 5.0);
    assert!(body["info"]["score_details"].is_object());
}

#[tokio::test]
async fn state_reports_episode_progress() {
    let app = test_router();
    send(&app, post_json("/reset", json!({}))).await;
    send(
        &app,
        post_json("/step", json!({"action_type": "query_logs", "params": {"sql": "SELECT 1"}})),
    )
    .await;

    let (status, body) = send(&app, get("/state")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scenario_id"], "seed-001");
    assert_eq!(body["step_count"], 1);
    assert_eq!(body["max_steps"], 15);
    assert_eq!(body["terminated"], false);
    assert_eq!(body["truncated"], false);
}
