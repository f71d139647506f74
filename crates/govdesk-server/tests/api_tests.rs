use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

use govdesk_core::{
    capabilities, Account, ApprovalMatrixConfig, NotificationKind, RequestId, SystemClock,
    WorkflowConfig, WorkflowEngine,
};
use govdesk_server::{build_router, in_memory_engine, GovDeskServer, ServerConfig};
use govdesk_state_inmemory::InMemoryStateStoreProvider;

struct TestContext {
    router: Router,
    provider: InMemoryStateStoreProvider,
    engine: Arc<WorkflowEngine>,
}

async fn setup_test() -> TestContext {
    let mut unit_approvers = BTreeMap::new();
    unit_approvers.insert("ICT".to_string(), "ict.head@agency.gov.my".to_string());

    let config = ServerConfig {
        available_assets: vec!["LAPTOP-017".to_string()],
        workflow: WorkflowConfig {
            approval_matrix: ApprovalMatrixConfig {
                auto_approve_max_value: Decimal::from(1500),
                auto_approve_grade_below: Some(41),
                portal_review_min_value: None,
                unit_approvers,
                default_approver_email: None,
            },
            ..WorkflowConfig::default()
        },
        ..ServerConfig::default()
    };

    let (provider, engine) = in_memory_engine(&config, Arc::new(SystemClock))
        .await
        .unwrap();
    let router = build_router(Arc::new(GovDeskServer::new(config, engine.clone())));

    TestContext {
        router,
        provider,
        engine,
    }
}

async fn send(ctx: &TestContext, request: Request<Body>) -> (StatusCode, Value) {
    let response = ctx.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(ctx: &TestContext, uri: &str) -> (StatusCode, Value) {
    send(ctx, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn submit(ctx: &TestContext, payload: Value) -> (StatusCode, Value) {
    let request = Request::post("/v1/requests")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    send(ctx, request).await
}

fn loan_payload(value: &str, grade: u8) -> Value {
    json!({
        "kind": "loan_application",
        "guest_email": "a@x.com",
        "purpose": "Projector for district briefing",
        "value": value,
        "grade": grade,
        "unit": "ICT",
        "asset_id": "LAPTOP-017",
        "loan_start": "2030-03-18",
        "loan_end": "2030-03-22",
    })
}

fn queued_token(ctx: &TestContext, reference: &Value) -> String {
    ctx.provider
        .notifications
        .queued_of(NotificationKind::ApprovalRequested)
        .into_iter()
        .find(|n| &n.context["reference"] == reference)
        .and_then(|n| n.context["approval_token"].as_str().map(str::to_string))
        .expect("approval token was queued")
}

#[tokio::test]
async fn test_health_check() {
    let ctx = setup_test().await;
    let (status, body) = get(&ctx, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
}

#[tokio::test]
async fn test_guest_submission_is_auto_approved() {
    let ctx = setup_test().await;
    let (status, body) = submit(&ctx, loan_payload("500", 29)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "APPROVED");
    assert!(body["reference"].as_str().unwrap().starts_with("LA"));

    let uri = format!("/v1/requests/{}/state", body["id"].as_str().unwrap());
    let (status, state) = get(&ctx, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state, json!({ "state": "APPROVED" }));
}

#[tokio::test]
async fn test_approval_link_decides_once() {
    let ctx = setup_test().await;
    let (_, body) = submit(&ctx, loan_payload("3200", 44)).await;
    assert_eq!(body["state"], "UNDER_REVIEW");
    let token = queued_token(&ctx, &body["reference"]);

    let uri = format!("/approve?token={}&action=approve&remarks=ok", token);
    let (status, decided) = get(&ctx, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["state"], "APPROVED");
    assert_eq!(decided["reference"], body["reference"]);

    let (status, replay) = get(&ctx, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(replay["errorDetails"]["errorCode"], "ERR_LINK_NOT_FOUND");
}

#[tokio::test]
async fn test_rejection_link() {
    let ctx = setup_test().await;
    let (_, body) = submit(&ctx, loan_payload("3200", 44)).await;
    let token = queued_token(&ctx, &body["reference"]);

    let (status, decided) = get(
        &ctx,
        &format!("/approve?token={}&action=reject&remarks=No+budget", token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["state"], "REJECTED");
}

#[tokio::test]
async fn test_unusable_links_look_the_same() {
    let ctx = setup_test().await;
    let (_, body) = submit(&ctx, loan_payload("3200", 44)).await;
    let token = queued_token(&ctx, &body["reference"]);

    let uris = [
        "/approve".to_string(),
        "/approve?action=approve".to_string(),
        "/approve?token=&action=approve".to_string(),
        "/approve?token=short&action=approve".to_string(),
        format!("/approve?token={}A&action=approve", token),
        format!("/approve?token={}&action=maybe", token),
        format!("/approve?token={}", token),
    ];

    let mut bodies = Vec::new();
    for uri in uris {
        let (status, body) = get(&ctx, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        bodies.push(body);
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));

    let id = RequestId(body["id"].as_str().unwrap().to_string());
    assert!(ctx.engine.is_token_valid(&id, &token).await.unwrap());
}

#[tokio::test]
async fn test_link_after_portal_decision_is_conflict() {
    let ctx = setup_test().await;
    let (_, body) = submit(&ctx, loan_payload("3200", 44)).await;
    let token = queued_token(&ctx, &body["reference"]);

    let supervisor = Account::new("supervisor-1", "supervisor@agency.gov.my");
    for capability in [capabilities::APPROVE_REQUESTS, capabilities::OVERRIDE_APPROVER] {
        ctx.provider.capabilities.grant(&supervisor.id, capability);
    }
    let id = RequestId(body["id"].as_str().unwrap().to_string());
    ctx.engine
        .decide_via_portal(&supervisor, &id, true, None)
        .await
        .unwrap();

    let (status, conflict) = get(&ctx, &format!("/approve?token={}&action=reject", token)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["errorDetails"]["errorCode"], "ERR_ALREADY_PROCESSED");
}

#[tokio::test]
async fn test_invalid_submissions_are_bad_requests() {
    let ctx = setup_test().await;

    let mut missing_end = loan_payload("500", 29);
    missing_end.as_object_mut().unwrap().remove("loan_end");
    let (status, _) = submit(&ctx, missing_end).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_email = loan_payload("500", 29);
    bad_email["guest_email"] = json!("not-an-email");
    let (status, body) = submit(&ctx, bad_email).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_BAD_REQUEST");

    let mut unknown_asset = loan_payload("500", 29);
    unknown_asset["asset_id"] = json!("NO-SUCH-ASSET");
    let (status, body) = submit(&ctx, unknown_asset).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_BAD_REQUEST");

    let (status, _) = submit(&ctx, json!({ "purpose": "missing fields" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(ctx.provider.requests.is_empty().await);
}

#[tokio::test]
async fn test_unknown_request_state_is_not_found() {
    let ctx = setup_test().await;
    let (status, body) = get(&ctx, "/v1/requests/does-not-exist/state").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_NOT_FOUND");
}
