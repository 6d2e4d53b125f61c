use flowlens::core::approval::{ApprovalAction, ApprovalDecision, Approver};
use flowlens::core::runs::RunStatus;
use flowlens::core::types::ErrorCategory;
use flowlens::session::client::{EngineApi, EngineClient};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> EngineClient {
    let http = Url::parse(&server.uri()).unwrap();
    let ws = Url::parse(&server.uri().replacen("http", "ws", 1)).unwrap();
    EngineClient::new(http, ws, 25)
}

#[tokio::test]
async fn test_list_runs_accepts_bare_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flows/billing/runs"))
        .and(query_param("limit", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "r-1", "status": "success", "createdAt": "2026-03-01T09:00:00Z", "resultPayload": {}},
            {"id": "r-2", "status": "waiting", "createdAt": "2026-03-01T10:00:00Z", "resultPayload": "{}"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let runs = client_for(&server).list_runs("billing").await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].status, RunStatus::Waiting);
}

#[tokio::test]
async fn test_list_runs_accepts_wrapped_object_and_skips_unreadable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flows/billing/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": [
                {"run_id": "r-3", "state": "FAILED", "result": {"1": {"status": "error"}}},
                {"status": "success"}
            ]
        })))
        .mount(&server)
        .await;

    let runs = client_for(&server).list_runs("billing").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, "r-3");
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_list_runs_server_error_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flows/billing/runs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine exploded"))
        .mount(&server)
        .await;

    let err = client_for(&server).list_runs("billing").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::TransportFailure);
    assert_eq!(err.code, "FL-ENGINE-002");
    assert!(err.message.contains("500"));
    assert!(err.message.contains("engine exploded"));
}

#[tokio::test]
async fn test_unexpected_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flows/billing/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let err = client_for(&server).list_runs("billing").await.unwrap_err();
    assert_eq!(err.code, "FL-ENGINE-003");
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_get_run_uses_single_run_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flows/billing/runs/r-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "r-7",
            "status": "waiting",
            "currentContext": {"wait_info": {"approve": {"instructions": "Confirm refund"}}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let run = client_for(&server).get_run("billing", "r-7").await.unwrap();
    assert_eq!(run.id, "r-7");
    assert!(run.wait_info().is_some());
}

#[tokio::test]
async fn test_get_run_falls_back_to_history_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flows/billing/runs/r-2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/flows/billing/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "r-1", "status": "success"},
            {"id": "r-2", "status": "running"}
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let run = client.get_run("billing", "r-2").await.unwrap();
    assert_eq!(run.status, RunStatus::Running);

    let err = client.get_run("billing", "missing").await.unwrap_err();
    assert_eq!(err.code, "FL-ENGINE-005");
}

#[tokio::test]
async fn test_submit_decision_posts_approver_and_source() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/flows/billing/runs/r-9/reject"))
        .and(body_json(json!({"approver": "ops@example.com", "source": "flowlens"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let action = ApprovalAction {
        flow_id: "billing".to_string(),
        run_id: "r-9".to_string(),
        decision: ApprovalDecision::Reject,
        approver: Approver::new("ops@example.com", "flowlens"),
        token: 1,
    };
    client_for(&server).submit_decision(&action).await.unwrap();
}

#[tokio::test]
async fn test_submit_decision_rejection_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/flows/billing/runs/r-9/resume"))
        .respond_with(ResponseTemplate::new(409).set_body_string("run is not waiting"))
        .mount(&server)
        .await;

    let action = ApprovalAction {
        flow_id: "billing".to_string(),
        run_id: "r-9".to_string(),
        decision: ApprovalDecision::Resume,
        approver: Approver::new("operator", "flowlens"),
        token: 3,
    };
    let err = client_for(&server).submit_decision(&action).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::TransportFailure);
    assert!(err.message.contains("run is not waiting"));
}

#[tokio::test]
async fn test_unreachable_engine_is_http_error() {
    let client = EngineClient::new(
        Url::parse("http://127.0.0.1:9").unwrap(),
        Url::parse("ws://127.0.0.1:9").unwrap(),
        10,
    );
    let err = client.list_runs("billing").await.unwrap_err();
    assert_eq!(err.code, "FL-ENGINE-001");
    assert!(err.is_transport());
}
