mod common;

use base64::Engine;
use batchops::alert::{AlertDispatcher, AlertLevel, ChannelKind, NewAlert};
use batchops::config::AlertConfig;
use common::{setup_with, start_daily};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> AlertConfig {
    AlertConfig {
        email_url: Some(format!("{}/mail", server.uri())),
        email_user: Some("user".to_string()),
        email_password: Some("pass".to_string()),
        email_to: vec!["oncall@example.com".to_string()],
        chat_webhook: Some(format!("{}/chat", server.uri())),
        http_timeout_secs: 5,
        ..Default::default()
    }
}

#[tokio::test]
async fn error_alert_goes_to_email_and_chat() {
    let server = MockServer::start().await;
    let basic = base64::engine::general_purpose::STANDARD.encode("user:pass");
    Mock::given(method("POST"))
        .and(path("/mail"))
        .and(header("Authorization", format!("Basic {}", basic).as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = AlertDispatcher::from_config(&config_for(&server)).unwrap();
    let (ops, _db) = setup_with(dispatcher).await;

    let (alert, handle) = ops
        .alerts()
        .send_alert_tracked(NewAlert::new(
            "JOB_FAILED",
            AlertLevel::Error,
            "DAILY_SIM failed",
            "batch C1-BAT-001 failed",
        ))
        .await
        .unwrap();
    assert_eq!(alert.channels_sent, vec![ChannelKind::Email, ChannelKind::Chat]);
    assert!(alert.sent_at.is_some());

    let report = handle.await.unwrap();
    assert!(report.all_delivered());
    assert_eq!(report.delivered.len(), 2);

    let chat = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/chat")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&chat.body).unwrap();
    let text = body["text"].as_str().unwrap();
    assert!(text.contains("[ERROR] DAILY_SIM failed"));
}

#[tokio::test]
async fn info_alert_only_goes_to_email() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mail"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dispatcher = AlertDispatcher::from_config(&config_for(&server)).unwrap();
    let (ops, _db) = setup_with(dispatcher).await;
    let (alert, handle) = ops
        .alerts()
        .send_alert_tracked(NewAlert::new(
            "REPLAY_EXECUTED",
            AlertLevel::Info,
            "replay started",
            "range replay",
        ))
        .await
        .unwrap();
    assert_eq!(alert.channels_sent, vec![ChannelKind::Email]);
    assert_eq!(handle.await.unwrap().delivered, vec![ChannelKind::Email]);
}

#[tokio::test]
async fn delivery_failure_keeps_the_alert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mail"))
        .respond_with(ResponseTemplate::new(500).set_body_string("relay down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dispatcher = AlertDispatcher::from_config(&config_for(&server)).unwrap();
    let (ops, _db) = setup_with(dispatcher).await;
    let (alert, handle) = ops
        .alerts()
        .send_alert_tracked(NewAlert::new(
            "JOB_FAILED",
            AlertLevel::Critical,
            "RISK_REPORT failed",
            "upstream missing",
        ))
        .await
        .unwrap();

    let report = handle.await.unwrap();
    assert!(!report.all_delivered());
    assert!(report.delivered.is_empty());
    assert_eq!(report.failed.len(), 2);
    let email = report
        .failed
        .iter()
        .find(|(k, _)| *k == ChannelKind::Email)
        .unwrap();
    assert!(email.1.contains("500"));
    let chat = report
        .failed
        .iter()
        .find(|(k, _)| *k == ChannelKind::Chat)
        .unwrap();
    assert_eq!(chat.1, "unauthorized");

    // the row keeps the selection; delivery outcomes live in the report
    let stored = ops.alerts().get(alert.id).await.unwrap();
    assert_eq!(stored.alert_type, "JOB_FAILED");
    assert_eq!(stored.channels_sent, vec![ChannelKind::Email, ChannelKind::Chat]);
    assert_eq!(stored.sent_at, alert.sent_at);
    assert!(!stored.is_acknowledged());
}

#[tokio::test]
async fn unreachable_channel_does_not_fail_the_operation() {
    let cfg = AlertConfig {
        chat_webhook: Some("http://127.0.0.1:9/chat".to_string()),
        http_timeout_secs: 1,
        ..Default::default()
    };
    let (ops, _db) = setup_with(AlertDispatcher::from_config(&cfg).unwrap()).await;

    start_daily(&ops, "DAILY_SIM", "C1-BAT-001").await;
    let failed = ops
        .fail_execution(
            &common::ctx("scheduler"),
            "C1-BAT-001",
            "E42",
            "upstream missing",
            None,
        )
        .await
        .unwrap();
    assert_eq!(failed.status.as_str(), "FAILED");

    let alerts = ops
        .alerts()
        .list_alerts(&Default::default(), batchops::storage::Page::new(None, None))
        .await
        .unwrap();
    assert!(alerts.iter().any(|a| a.alert_type == "JOB_FAILED"
        && a.execution_id.as_deref() == Some("C1-BAT-001")));
}
