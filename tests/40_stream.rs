mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use common::{frame, parse_sse, test_config, MockReply, MockUpstream, TestServer};

async fn stream(server: &TestServer, user: &str, body: Value) -> Result<(StatusCode, String)> {
    let res = server.post("/ai/stream", user, body).send().await?;
    let status = res.status();
    Ok((status, res.text().await?))
}

#[tokio::test]
async fn tokens_stream_in_order_and_the_answer_is_recorded() -> Result<()> {
    let mock = MockUpstream::start(MockReply::Sse(vec![
        frame("He"),
        ": OPENROUTER PROCESSING".to_string(),
        frame("llo"),
        "data: [DONE]".to_string(),
    ]))
    .await?;
    let server = TestServer::with_upstream(&mock).await?;

    let (status, body) = stream(&server, "u1", json!({"prompt": "hi", "temperature": 0.2})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        parse_sse(&body),
        vec![
            ("token".to_string(), json!({"kind": "token", "text": "He"})),
            ("token".to_string(), json!({"kind": "token", "text": "llo"})),
            ("end".to_string(), json!({"kind": "end"})),
        ]
    );

    let sent = mock.requests();
    assert_eq!(sent[0]["stream"], true);
    assert_eq!(sent[0]["temperature"], 0.2);

    let history = server.wait_for_history("u1", 1).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["prompt"], "hi");
    assert_eq!(history[0]["response"], "Hello");
    Ok(())
}

#[tokio::test]
async fn rejected_upstream_yields_one_error_and_no_history() -> Result<()> {
    let mock = MockUpstream::start(MockReply::Status(429, "Too Many Requests".to_string())).await?;
    let server = TestServer::with_upstream(&mock).await?;

    let (status, body) = stream(&server, "u1", json!({"prompt": "hi", "temperature": 0.2})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        parse_sse(&body),
        vec![(
            "error".to_string(),
            json!({"kind": "error", "message": "Too Many Requests"})
        )]
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.history("u1").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn truncated_stream_is_an_error_and_is_not_recorded() -> Result<()> {
    let mock = MockUpstream::start(MockReply::Sse(vec![frame("partial")])).await?;
    let server = TestServer::with_upstream(&mock).await?;

    let (_, body) = stream(&server, "u1", json!({"prompt": "hi"})).await?;
    let events = parse_sse(&body);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "token");
    assert_eq!(events[1].0, "error");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.history("u1").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn stream_validation_and_config_errors_are_plain_json() -> Result<()> {
    let server = TestServer::start(test_config(None)).await?;

    let res = server.post("/ai/stream", "u1", json!({"prompt": "hi"})).send().await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "CONFIG_ERROR");

    let res = server.post("/ai/stream", "u1", json!({"temperature": 0.5})).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert!(body["field_errors"]["prompt"].is_string());
    Ok(())
}
