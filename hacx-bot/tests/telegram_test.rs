//! Telegram channel tests against a mock Bot API.

use hacx_bot::{Channel, ChannelError, TelegramChannel};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:ABC";

fn channel_for(server: &MockServer) -> TelegramChannel {
    TelegramChannel::new(TOKEN)
        .with_api_base(server.uri())
        .with_poll_backoff(Duration::from_millis(10))
}

fn ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}}))
}

#[tokio::test]
async fn test_init_checks_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": 1, "is_bot": true, "username": "HacxGPTBot"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut channel = channel_for(&server);
    channel.init().await.unwrap();
}

#[tokio::test]
async fn test_init_rejects_bad_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let mut channel = channel_for(&server);
    assert!(matches!(channel.init().await, Err(ChannelError::Auth(_))));
    assert!(matches!(
        channel.health_check().await,
        Err(ChannelError::NotReady)
    ));
}

#[tokio::test]
async fn test_send_uses_markdown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": "42",
            "text": "*hi*",
            "parse_mode": "Markdown",
            "disable_web_page_preview": true
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    channel_for(&server).send("42", "*hi*").await.unwrap();
}

#[tokio::test]
async fn test_markdown_rejection_resends_plain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({"parse_mode": "Markdown"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: can't parse entities: Can't find end of the entity"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ok())
        .mount(&server)
        .await;

    channel_for(&server).send("42", "a_b*c").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let plain: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(plain["text"], "a_b*c");
    assert!(plain.get("parse_mode").is_none());
}

#[tokio::test]
async fn test_other_send_failures_are_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: chat not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = channel_for(&server).send("42", "hi").await.unwrap_err();
    assert!(matches!(err, ChannelError::SendFailed(_)));
}

#[tokio::test]
async fn test_send_typing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendChatAction")))
        .and(body_partial_json(json!({"chat_id": "42", "action": "typing"})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    channel_for(&server).send_typing("42").await.unwrap();
}

#[tokio::test]
async fn test_listen_forwards_text_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                {
                    "update_id": 100,
                    "message": {
                        "message_id": 1,
                        "date": 1720000000,
                        "chat": {"id": 42, "type": "private"},
                        "from": {"id": 7, "first_name": "Sara"},
                        "text": "hello"
                    }
                },
                {
                    "update_id": 101,
                    "message": {
                        "message_id": 2,
                        "chat": {"id": 42, "type": "private"},
                        "photo": []
                    }
                }
            ]
        })))
        .mount(&server)
        .await;

    let channel = channel_for(&server);
    let (tx, mut rx) = mpsc::channel(4);
    let listener = tokio::spawn(async move { channel.listen(tx).await });

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.chat_id, "42");
    assert_eq!(msg.user_id, "7");
    assert_eq!(msg.text, "hello");
    assert_eq!(msg.first_name.as_deref(), Some("Sara"));

    // Closing the receiver ends the listener on its next delivery.
    drop(rx);
    let result = tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());

    let requests = server.received_requests().await.unwrap();
    let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(second["offset"], 102);
}

#[tokio::test]
async fn test_listen_backs_off_on_missing_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let channel = TelegramChannel::new(TOKEN)
        .with_api_base(server.uri())
        .with_poll_backoff(Duration::from_millis(100));
    let (tx, _rx) = mpsc::channel(4);
    let listener = tokio::spawn(async move { channel.listen(tx).await });

    tokio::time::sleep(Duration::from_millis(250)).await;
    listener.abort();

    let polls = server.received_requests().await.unwrap().len();
    assert!(polls >= 1, "listener never polled");
    assert!(polls <= 5, "polled {polls} times without backing off");
}
