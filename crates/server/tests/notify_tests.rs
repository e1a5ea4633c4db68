use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use buildtrack_server::{
    config::WhatsAppConfig,
    error::AppError,
    services::notify::{Notifier, WhatsAppNotifier, YesNoMessage},
};

fn notifier(api_url: String, token: Option<&str>) -> WhatsAppNotifier {
    WhatsAppNotifier::new(
        WhatsAppConfig {
            api_url,
            token: token.map(str::to_string),
            sender_id: Some("1029384756".to_string()),
        },
        reqwest::Client::new(),
    )
}

fn message() -> YesNoMessage {
    YesNoMessage {
        phone: "+34 600 123 456".to_string(),
        body: "Can you start on the roof Monday?".to_string(),
    }
}

#[tokio::test]
async fn sends_interactive_message_and_returns_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1029384756/messages"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "messaging_product": "whatsapp",
            "to": "34600123456",
            "type": "interactive",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messaging_product": "whatsapp",
            "contacts": [{ "input": "34600123456", "wa_id": "34600123456" }],
            "messages": [{ "id": "wamid.TEST123" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = notifier(mock_server.uri(), Some("test-token"))
        .send_yes_no(&message())
        .await;

    assert_eq!(result.unwrap(), "wamid.TEST123");
}

#[tokio::test]
async fn provider_errors_surface_as_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1029384756/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid OAuth access token." }
        })))
        .mount(&mock_server)
        .await;

    let result = notifier(mock_server.uri(), Some("expired"))
        .send_yes_no(&message())
        .await;

    match result {
        Err(AppError::Upstream(msg)) => assert!(msg.contains("401")),
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_credentials_skip_the_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = notifier(mock_server.uri(), None).send_yes_no(&message()).await;

    assert!(matches!(result, Err(AppError::Upstream(_))));
}
