//! `SmtpDelivery` against a mock relay

mod support;

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use relaycast::{
    Delivery, DeliveryError, MessageTemplate, Recipient, RelayCredential, SmtpDelivery,
    SmtpTimeouts,
};
use support::mock_server::{MockSmtpServer, SmtpCommand};

fn relay_for(server: &MockSmtpServer) -> RelayCredential {
    RelayCredential::new("127.0.0.1", server.addr().port(), "a@example.com", "secret")
}

fn plaintext_delivery() -> SmtpDelivery {
    SmtpDelivery::new().require_tls(false)
}

fn template() -> MessageTemplate {
    MessageTemplate::new("Hello", "<p>Hi</p>")
}

async fn attempt(delivery: &SmtpDelivery, relay: &RelayCredential) -> Result<(), DeliveryError> {
    delivery
        .attempt(&Recipient::new("x@example.com"), relay, &template())
        .await
}

#[tokio::test]
async fn test_successful_session() {
    let server = MockSmtpServer::builder().build().await.unwrap();

    attempt(&plaintext_delivery(), &relay_for(&server))
        .await
        .unwrap();

    let commands = server.commands().await;
    let token = STANDARD.encode("\0a@example.com\0secret");

    assert_eq!(commands[0], SmtpCommand::Ehlo("localhost".to_string()));
    assert_eq!(commands[1], SmtpCommand::Auth(format!("PLAIN {token}")));
    assert_eq!(
        commands[2],
        SmtpCommand::MailFrom("FROM:<a@example.com>".to_string())
    );
    assert_eq!(
        commands[3],
        SmtpCommand::RcptTo("TO:<x@example.com>".to_string())
    );
    assert_eq!(commands[4], SmtpCommand::Data);

    let SmtpCommand::MessageContent(content) = &commands[5] else {
        panic!("expected message content, got {:?}", commands[5]);
    };
    assert!(content.contains("From: a@example.com\r\n"));
    assert!(content.contains("To: x@example.com\r\n"));
    assert!(content.contains("Subject: Hello\r\n"));
    assert!(content.contains("Content-Type: text/html; charset=utf-8\r\n"));
    assert!(content.contains(&STANDARD.encode("<p>Hi</p>")));

    assert_eq!(commands.last(), Some(&SmtpCommand::Quit));
    server.shutdown();
}

#[tokio::test]
async fn test_auth_login_when_plain_not_offered() {
    let server = MockSmtpServer::builder()
        .with_capabilities(&["mock.example.com", "AUTH LOGIN"])
        .build()
        .await
        .unwrap();

    attempt(&plaintext_delivery(), &relay_for(&server))
        .await
        .unwrap();

    let commands = server.commands().await;
    assert_eq!(commands[1], SmtpCommand::Auth("LOGIN".to_string()));
    assert_eq!(
        commands[2],
        SmtpCommand::AuthResponse(STANDARD.encode("a@example.com"))
    );
    assert_eq!(
        commands[3],
        SmtpCommand::AuthResponse(STANDARD.encode("secret"))
    );
    assert!(matches!(commands[4], SmtpCommand::MailFrom(_)));
    server.shutdown();
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockSmtpServer::builder()
        .with_auth_response(535, "5.7.8 Authentication credentials invalid")
        .build()
        .await
        .unwrap();

    let error = attempt(&plaintext_delivery(), &relay_for(&server))
        .await
        .unwrap_err();

    assert_eq!(
        error,
        DeliveryError::Authentication("535 5.7.8 Authentication credentials invalid".to_string())
    );
    assert!(
        !server
            .commands()
            .await
            .iter()
            .any(|c| matches!(c, SmtpCommand::MailFrom(_)))
    );
    server.shutdown();
}

#[tokio::test]
async fn test_no_auth_advertised() {
    let server = MockSmtpServer::builder()
        .with_capabilities(&["mock.example.com", "SIZE 10000"])
        .build()
        .await
        .unwrap();

    let error = attempt(&plaintext_delivery(), &relay_for(&server))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), "authentication");
    server.shutdown();
}

#[tokio::test]
async fn test_rejected_recipient() {
    let server = MockSmtpServer::builder()
        .with_rcpt_to_response(550, "User unknown")
        .build()
        .await
        .unwrap();

    let error = attempt(&plaintext_delivery(), &relay_for(&server))
        .await
        .unwrap_err();

    assert_eq!(
        error,
        DeliveryError::Rejected {
            code: 550,
            message: "User unknown".to_string()
        }
    );
    server.shutdown();
}

#[tokio::test]
async fn test_rejected_message_content() {
    let server = MockSmtpServer::builder()
        .with_data_end_response(452, "Insufficient system storage")
        .build()
        .await
        .unwrap();

    let error = attempt(&plaintext_delivery(), &relay_for(&server))
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "452 Insufficient system storage");
    assert!(error.is_transient());
    server.shutdown();
}

#[tokio::test]
async fn test_tls_required_but_not_offered() {
    let server = MockSmtpServer::builder().build().await.unwrap();

    let error = attempt(&SmtpDelivery::new(), &relay_for(&server))
        .await
        .unwrap_err();

    assert!(matches!(error, DeliveryError::Tls(_)), "{error:?}");
    assert!(
        !server
            .commands()
            .await
            .iter()
            .any(|c| matches!(c, SmtpCommand::Auth(_)))
    );
    server.shutdown();
}

#[tokio::test]
async fn test_refused_starttls_continues_when_optional() {
    let server = MockSmtpServer::builder()
        .with_capabilities(&["mock.example.com", "STARTTLS", "AUTH PLAIN"])
        .with_starttls_response(454, "TLS not available due to temporary reason")
        .build()
        .await
        .unwrap();

    attempt(&plaintext_delivery(), &relay_for(&server))
        .await
        .unwrap();

    let commands = server.commands().await;
    assert_eq!(commands[1], SmtpCommand::StartTls);
    assert!(matches!(commands[2], SmtpCommand::Auth(_)));
    server.shutdown();
}

#[tokio::test]
async fn test_refused_connection() {
    // Grab a free port, then close it again.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let relay = RelayCredential::new("127.0.0.1", port, "a@example.com", "secret");
    let error = attempt(&plaintext_delivery(), &relay).await.unwrap_err();

    assert!(matches!(error, DeliveryError::Connection(_)), "{error:?}");
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let server = MockSmtpServer::builder()
        .with_greeting_delay(Duration::from_secs(5))
        .build()
        .await
        .unwrap();

    let delivery = plaintext_delivery().timeouts(SmtpTimeouts {
        command_secs: 1,
        ..SmtpTimeouts::default()
    });

    let error = attempt(&delivery, &relay_for(&server)).await.unwrap_err();

    let DeliveryError::Timeout(message) = error else {
        panic!("expected timeout, got {error:?}");
    };
    assert!(message.starts_with("Greeting timed out"));
    server.shutdown();
}
