//! Single delivery attempts against a single relay
//!
//! [`SmtpDelivery`] runs one full submission session:
//! - connect (implicit TLS on port 465)
//! - greeting and EHLO
//! - STARTTLS when advertised or required, then EHLO again
//! - AUTH PLAIN or AUTH LOGIN with the relay's credentials
//! - MAIL FROM, RCPT TO, DATA and the message content
//! - QUIT
//!
//! Every network step is bounded by a timeout from [`SmtpTimeouts`]. There
//! is no retry logic here.

use std::{future::Future, time::Duration};

use async_trait::async_trait;

use crate::{
    client::{self, AuthMechanism, ClientError, MessageBuilder, Response, SmtpClient},
    error::DeliveryError,
    relay::RelayCredential,
    types::{MessageTemplate, Recipient, SmtpTimeouts},
};

/// Port on which the session starts with a TLS handshake.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Something that can make one delivery attempt.
///
/// Implemented by [`SmtpDelivery`] for real relays; tests substitute fakes.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Delivers `template` to `recipient` through `relay`, exactly once.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] describing why this attempt failed.
    async fn attempt(
        &self,
        recipient: &Recipient,
        relay: &RelayCredential,
        template: &MessageTemplate,
    ) -> Result<(), DeliveryError>;
}

/// Delivers over SMTP submission.
#[derive(Debug, Clone)]
pub struct SmtpDelivery {
    timeouts: SmtpTimeouts,
    helo_name: String,
    require_tls: bool,
    accept_invalid_certs: bool,
}

impl Default for SmtpDelivery {
    fn default() -> Self {
        Self {
            timeouts: SmtpTimeouts::default(),
            helo_name: "localhost".to_string(),
            require_tls: true,
            accept_invalid_certs: false,
        }
    }
}

/// Runs `step` under `limit`, turning an elapsed timer into a
/// [`DeliveryError::Timeout`] naming the step.
async fn within<T>(
    limit: Duration,
    step: &str,
    future: impl Future<Output = client::Result<T>>,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| DeliveryError::Timeout(format!("{step} timed out after {limit:?}")))?
        .map_err(DeliveryError::from)
}

fn rejected(response: &Response) -> DeliveryError {
    DeliveryError::Rejected {
        code: response.code,
        message: response.message(),
    }
}

impl SmtpDelivery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn timeouts(mut self, timeouts: SmtpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Name announced in EHLO. Default is `localhost`.
    #[must_use]
    pub fn helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = helo_name.into();
        self
    }

    /// Refuse to authenticate over plaintext. Default is `true`.
    #[must_use]
    pub const fn require_tls(mut self, require: bool) -> Self {
        self.require_tls = require;
        self
    }

    /// Accept any TLS certificate. Default is `false`.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    async fn connect_and_greet(&self, relay: &RelayCredential) -> Result<SmtpClient, DeliveryError> {
        let address = relay.address();

        let connecting = async {
            if relay.port == IMPLICIT_TLS_PORT {
                SmtpClient::connect_tls(&address, relay.server.as_str(), self.accept_invalid_certs)
                    .await
            } else {
                SmtpClient::connect(&address, relay.server.as_str())
                    .await
                    .map(|client| client.accept_invalid_certs(self.accept_invalid_certs))
            }
        };

        let connect_timeout = self.timeouts.connect();
        let mut client = tokio::time::timeout(connect_timeout, connecting)
            .await
            .map_err(|_| {
                DeliveryError::Timeout(format!(
                    "Connecting to {address} timed out after {connect_timeout:?}"
                ))
            })?
            .map_err(|e| match e {
                ClientError::TlsError(msg) => DeliveryError::Tls(msg),
                other => DeliveryError::Connection(format!("Failed to connect to {address}: {other}")),
            })?;

        let greeting = within(self.timeouts.command(), "Greeting", client.read_greeting()).await?;
        if !greeting.is_success() {
            return Err(rejected(&greeting));
        }

        Ok(client)
    }

    async fn ehlo(&self, client: &mut SmtpClient) -> Result<Response, DeliveryError> {
        let response = within(self.timeouts.command(), "EHLO", client.ehlo(&self.helo_name)).await?;
        if !response.is_success() {
            return Err(rejected(&response));
        }
        Ok(response)
    }

    /// Upgrades a plaintext session when possible, returning the EHLO reply
    /// that is valid for the resulting session.
    async fn negotiate_tls(
        &self,
        client: &mut SmtpClient,
        ehlo: Response,
    ) -> Result<Response, DeliveryError> {
        if client.is_tls() {
            return Ok(ehlo);
        }

        if !ehlo.has_capability("STARTTLS") {
            if self.require_tls {
                return Err(DeliveryError::Tls(
                    "Server does not advertise STARTTLS".to_string(),
                ));
            }
            tracing::debug!("STARTTLS not advertised, continuing in plaintext");
            return Ok(ehlo);
        }

        let response = within(self.timeouts.command(), "STARTTLS", client.starttls()).await?;
        if response.is_success() {
            return self.ehlo(client).await;
        }

        if self.require_tls {
            return Err(DeliveryError::Tls(format!(
                "Server refused STARTTLS: {} {}",
                response.code,
                response.message()
            )));
        }

        tracing::debug!(
            code = response.code,
            "STARTTLS refused, continuing in plaintext"
        );
        Ok(ehlo)
    }

    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        ehlo: &Response,
        relay: &RelayCredential,
    ) -> Result<(), DeliveryError> {
        let mechanism = AuthMechanism::negotiate(&ehlo.auth_mechanisms()).ok_or_else(|| {
            DeliveryError::Authentication(
                "Server does not advertise AUTH PLAIN or AUTH LOGIN".to_string(),
            )
        })?;

        let response = within(
            self.timeouts.command(),
            "AUTH",
            client.authenticate(mechanism, &relay.username, &relay.secret),
        )
        .await?;

        if !response.is_success() {
            return Err(DeliveryError::Authentication(format!(
                "{} {}",
                response.code,
                response.message()
            )));
        }

        Ok(())
    }

    async fn send_message(
        &self,
        client: &mut SmtpClient,
        recipient: &Recipient,
        relay: &RelayCredential,
        template: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        let response = within(
            self.timeouts.command(),
            "MAIL FROM",
            client.mail_from(&relay.username),
        )
        .await?;
        if !response.is_success() {
            return Err(rejected(&response));
        }

        let response = within(
            self.timeouts.command(),
            "RCPT TO",
            client.rcpt_to(recipient.as_str()),
        )
        .await?;
        if !response.is_success() {
            return Err(rejected(&response));
        }

        let response = within(self.timeouts.command(), "DATA", client.data()).await?;
        if !response.is_intermediate() {
            return Err(rejected(&response));
        }

        let message = MessageBuilder::new()
            .from(relay.username.as_str())
            .to(recipient.as_str())
            .subject(template.subject_line.as_str())
            .html_body(template.html_body.as_str())
            .build();

        let response = within(
            self.timeouts.data(),
            "Message content",
            client.send_data(&message),
        )
        .await?;
        if !response.is_success() {
            return Err(rejected(&response));
        }

        Ok(())
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(relay = %relay.address(), username = %relay.username, recipient = %recipient)
    )]
    async fn transact(
        &self,
        recipient: &Recipient,
        relay: &RelayCredential,
        template: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        if self.accept_invalid_certs {
            tracing::warn!(
                server = %relay.server,
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        let mut client = self.connect_and_greet(relay).await?;
        let ehlo = self.ehlo(&mut client).await?;
        let ehlo = self.negotiate_tls(&mut client, ehlo).await?;

        self.authenticate(&mut client, &ehlo, relay).await?;
        self.send_message(&mut client, recipient, relay, template).await?;

        // The relay has accepted the message; QUIT problems only get logged.
        match tokio::time::timeout(self.timeouts.quit(), client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("QUIT failed after accepted message: {e}"),
            Err(_) => tracing::warn!(
                timeout = ?self.timeouts.quit(),
                "QUIT timed out after accepted message"
            ),
        }

        Ok(())
    }
}

#[async_trait]
impl Delivery for SmtpDelivery {
    async fn attempt(
        &self,
        recipient: &Recipient,
        relay: &RelayCredential,
        template: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        self.transact(recipient, relay, template).await
    }
}
