//! Minimal async SMTP submission client.
//!
//! Supports exactly what relay submission needs:
//!
//! - Plain TCP with STARTTLS upgrade, or implicit TLS (port 465 style)
//! - EHLO capability inspection
//! - AUTH PLAIN and AUTH LOGIN
//! - MAIL FROM / RCPT TO / DATA / QUIT
//!
//! # Example
//!
//! ```no_run
//! use relaycast::client::{MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("smtp.example.com:587", "smtp.example.com").await?;
//! client.read_greeting().await?;
//! client.ehlo("localhost").await?;
//! client.starttls().await?;
//! client.ehlo("localhost").await?;
//! client.auth_plain("user@example.com", "secret").await?;
//! client.mail_from("user@example.com").await?;
//! client.rcpt_to("someone@example.org").await?;
//! client.data().await?;
//!
//! let message = MessageBuilder::new()
//!     .from("user@example.com")
//!     .to("someone@example.org")
//!     .subject("Hello")
//!     .html_body("<p>Hi</p>")
//!     .build();
//! client.send_data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::MessageBuilder;
pub use response::{Response, ResponseLine};
pub use smtp_client::{AuthMechanism, SmtpClient};
