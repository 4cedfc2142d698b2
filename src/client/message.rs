//! HTML message rendering.

use std::fmt::Write;

use base64::{Engine, engine::general_purpose::STANDARD};

/// Maximum length of a base64 body line (RFC 2045).
const BASE64_LINE_LENGTH: usize = 76;

/// Builder for a single-part HTML message.
///
/// The body is base64 encoded, so arbitrary template content (long lines,
/// leading dots, non-ASCII) is safe to transmit without dot-stuffing.
///
/// # Examples
///
/// ```
/// use relaycast::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .html_body("<p>This is the message body</p>")
///     .build();
///
/// assert!(message.contains("Content-Type: text/html; charset=utf-8"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    html_body: String,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to = Some(email.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds an extra header, emitted after the standard ones in insertion order.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn html_body(mut self, content: impl Into<String>) -> Self {
        self.html_body = content.into();
        self
    }

    /// Renders the message with CRLF line endings.
    #[must_use]
    pub fn build(self) -> String {
        let mut message = String::with_capacity(1024 + self.html_body.len() * 4 / 3);

        // Writing into a String cannot fail.
        let _ = write!(message, "Date: {}\r\n", chrono::Utc::now().to_rfc2822());
        if let Some(from) = &self.from {
            let _ = write!(message, "From: {}\r\n", single_line(from));
        }
        if let Some(to) = &self.to {
            let _ = write!(message, "To: {}\r\n", single_line(to));
        }
        if let Some(subject) = &self.subject {
            let _ = write!(message, "Subject: {}\r\n", encode_header(subject));
        }
        let _ = write!(
            message,
            "Message-ID: <{}@{}>\r\n",
            ulid::Ulid::new(),
            single_line(self.message_id_domain())
        );

        for (name, value) in &self.headers {
            let _ = write!(message, "{}: {}\r\n", single_line(name), single_line(value));
        }

        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/html; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: base64\r\n");
        message.push_str("\r\n");
        message.push_str(&wrap_base64(&STANDARD.encode(self.html_body.as_bytes())));

        message
    }

    fn message_id_domain(&self) -> &str {
        self.from
            .as_deref()
            .and_then(|from| from.rsplit_once('@'))
            .map_or("localhost", |(_, domain)| domain)
    }
}

/// Replaces control characters (CR and LF included) with spaces so a value
/// can never start a new header line.
fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() && c != '\t' { ' ' } else { c })
        .collect()
}

/// Encodes a header value as an RFC 2047 encoded-word when it is not plain ASCII.
fn encode_header(value: &str) -> String {
    let value = single_line(value);
    if value.is_ascii() {
        value
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

fn wrap_base64(encoded: &str) -> String {
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2 + 2);
    // base64 output is ASCII, so byte chunks are valid UTF-8.
    for chunk in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        wrapped.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        wrapped.push_str("\r\n");
    }
    wrapped
}
