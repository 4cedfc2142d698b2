//! Flat-file inputs: relay credentials, recipients and the HTML template.
//!
//! Relay and recipient files are read line by line. Lines are trimmed;
//! blank lines and `#` comments are ignored. A malformed relay line is
//! skipped with a warning and never reaches the dispatch engine. A missing
//! relay or recipient file is an empty list, which the runner then refuses.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{
    config::CampaignConfig,
    error::{LineError, LoadError},
    relay::RelayCredential,
    types::{MessageTemplate, Recipient},
};

/// Example relay line written by [`scaffold`].
pub const EXAMPLE_RELAYS: &str = "smtp.example.com|587|user@example.com|password\n";

/// Example recipient written by [`scaffold`].
pub const EXAMPLE_RECIPIENTS: &str = "recipient@example.com\n";

/// HTML template written by [`scaffold`].
pub const DEFAULT_TEMPLATE: &str = r#"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h1 style="color: #0066cc;">Hello!</h1>
        <p>This is an important message for you.</p>
        <p>Thank you for your attention.</p>
        <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee;">
            <p style="font-size: 12px; color: #888;">This is an automated message.</p>
        </div>
    </div>
</body>
</html>
"#;

/// Lines that carry a record, with their 1-based line numbers.
fn records(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parses one `server|port|username|password` line.
///
/// Returns `Ok(None)` for blank and comment lines. Fields past the fourth
/// are ignored.
///
/// # Errors
///
/// Returns a [`LineError`] if the line has fewer than four fields or the
/// port is not a number in `0..=65535`.
pub fn parse_relay_line(line: &str) -> Result<Option<RelayCredential>, LineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let [server, port, username, secret, ..] = fields.as_slice() else {
        return Err(LineError::MissingFields {
            found: fields.len(),
        });
    };

    let port = port
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| LineError::InvalidPort {
            value: (*port).to_string(),
        })?;

    Ok(Some(RelayCredential::new(*server, port, *username, *secret)))
}

/// Parses a relay file's content, skipping malformed lines.
#[must_use]
pub fn parse_relays(content: &str) -> Vec<RelayCredential> {
    records(content)
        .filter_map(|(number, line)| match parse_relay_line(line) {
            Ok(relay) => relay,
            Err(e) => {
                warn!("Skipping relay line {number}: {e}");
                None
            }
        })
        .collect()
}

/// Parses a recipient file's content, one address per line.
#[must_use]
pub fn parse_recipients(content: &str) -> Vec<Recipient> {
    records(content)
        .map(|(_, line)| Recipient::new(line))
        .collect()
}

/// Reads `path`, treating a missing file as empty.
fn read_optional(path: &Path) -> Result<String, LoadError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("{} does not exist", path.display());
            Ok(String::new())
        }
        Err(source) => Err(LoadError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load_relays(path: &Path) -> Result<Vec<RelayCredential>, LoadError> {
    read_optional(path).map(|content| parse_relays(&content))
}

/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load_recipients(path: &Path) -> Result<Vec<Recipient>, LoadError> {
    read_optional(path).map(|content| parse_recipients(&content))
}

/// Reads the HTML body and pairs it with `subject`.
///
/// # Errors
///
/// Returns an error if the template cannot be read.
pub fn load_template(path: &Path, subject: impl Into<String>) -> Result<MessageTemplate, LoadError> {
    let html_body = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(MessageTemplate::new(subject, html_body))
}

/// Writes `content` to `path` unless the file already exists.
///
/// Returns `true` if the file was created.
fn create_if_missing(path: &Path, content: &str) -> Result<bool, LoadError> {
    let created = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .and_then(|mut file| file.write_all(content.as_bytes()));

    match created {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(source) => Err(LoadError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Creates any missing input file with example content: the configuration
/// file itself, then the relay, recipient and template files it names.
///
/// Returns the files that were created.
///
/// # Errors
///
/// Returns an error if a missing file cannot be written.
pub fn scaffold(config_path: &Path, config: &CampaignConfig) -> Result<Vec<PathBuf>, LoadError> {
    let rendered = config.to_ron().map_err(|e| LoadError::Config {
        path: config_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let files = [
        (config_path, rendered.as_str()),
        (config.files.relays.as_path(), EXAMPLE_RELAYS),
        (config.files.recipients.as_path(), EXAMPLE_RECIPIENTS),
        (config.files.template.as_path(), DEFAULT_TEMPLATE),
    ];

    let mut created = Vec::new();
    for (path, content) in files {
        if create_if_missing(path, content)? {
            created.push(path.to_path_buf());
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_relay_line() {
        let relay = parse_relay_line("smtp.example.com|587|user@example.com|password")
            .unwrap()
            .unwrap();
        assert_eq!(
            relay,
            RelayCredential::new("smtp.example.com", 587, "user@example.com", "password")
        );
    }

    #[test]
    fn test_parse_relay_line_ignores_extra_fields() {
        let relay = parse_relay_line("  mail.example.org|465|a@example.org|s3cret|spare|more  ")
            .unwrap()
            .unwrap();
        assert_eq!(relay.port, 465);
        assert_eq!(relay.secret, "s3cret");
    }

    #[test]
    fn test_parse_relay_line_skips_comments_and_blanks() {
        assert_eq!(parse_relay_line(""), Ok(None));
        assert_eq!(parse_relay_line("   "), Ok(None));
        assert_eq!(parse_relay_line("# smtp.example.com|587|u|p"), Ok(None));
    }

    #[test]
    fn test_parse_relay_line_errors() {
        assert_eq!(
            parse_relay_line("smtp.example.com|587|user@example.com"),
            Err(LineError::MissingFields { found: 3 })
        );
        assert_eq!(
            parse_relay_line("smtp.example.com|submission|user|pass"),
            Err(LineError::InvalidPort {
                value: "submission".to_string()
            })
        );
        assert_eq!(
            parse_relay_line("smtp.example.com|70000|user|pass"),
            Err(LineError::InvalidPort {
                value: "70000".to_string()
            })
        );
        assert_eq!(
            parse_relay_line("smtp.example.com|0|user|pass"),
            Err(LineError::InvalidPort {
                value: "0".to_string()
            })
        );
    }

    #[test]
    fn test_parse_relays_skips_and_continues() {
        let content = "\
# relays
a.example.com|587|a@example.com|pa

broken line
b.example.com|abc|b@example.com|pb
c.example.com|25|c@example.com|pc
";
        let usernames: Vec<_> = parse_relays(content)
            .into_iter()
            .map(|relay| relay.username)
            .collect();
        assert_eq!(usernames, vec!["a@example.com", "c@example.com"]);
    }

    #[test]
    fn test_parse_recipients() {
        let content = "x@example.com\n  y@example.com  \n\n# z@example.com\nx@example.com\n";
        assert_eq!(
            parse_recipients(content),
            vec![
                Recipient::new("x@example.com"),
                Recipient::new("y@example.com"),
                Recipient::new("x@example.com"),
            ]
        );
    }

    #[test]
    fn test_missing_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_relays(&dir.path().join("smtp.txt")).unwrap().is_empty());
        assert!(load_recipients(&dir.path().join("emails.txt")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_template(&dir.path().join("email_template.html"), "Hi"),
            Err(LoadError::Read { .. })
        ));
    }

    #[test]
    fn test_scaffold_creates_only_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CampaignConfig::default();
        config.files.relays = dir.path().join("smtp.txt");
        config.files.recipients = dir.path().join("emails.txt");
        config.files.template = dir.path().join("email_template.html");
        let config_path = dir.path().join("relaycast.config.ron");

        std::fs::write(&config.files.recipients, "me@example.com\n").unwrap();

        let created = scaffold(&config_path, &config).unwrap();
        assert_eq!(
            created,
            vec![
                config_path.clone(),
                config.files.relays.clone(),
                config.files.template.clone(),
            ]
        );

        assert_eq!(
            load_recipients(&config.files.recipients).unwrap(),
            vec![Recipient::new("me@example.com")]
        );
        let relays = load_relays(&config.files.relays).unwrap();
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].server, "smtp.example.com");

        let template = load_template(&config.files.template, "Important Message").unwrap();
        assert!(template.html_body.contains("<h1 style=\"color: #0066cc;\">Hello!</h1>"));
        assert_eq!(CampaignConfig::load(&config_path).unwrap(), config);

        assert!(scaffold(&config_path, &config).unwrap().is_empty());
    }
}
