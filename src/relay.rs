//! Relay credentials and uniform-random relay selection

use std::fmt;

use rand::Rng;

use crate::error::ConfigurationError;

/// One outbound submission account: where to connect and how to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayCredential {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
}

impl RelayCredential {
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// `server:port`, suitable for `TcpStream::connect`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl fmt::Debug for RelayCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCredential")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// The fixed set of relays for a campaign.
///
/// Selection is uniform with replacement on every call. There is no affinity
/// and no exclusion of relays that just failed.
#[derive(Debug, Clone)]
pub struct RelayPool {
    relays: Vec<RelayCredential>,
}

impl RelayPool {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NoRelays`] if `relays` is empty.
    pub fn new(relays: Vec<RelayCredential>) -> Result<Self, ConfigurationError> {
        if relays.is_empty() {
            return Err(ConfigurationError::NoRelays);
        }
        Ok(Self { relays })
    }

    /// Picks a relay using the thread-local generator.
    #[must_use]
    pub fn pick_relay(&self) -> &RelayCredential {
        self.pick_relay_with(&mut rand::rng())
    }

    /// Picks a relay using the supplied random source.
    pub fn pick_relay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> &RelayCredential {
        &self.relays[rng.random_range(0..self.relays.len())]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    #[must_use]
    pub fn relays(&self) -> &[RelayCredential] {
        &self.relays
    }
}
