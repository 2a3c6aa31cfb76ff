//! Replication credential
//!
//! Supplied from the environment, kept in memory for one run, handed to
//! remote commands on stdin only. It is neither serializable nor
//! printable.

use std::fmt;

/// Environment variable the secret is read from.
pub const PASSWORD_ENV: &str = "HASWITCH_REPLICATION_PASSWORD";

#[derive(Clone)]
pub struct ReplicationCredential {
    user: String,
    secret: String,
}

impl ReplicationCredential {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    /// Read the secret from `HASWITCH_REPLICATION_PASSWORD`.
    /// Returns `None` when the variable is unset or empty.
    pub fn from_env(user: impl Into<String>) -> Option<Self> {
        std::env::var(PASSWORD_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|secret| Self::new(user, secret))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The secret, for writing to a child's stdin.
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for ReplicationCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationCredential")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}
