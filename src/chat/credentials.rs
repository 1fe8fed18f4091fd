//! Credential injection for the streaming connection.
//!
//! The hosting application owns credential storage; the session controller
//! only asks a provider for the current value each time it opens.

use std::fmt;

/// Authorization material attached to one connection handshake.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    /// Wrap an optional bearer token.
    #[must_use]
    pub const fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// The token, if one is available.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of credentials, queried on every open.
pub trait CredentialProvider: Send + Sync {
    /// Current credentials.
    fn credentials(&self) -> Credentials;
}

impl CredentialProvider for Credentials {
    fn credentials(&self) -> Credentials {
        self.clone()
    }
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn credentials(&self) -> Credentials {
        Credentials::new(self())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_token() {
        let credentials = Credentials::new(Some("secret".to_string()));
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn closures_act_as_providers() {
        let provider = || Some("fresh".to_string());
        assert_eq!(provider.credentials().token(), Some("fresh"));
    }
}
