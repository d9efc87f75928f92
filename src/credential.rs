//! Voice-session credential lookup.
//!
//! The control API hands over an opaque session token; a [`CredentialProvider`]
//! turns it into the credential used to join the voice sink.

use anyhow::{anyhow, Result};

pub trait CredentialProvider: Send + Sync {
    /// Resolve the voice credential for `session_token`.
    fn credential(&self, session_token: Option<&str>) -> Result<String>;
}

/// Serves a single configured credential (the bot token).
///
/// A token supplied with the request takes precedence over the configured one.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    token: Option<String>,
}

impl StaticCredentialProvider {
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        Self { token }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credential(&self, session_token: Option<&str>) -> Result<String> {
        if let Some(token) = session_token.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }

        self.token.clone().ok_or_else(|| {
            anyhow!("no voice credential configured; set DISCORD_BOT_TOKEN or pass a token")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_token() {
        let provider = StaticCredentialProvider::new(Some("bot-token".to_string()));
        assert!(provider.is_configured());
        assert_eq!(provider.credential(None).unwrap(), "bot-token");
    }

    #[test]
    fn test_request_token_wins() {
        let provider = StaticCredentialProvider::new(Some("bot-token".to_string()));
        assert_eq!(provider.credential(Some("session")).unwrap(), "session");
        assert_eq!(provider.credential(Some("  ")).unwrap(), "bot-token");
    }

    #[test]
    fn test_missing_token_fails() {
        let provider = StaticCredentialProvider::new(Some("   ".to_string()));
        assert!(!provider.is_configured());
        assert!(provider.credential(None).is_err());
    }
}
