//! SMTP/IMAP AUTH mechanisms
//!
//! Implements the wire-level pieces of SASL PLAIN and LOGIN — decoding
//! the base64 exchanges — and authenticates the decoded credentials
//! against the shared [`UserStore`](crate::storage::UserStore).
//!
//! # Security
//! - Passwords are never compared in cleartext; [`UserStore`] hashes
//!   with Argon2 and compares hashes.
//! - AUTH is only reachable after STARTTLS when TLS is configured
//!   (enforced by the SMTP session, not by this module).

use crate::error::{MailError, Result};
use crate::storage::UserStore;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use tracing::{debug, warn};

/// SASL mechanisms this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    /// PLAIN mechanism (RFC 4616)
    Plain,
    /// LOGIN mechanism
    Login,
}

impl AuthMechanism {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            _ => None,
        }
    }
}

/// Authenticates SASL credentials against the user store.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<UserStore>,
}

impl Authenticator {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self { store }
    }

    /// Check a username/password pair. Unknown users fail closed rather
    /// than propagating `UserNotFound`.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        debug!("authentication attempt for {}", username);
        match self.store.verify_password(username, password) {
            Ok(ok) => Ok(ok),
            Err(MailError::UserNotFound(_)) => {
                warn!("authentication failed: user not found: {}", username);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Decode `AUTH PLAIN` payload: base64(`\0username\0password`).
    pub fn decode_plain_auth(auth_data: &str) -> Result<(String, String)> {
        let decoded = BASE64
            .decode(auth_data.trim())
            .map_err(|e| MailError::SmtpProtocol(format!("Invalid base64: {}", e)))?;

        let parts: Vec<&str> = std::str::from_utf8(&decoded)
            .map_err(|e| MailError::SmtpProtocol(format!("Invalid UTF-8: {}", e)))?
            .split('\0')
            .collect();

        if parts.len() != 3 {
            return Err(MailError::SmtpProtocol(
                "Invalid PLAIN auth format".to_string(),
            ));
        }

        Ok((parts[1].to_string(), parts[2].to_string()))
    }

    /// Decode one base64 line of the `AUTH LOGIN` username/password exchange.
    pub fn decode_login_credential(credential: &str) -> Result<String> {
        let decoded = BASE64
            .decode(credential.trim())
            .map_err(|e| MailError::SmtpProtocol(format!("Invalid base64: {}", e)))?;

        String::from_utf8(decoded)
            .map_err(|e| MailError::SmtpProtocol(format!("Invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_user() -> Arc<UserStore> {
        let store = Arc::new(UserStore::new());
        store
            .insert("oliver", "oliver123", "oliver@localhost", vec![])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn authenticate_accepts_correct_password() {
        let auth = Authenticator::new(store_with_user());
        assert!(auth.authenticate("oliver", "oliver123").await.unwrap());
        assert!(!auth.authenticate("oliver", "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn authenticate_unknown_user_fails_closed() {
        let auth = Authenticator::new(store_with_user());
        assert!(!auth.authenticate("nobody", "x").await.unwrap());
    }

    #[test]
    fn decode_plain_auth_splits_three_parts() {
        let auth_data = BASE64.encode(b"\0oliver\0oliver123");
        let (user, pass) = Authenticator::decode_plain_auth(&auth_data).unwrap();
        assert_eq!(user, "oliver");
        assert_eq!(pass, "oliver123");
    }

    #[test]
    fn decode_plain_auth_rejects_wrong_part_count() {
        let auth_data = BASE64.encode(b"oliver\0oliver123");
        assert!(Authenticator::decode_plain_auth(&auth_data).is_err());
    }

    #[test]
    fn auth_mechanism_from_str_is_case_insensitive() {
        assert_eq!(AuthMechanism::from_str("plain"), Some(AuthMechanism::Plain));
        assert_eq!(AuthMechanism::from_str("LOGIN"), Some(AuthMechanism::Login));
        assert_eq!(AuthMechanism::from_str("bogus"), None);
    }
}
