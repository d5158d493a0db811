//! In-memory user store
//!
//! Maps user names to user records and answers lookups by any of a
//! user's declared email addresses. There is no persistence: the store
//! lives for the lifetime of the process, matching the deliberately
//! pluggable storage interface the protocol engines are built against.

use crate::error::{MailError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// A registered mail user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub password_hash: String,
    pub primary_email: String,
    pub emails: Vec<String>,
}

impl User {
    /// All addresses this user answers to (primary plus any aliases).
    fn all_emails(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_email.as_str()).chain(self.emails.iter().map(String::as_str))
    }
}

#[derive(Default)]
struct Inner {
    by_name: HashMap<String, User>,
}

/// Shared, mutex-guarded user directory.
pub struct UserStore {
    inner: Mutex<Inner>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a new user. Assigns a fresh identifier and hashes the
    /// supplied password before storing it; a second insert under the
    /// same name fails with `UserAlreadyExists`.
    pub fn insert(
        &self,
        name: &str,
        password: &str,
        primary_email: &str,
        emails: Vec<String>,
    ) -> Result<User> {
        let mut inner = self.inner.lock().unwrap();

        if inner.by_name.contains_key(name) {
            return Err(MailError::UserAlreadyExists(name.to_string()));
        }

        let password_hash = hash_password(password)?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            password_hash,
            primary_email: primary_email.to_string(),
            emails,
        };

        inner.by_name.insert(name.to_string(), user.clone());
        Ok(user)
    }

    pub fn get_by_name(&self, name: &str) -> Result<User> {
        self.inner
            .lock()
            .unwrap()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| MailError::UserNotFound(name.to_string()))
    }

    /// Look up a user by any of their declared email addresses
    /// (primary or alias), matched case-insensitively.
    pub fn get_by_email(&self, email: &str) -> Result<User> {
        let needle = email.to_lowercase();
        self.inner
            .lock()
            .unwrap()
            .by_name
            .values()
            .find(|u| u.all_emails().any(|e| e.to_lowercase() == needle))
            .cloned()
            .ok_or_else(|| MailError::UserNotFound(email.to_string()))
    }

    pub fn exists_by_email(&self, email: &str) -> bool {
        self.get_by_email(email).is_ok()
    }

    /// Verify a cleartext password against the stored hash for `name`.
    pub fn verify_password(&self, name: &str, password: &str) -> Result<bool> {
        let user = self.get_by_name(name)?;
        Ok(verify_password(&user.password_hash, password))
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| MailError::Config(format!("failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_oliver() -> UserStore {
        let store = UserStore::new();
        store
            .insert("oliver", "oliver123", "oliver@localhost", vec![])
            .unwrap();
        store
    }

    #[test]
    fn insert_then_get_by_name_round_trips() {
        let store = store_with_oliver();
        let user = store.get_by_name("oliver").unwrap();
        assert_eq!(user.primary_email, "oliver@localhost");
        assert_ne!(user.password_hash, "oliver123");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let store = store_with_oliver();
        let err = store
            .insert("oliver", "other", "oliver2@localhost", vec![])
            .unwrap_err();
        assert!(matches!(err, MailError::UserAlreadyExists(_)));
    }

    #[test]
    fn lookup_by_alias_email_succeeds() {
        let store = UserStore::new();
        store
            .insert(
                "oliver",
                "pw",
                "oliver@localhost",
                vec!["o@localhost".to_string()],
            )
            .unwrap();

        let user = store.get_by_email("O@LOCALHOST").unwrap();
        assert_eq!(user.name, "oliver");
    }

    #[test]
    fn password_verification() {
        let store = store_with_oliver();
        assert!(store.verify_password("oliver", "oliver123").unwrap());
        assert!(!store.verify_password("oliver", "wrong").unwrap());
    }
}
