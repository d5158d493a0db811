//! mail-rs: a small SMTP/IMAP mail server
//!
//! Accepts mail over SMTP (RFC 5321), relays outgoing submissions to
//! recipients' mail exchangers, and offers a minimal IMAP front-end for
//! authentication. Storage is in-memory only — there is no durable
//! mailbox format.
//!
//! # Example
//!
//! ```no_run
//! use mail_rs::config::Config;
//! use mail_rs::smtp::SmtpServer;
//! use mail_rs::storage::{MailStore, UserStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let user_store = Arc::new(UserStore::new());
//!     let mail_store = Arc::new(MailStore::new());
//!
//!     let server = SmtpServer::new(config, user_store, mail_store, None, None);
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: configuration loading
//! - [`error`]: error types
//! - [`smtp`]: SMTP protocol server and outbound client
//! - [`imap`]: minimal IMAP front-end
//! - [`authentication`]: DKIM signing
//! - [`security`]: SASL auth mechanisms and TLS
//! - [`storage`]: in-memory user and mail stores
//! - [`utils`]: email address parsing, DNS

pub mod authentication;
pub mod config;
pub mod error;
pub mod imap;
pub mod security;
pub mod smtp;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{MailError, Result};
