//! In-memory mailbox and user stores
//!
//! - [`user`]: user directory, looked up by name or declared email
//! - [`mail`]: per-user mailboxes and the mail delivered into them

pub mod mail;
pub mod user;

pub use mail::{Mail, MailStore, Mailbox};
pub use user::{User, UserStore};
