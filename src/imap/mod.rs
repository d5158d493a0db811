//! IMAP front-end
//!
//! A minimal RFC 9051 greeting/AUTH/STARTTLS front-end. There is no
//! mailbox access surface (SELECT/FETCH/STORE/IDLE); delivered mail
//! lives in the shared mail store reached through SMTP.

pub mod server;
pub mod session;

pub use server::ImapServer;
pub use session::ImapSession;
