//! SMTP server and client implementation (RFC 5321)
//!
//! - [`server`]: SMTP server accepting incoming mail
//! - [`client`]: one-shot outbound SMTP client
//! - [`session`]: SMTP session state machine
//! - [`commands`]: SMTP command parsing
//! - [`codes`]: response status lines

pub mod client;
pub mod codes;
pub mod commands;
pub mod server;
pub mod session;

pub use client::SmtpClient;
pub use commands::SmtpCommand;
pub use server::SmtpServer;
pub use session::SmtpSession;
