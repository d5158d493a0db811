//! Security module
//!
//! - [`auth`]: SASL authentication mechanisms (LOGIN, PLAIN)
//! - [`tls`]: TLS/STARTTLS configuration and handling

pub mod auth;
pub mod tls;

pub use auth::{AuthMechanism, Authenticator};
pub use tls::TlsConfig;
