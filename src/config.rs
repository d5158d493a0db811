use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub imap: ImapConfig,
    pub dkim: DkimConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// The hostname this server identifies itself as (EHLO/HELO greeting,
    /// and the domain compared against MAIL FROM to decide submission vs. delivery).
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub listen_addr: String,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImapConfig {
    pub listen_addr: String,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DkimConfig {
    pub selector: String,
    pub private_key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MailError::Config(e.to_string()))?;

        toml::from_str(&content)
            .map_err(|e| crate::error::MailError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig {
                hostname: "mail.localhost".to_string(),
            },
            smtp: SmtpConfig {
                listen_addr: "0.0.0.0:2525".to_string(),
                tls_cert_path: None,
                tls_key_path: None,
            },
            imap: ImapConfig {
                listen_addr: "0.0.0.0:1993".to_string(),
                tls_cert_path: None,
                tls_key_path: None,
            },
            dkim: DkimConfig {
                selector: "mail".to_string(),
                private_key_path: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_tls_or_dkim() {
        let config = Config::default();
        assert!(config.smtp.tls_cert_path.is_none());
        assert!(config.dkim.private_key_path.is_none());
        assert_eq!(config.dkim.selector, "mail");
    }

    #[test]
    fn from_file_round_trips_toml() {
        let toml_str = r#"
            [server]
            hostname = "example.com"

            [smtp]
            listen_addr = "0.0.0.0:25"

            [imap]
            listen_addr = "0.0.0.0:993"

            [dkim]
            selector = "mail"

            [logging]
            level = "debug"
        "#;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_str).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.hostname, "example.com");
        assert_eq!(config.logging.level, "debug");
    }
}
