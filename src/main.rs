use mail_rs::authentication::dkim::DkimSigner;
use mail_rs::config::Config;
use mail_rs::imap::ImapServer;
use mail_rs::security::tls::TlsConfig;
use mail_rs::smtp::SmtpServer;
use mail_rs::storage::{MailStore, UserStore};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = if std::path::Path::new("config.toml").exists() {
        Config::from_file("config.toml")?
    } else {
        Config::default()
    };

    let level = match config.logging.level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    info!("starting mail-rs server");
    info!("hostname: {}", config.server.hostname);
    info!("SMTP listening on: {}", config.smtp.listen_addr);
    info!("IMAP listening on: {}", config.imap.listen_addr);

    let user_store = Arc::new(UserStore::new());
    let mail_store = Arc::new(MailStore::new());

    user_store.insert(
        "demo",
        "demo-password",
        &format!("demo@{}", config.server.hostname),
        vec![],
    )?;

    let smtp_tls = match (&config.smtp.tls_cert_path, &config.smtp.tls_key_path) {
        (Some(cert), Some(key)) => Some(Arc::new(TlsConfig::from_pem_files(cert, key)?)),
        _ => None,
    };
    let imap_tls = match (&config.imap.tls_cert_path, &config.imap.tls_key_path) {
        (Some(cert), Some(key)) => Some(Arc::new(TlsConfig::from_pem_files(cert, key)?)),
        _ => None,
    };

    let dkim_signer = match &config.dkim.private_key_path {
        Some(path) => Some(Arc::new(DkimSigner::new(
            config.server.hostname.clone(),
            config.dkim.selector.clone(),
            std::path::Path::new(path),
        )?)),
        None => {
            warn!("no DKIM private key configured, outgoing mail will not be signed");
            None
        }
    };

    let smtp_server = SmtpServer::new(
        config.clone(),
        user_store.clone(),
        mail_store.clone(),
        smtp_tls,
        dkim_signer,
    );
    let imap_server = ImapServer::new(config.clone(), user_store.clone(), imap_tls);

    let smtp_handle = tokio::spawn(async move {
        if let Err(e) = smtp_server.run().await {
            warn!("SMTP server exited with error: {}", e);
        }
    });
    let imap_handle = tokio::spawn(async move {
        if let Err(e) = imap_server.run().await {
            warn!("IMAP server exited with error: {}", e);
        }
    });

    let _ = tokio::try_join!(smtp_handle, imap_handle)?;

    Ok(())
}
