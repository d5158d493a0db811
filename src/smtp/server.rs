use crate::authentication::dkim::DkimSigner;
use crate::config::Config;
use crate::error::Result;
use crate::security::tls::TlsConfig;
use crate::smtp::client::SmtpClient;
use crate::smtp::session::SmtpSession;
use crate::storage::{MailStore, UserStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub struct SmtpServer {
    config: Config,
    user_store: Arc<UserStore>,
    mail_store: Arc<MailStore>,
    tls_config: Option<Arc<TlsConfig>>,
    dkim_signer: Option<Arc<DkimSigner>>,
}

impl SmtpServer {
    pub fn new(
        config: Config,
        user_store: Arc<UserStore>,
        mail_store: Arc<MailStore>,
        tls_config: Option<Arc<TlsConfig>>,
        dkim_signer: Option<Arc<DkimSigner>>,
    ) -> Self {
        Self {
            config,
            user_store,
            mail_store,
            tls_config,
            dkim_signer,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.smtp.listen_addr).await?;
        info!("SMTP server listening on {}", self.config.smtp.listen_addr);

        if self.tls_config.is_some() {
            info!("STARTTLS support enabled");
        }
        if self.dkim_signer.is_some() {
            info!("outgoing mail will be DKIM-signed");
        }

        let outbound_client = Arc::new(SmtpClient::new(
            self.config.server.hostname.clone(),
            self.dkim_signer.clone(),
        ));

        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("new SMTP connection from {}", addr);

                    let session = SmtpSession::new(
                        self.config.server.hostname.clone(),
                        addr.to_string(),
                        self.tls_config.clone(),
                        self.user_store.clone(),
                        self.mail_store.clone(),
                        outbound_client.clone(),
                    );

                    tokio::spawn(async move {
                        if let Err(e) = session.handle(socket).await {
                            warn!("session with {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            }
        }
    }
}
