//! IMAP server implementation
//!
//! Handles TCP connections and IMAP protocol

use crate::config::Config;
use crate::error::Result;
use crate::imap::session::ImapSession;
use crate::security::tls::TlsConfig;
use crate::storage::UserStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// IMAP front-end server
pub struct ImapServer {
    config: Config,
    user_store: Arc<UserStore>,
    tls_config: Option<Arc<TlsConfig>>,
}

impl ImapServer {
    pub fn new(config: Config, user_store: Arc<UserStore>, tls_config: Option<Arc<TlsConfig>>) -> Self {
        Self {
            config,
            user_store,
            tls_config,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.imap.listen_addr).await?;
        info!("IMAP server listening on {}", self.config.imap.listen_addr);

        if self.tls_config.is_some() {
            info!("STARTTLS support enabled");
        }

        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("new IMAP connection from {}", addr);

                    let session = ImapSession::new(self.tls_config.clone(), self.user_store.clone());

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
