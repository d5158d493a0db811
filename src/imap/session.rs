//! IMAP front-end session (minimal stub)
//!
//! Enough of RFC 9051 to greet, negotiate STARTTLS, authenticate with
//! SASL PLAIN, and log out. There is no mailbox access surface here
//! (SELECT/FETCH/STORE/IDLE and friends) — delivered mail is reached
//! through the SMTP/mail-store layer, not this front-end.

use crate::error::Result;
use crate::security::auth::Authenticator;
use crate::security::tls::TlsConfig;
use crate::storage::UserStore;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tracing::{debug, info};

enum ImapStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Upgrading,
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ImapStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ImapStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
            ImapStream::Upgrading => panic!("I/O on ImapStream during STARTTLS upgrade"),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ImapStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ImapStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
            ImapStream::Upgrading => panic!("I/O on ImapStream during STARTTLS upgrade"),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ImapStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ImapStream::Tls(s) => Pin::new(s).poll_flush(cx),
            ImapStream::Upgrading => panic!("I/O on ImapStream during STARTTLS upgrade"),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ImapStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ImapStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
            ImapStream::Upgrading => panic!("I/O on ImapStream during STARTTLS upgrade"),
        }
    }
}

pub struct ImapSession {
    tls_config: Option<Arc<TlsConfig>>,
    tls_active: bool,
    authenticator: Authenticator,
    authenticated_user: Option<String>,
}

impl ImapSession {
    pub fn new(tls_config: Option<Arc<TlsConfig>>, user_store: Arc<UserStore>) -> Self {
        Self {
            tls_config,
            tls_active: false,
            authenticator: Authenticator::new(user_store),
            authenticated_user: None,
        }
    }

    pub async fn handle(mut self, stream: TcpStream) -> Result<()> {
        let mut imap_stream = ImapStream::Plain(stream);
        imap_stream
            .write_all(b"* OK IMAP4rev2 Service Ready\r\n")
            .await?;

        loop {
            let mut buf_reader = BufReader::new(&mut imap_stream);
            let mut line = String::new();
            let n = buf_reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(());
            }

            let line = line.trim_end_matches(['\r', '\n']);
            debug!("C: {}", line);

            let mut parts = line.splitn(3, ' ');
            let tag = parts.next().unwrap_or("*");
            let command = parts.next().unwrap_or("").to_uppercase();
            let rest = parts.next().unwrap_or("");

            match command.as_str() {
                "CAPABILITY" => {
                    buf_reader
                        .write_all(b"* CAPABILITY IMAP4rev2 STARTTLS AUTH=PLAIN UTF8=ACCEPT\r\n")
                        .await?;
                    buf_reader
                        .write_all(format!("{} OK CAPABILITY completed\r\n", tag).as_bytes())
                        .await?;
                }
                "STARTTLS" => {
                    let Some(tls_config) = self.tls_config.clone() else {
                        buf_reader
                            .write_all(format!("{} BAD STARTTLS not available\r\n", tag).as_bytes())
                            .await?;
                        continue;
                    };
                    if self.tls_active {
                        buf_reader
                            .write_all(format!("{} BAD already using TLS\r\n", tag).as_bytes())
                            .await?;
                        continue;
                    }

                    buf_reader
                        .write_all(format!("{} OK begin TLS negotiation\r\n", tag).as_bytes())
                        .await?;
                    drop(buf_reader);

                    let tcp = match std::mem::replace(&mut imap_stream, ImapStream::Upgrading) {
                        ImapStream::Plain(tcp) => tcp,
                        _ => {
                            return Err(crate::error::MailError::Tls(
                                "stream not plain at STARTTLS".to_string(),
                            ))
                        }
                    };
                    let acceptor = tls_config.acceptor();
                    let tls_stream = acceptor.accept(tcp).await.map_err(|e| {
                        crate::error::MailError::Tls(format!("handshake failed: {}", e))
                    })?;
                    imap_stream = ImapStream::Tls(Box::new(tls_stream));
                    self.tls_active = true;
                    continue;
                }
                "AUTHENTICATE" if rest.eq_ignore_ascii_case("PLAIN") => {
                    if self.tls_config.is_some() && !self.tls_active {
                        buf_reader
                            .write_all(format!("{} NO TLS required first\r\n", tag).as_bytes())
                            .await?;
                        continue;
                    }

                    buf_reader.write_all(b"+ \r\n").await?;
                    let mut resp_line = String::new();
                    buf_reader.read_line(&mut resp_line).await?;
                    let resp_line = resp_line.trim();

                    let decoded = BASE64.decode(resp_line).ok();
                    let credentials = decoded.and_then(|bytes| {
                        let text = String::from_utf8(bytes).ok()?;
                        let mut parts = text.split('\0');
                        let _authzid = parts.next()?;
                        let username = parts.next()?.to_string();
                        let password = parts.next()?.to_string();
                        Some((username, password))
                    });

                    match credentials {
                        Some((username, password)) => {
                            if self.authenticator.authenticate(&username, &password).await? {
                                self.authenticated_user = Some(username.clone());
                                info!("IMAP authenticated as {}", username);
                                buf_reader
                                    .write_all(format!("{} OK AUTHENTICATE completed\r\n", tag).as_bytes())
                                    .await?;
                            } else {
                                buf_reader
                                    .write_all(format!("{} NO authentication failed\r\n", tag).as_bytes())
                                    .await?;
                            }
                        }
                        None => {
                            buf_reader
                                .write_all(format!("{} NO invalid base64\r\n", tag).as_bytes())
                                .await?;
                        }
                    }
                }
                "NOOP" => {
                    buf_reader
                        .write_all(format!("{} OK NOOP completed\r\n", tag).as_bytes())
                        .await?;
                }
                "LOGOUT" => {
                    buf_reader.write_all(b"* BYE IMAP4rev2 Server logging out\r\n").await?;
                    buf_reader
                        .write_all(format!("{} OK LOGOUT completed\r\n", tag).as_bytes())
                        .await?;
                    return Ok(());
                }
                _ => {
                    buf_reader
                        .write_all(format!("{} BAD command unrecognized\r\n", tag).as_bytes())
                        .await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_oliver() -> Arc<UserStore> {
        let store = Arc::new(UserStore::new());
        store.insert("oliver", "oliver123", "oliver@mail.local", vec![]).unwrap();
        store
    }

    #[test]
    fn session_starts_without_tls_active() {
        let session = ImapSession::new(None, store_with_oliver());
        assert!(!session.tls_active);
        assert!(session.authenticated_user.is_none());
    }
}
