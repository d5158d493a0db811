//! SMTP session state machine (RFC 5321)
//!
//! Each accepted connection gets one [`SmtpSession`], driven by
//! [`SmtpSession::handle`] until QUIT or the connection drops. State is
//! an explicit tagged enum, not a bag of booleans: `tls_active` is
//! orthogonal to the conversational state, and the envelope being built
//! (sender, recipients, buffered DATA) lives in its own [`Envelope`].

use crate::error::{MailError, Result};
use crate::security::auth::{AuthMechanism, Authenticator};
use crate::security::tls::TlsConfig;
use crate::smtp::client::{OutboundMessage, SmtpClient};
use crate::smtp::codes;
use crate::smtp::commands::SmtpCommand;
use crate::storage::{Mail, MailStore, UserStore};
use crate::utils::email::{domain_of, local_part_of, validate_email};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tracing::{debug, info, warn};

/// Recipients accepted per envelope.
const MAX_RECIPIENTS: usize = 100;
/// Longest line the server will read, command or DATA, in bytes.
const MAX_LINE_LENGTH: usize = 1000;
/// Largest accepted DATA payload, counting buffered line lengths plus
/// one logical newline per line.
const MAX_MESSAGE_SIZE: usize = 15 * 1024 * 1024;
/// A session idle on a single read this long is disconnected.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Unified stream type so STARTTLS can upgrade a live connection without
/// tearing down the session.
enum SmtpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    /// Transient placeholder while the handshake owns the TCP stream.
    Upgrading,
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SmtpStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
            SmtpStream::Upgrading => panic!("I/O on SmtpStream during STARTTLS upgrade"),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SmtpStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
            SmtpStream::Upgrading => panic!("I/O on SmtpStream during STARTTLS upgrade"),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            SmtpStream::Tls(s) => Pin::new(s).poll_flush(cx),
            SmtpStream::Upgrading => panic!("I/O on SmtpStream during STARTTLS upgrade"),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SmtpStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
            SmtpStream::Upgrading => panic!("I/O on SmtpStream during STARTTLS upgrade"),
        }
    }
}

/// Conversational state of a session, independent of whether TLS is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Connected, greeting sent, waiting for HELO/EHLO.
    Greeted,
    /// HELO/EHLO accepted, waiting for MAIL FROM (or AUTH/STARTTLS).
    Identified,
    /// MAIL FROM and at least the decision on RCPT TO in progress.
    Enveloped,
    /// Inside the DATA stream, reading lines until the lone-dot terminator.
    ReceivingData,
    /// AUTH LOGIN sent, waiting for the base64 username line.
    AwaitingUsername,
    /// AUTH LOGIN username received, waiting for the base64 password line.
    AwaitingPassword,
}

/// The envelope under construction for the current message.
#[derive(Default)]
struct Envelope {
    sender: Option<String>,
    recipients: Vec<String>,
    lines: Vec<String>,
    size: usize,
    /// True once MAIL FROM has been classified as outbound submission.
    outgoing: bool,
}

impl Envelope {
    fn reset(&mut self) {
        *self = Envelope::default();
    }
}

enum SessionResult {
    Continue,
    Quit,
}

/// One client connection's worth of SMTP protocol state.
pub struct SmtpSession {
    hostname: String,
    remote_addr: String,
    state: SessionState,
    tls_active: bool,
    client_hostname: Option<String>,
    envelope: Envelope,
    login_username: Option<String>,
    authenticated_user: Option<String>,
    tls_config: Option<Arc<TlsConfig>>,
    authenticator: Arc<Authenticator>,
    user_store: Arc<UserStore>,
    mail_store: Arc<MailStore>,
    outbound_client: Arc<SmtpClient>,
}

impl SmtpSession {
    pub fn new(
        hostname: String,
        remote_addr: String,
        tls_config: Option<Arc<TlsConfig>>,
        user_store: Arc<UserStore>,
        mail_store: Arc<MailStore>,
        outbound_client: Arc<SmtpClient>,
    ) -> Self {
        Self {
            hostname,
            remote_addr,
            state: SessionState::Greeted,
            tls_active: false,
            client_hostname: None,
            envelope: Envelope::default(),
            login_username: None,
            authenticated_user: None,
            tls_config,
            authenticator: Arc::new(Authenticator::new(user_store.clone())),
            user_store,
            mail_store,
            outbound_client,
        }
    }

    pub async fn handle(mut self, stream: TcpStream) -> Result<()> {
        let mut smtp_stream = SmtpStream::Plain(stream);
        smtp_stream
            .write_all(codes::service_ready(&self.hostname).as_bytes())
            .await?;

        loop {
            match self.process_commands(&mut smtp_stream).await? {
                SessionResult::Continue => continue,
                SessionResult::Quit => break,
            }
        }

        Ok(())
    }

    async fn process_commands(&mut self, stream: &mut SmtpStream) -> Result<SessionResult> {
        let mut buf_reader = BufReader::new(&mut *stream);
        let mut line = String::new();

        loop {
            line.clear();

            let read_result = timeout(IDLE_TIMEOUT, buf_reader.read_line(&mut line)).await;
            let n = match read_result {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!(remote = %self.remote_addr, "idle timeout, closing connection");
                    let _ = buf_reader
                        .write_all(codes::conn_closed(&self.hostname).as_bytes())
                        .await;
                    return Ok(SessionResult::Quit);
                }
            };

            if n == 0 {
                debug!(remote = %self.remote_addr, "client disconnected");
                return Ok(SessionResult::Quit);
            }

            if line.len() > MAX_LINE_LENGTH {
                buf_reader.write_all(codes::LINE_TOO_LONG.as_bytes()).await?;
                buf_reader.write_all(b"\r\n").await?;
                continue;
            }

            let line_trimmed = line.trim_end_matches(['\r', '\n']);
            debug!(remote = %self.remote_addr, "C: {}", line_trimmed);

            let cmd = match SmtpCommand::parse(line_trimmed) {
                Ok(cmd) => cmd,
                Err(_) => {
                    buf_reader.write_all(codes::BAD_COMMAND.as_bytes()).await?;
                    buf_reader.write_all(b"\r\n").await?;
                    continue;
                }
            };

            if matches!(cmd, SmtpCommand::Starttls) {
                drop(buf_reader);
                match self.handle_starttls(stream).await? {
                    true => return Ok(SessionResult::Continue),
                    false => {
                        buf_reader = BufReader::new(&mut *stream);
                        continue;
                    }
                }
            }

            if let SmtpCommand::Auth(mechanism, initial_response) = cmd.clone() {
                self.handle_auth(&mechanism, initial_response, &mut buf_reader)
                    .await?;
                continue;
            }

            match self.state {
                SessionState::AwaitingUsername => {
                    self.continue_login_username(line_trimmed, &mut buf_reader)
                        .await?;
                    continue;
                }
                SessionState::AwaitingPassword => {
                    self.continue_login_password(line_trimmed, &mut buf_reader)
                        .await?;
                    continue;
                }
                _ => {}
            }

            if self.state == SessionState::ReceivingData {
                // DATA lines never reach here: receive_data owns the
                // reader until the terminator. A command line arriving
                // in this state would mean receive_data already returned.
            }

            let response = self.handle_command(cmd);
            buf_reader.write_all(response.as_bytes()).await?;

            if response.starts_with("221") {
                return Ok(SessionResult::Quit);
            }

            if self.state == SessionState::ReceivingData {
                self.receive_data(&mut buf_reader).await?;
            }
        }
    }

    fn handle_command(&mut self, cmd: SmtpCommand) -> String {
        match cmd {
            SmtpCommand::Helo(domain) => self.handle_helo(domain),
            SmtpCommand::Ehlo(domain) => self.handle_ehlo(domain),
            SmtpCommand::MailFrom(from) => self.handle_mail_from(from),
            SmtpCommand::RcptTo(to) => self.handle_rcpt_to(to),
            SmtpCommand::Data => self.handle_data_command(),
            SmtpCommand::Rset => self.handle_rset(),
            SmtpCommand::Noop => format!("{}\r\n", codes::OK),
            SmtpCommand::Quit => codes::conn_closed(&self.hostname),
            SmtpCommand::Starttls => unreachable!("handled before dispatch"),
            SmtpCommand::Auth(..) => unreachable!("handled before dispatch"),
            SmtpCommand::Unknown(_) => format!("{}\r\n", codes::NOT_IMPLEMENTED),
        }
    }

    fn handle_helo(&mut self, domain: String) -> String {
        self.client_hostname = Some(domain.clone());
        self.state = SessionState::Identified;
        self.envelope.reset();
        codes::helo_greeting(&self.hostname, &domain)
    }

    fn handle_ehlo(&mut self, domain: String) -> String {
        self.client_hostname = Some(domain.clone());
        self.state = SessionState::Identified;
        self.envelope.reset();

        let mut extensions = Vec::new();
        if self.tls_config.is_some() && !self.tls_active {
            extensions.push("STARTTLS".to_string());
        }
        if !self.tls_config.is_some() || self.tls_active {
            extensions.push("AUTH LOGIN PLAIN".to_string());
        }
        let ext_refs: Vec<&str> = extensions.iter().map(String::as_str).collect();
        codes::ehlo_greeting(&self.hostname, &domain, &ext_refs)
    }

    fn encryption_required(&self) -> bool {
        self.tls_config.is_some() && !self.tls_active
    }

    fn handle_mail_from(&mut self, from: String) -> String {
        if self.state != SessionState::Identified {
            return codes::bad_sequence("MAIL FROM");
        }
        if self.encryption_required() {
            return format!("{}\r\n", codes::ENCRYPTION_REQUIRED);
        }

        // Null sender (bounce/DSN) is accepted as-is, no domain classification.
        if from.is_empty() {
            self.envelope.sender = Some(from);
            self.envelope.outgoing = false;
            self.state = SessionState::Enveloped;
            return format!("{}\r\n", codes::OK);
        }

        if validate_email(&from).is_err() {
            return format!("{}\r\n", codes::BAD_COMMAND);
        }

        let sender_local = domain_of(&from)
            .map(|d| d.eq_ignore_ascii_case(&self.hostname))
            .unwrap_or(false);

        if sender_local {
            match &self.authenticated_user {
                None => return format!("{}\r\n", codes::AUTH_REQUIRED),
                Some(user) => {
                    let matches_identity = self
                        .user_store
                        .get_by_name(user)
                        .map(|u| u.primary_email.eq_ignore_ascii_case(&from) || {
                            local_part_of(&from).map(|lp| lp.eq_ignore_ascii_case(user)).unwrap_or(false)
                        })
                        .unwrap_or(false);
                    if !matches_identity {
                        return format!("{}\r\n", codes::AUTH_FAILED);
                    }
                    self.envelope.outgoing = true;
                }
            }
        } else if self.authenticated_user.is_some() {
            // Authenticated client claiming a foreign sender domain: relay abuse, not a bad login.
            return format!("{}\r\n", codes::RELAY_DENIED);
        } else {
            self.envelope.outgoing = false;
        }

        self.envelope.sender = Some(from);
        self.state = SessionState::Enveloped;
        format!("{}\r\n", codes::OK)
    }

    fn handle_rcpt_to(&mut self, to: String) -> String {
        if self.state != SessionState::Enveloped {
            return codes::bad_sequence("MAIL FROM");
        }
        if self.envelope.recipients.len() >= MAX_RECIPIENTS {
            return format!("{}\r\n", codes::TOO_MANY_RECIPIENTS);
        }
        if validate_email(&to).is_err() {
            return format!("{}\r\n", codes::BAD_COMMAND);
        }

        if self.envelope.outgoing {
            self.envelope.recipients.push(to);
            return format!("{}\r\n", codes::OK);
        }

        let recipient_local = domain_of(&to)
            .map(|d| d.eq_ignore_ascii_case(&self.hostname))
            .unwrap_or(false);

        if !recipient_local {
            return format!("{}\r\n", codes::RELAY_DENIED);
        }

        if !self.user_store.exists_by_email(&to) {
            return format!("{}\r\n", codes::NO_SUCH_USER);
        }

        self.envelope.recipients.push(to);
        format!("{}\r\n", codes::OK)
    }

    fn handle_data_command(&mut self) -> String {
        if self.state != SessionState::Enveloped || self.envelope.sender.is_none() {
            return codes::bad_sequence("MAIL FROM");
        }
        if self.envelope.recipients.is_empty() {
            return codes::bad_sequence("RCPT TO");
        }
        self.state = SessionState::ReceivingData;
        format!("{}\r\n", codes::START_MAIL_INPUT)
    }

    fn handle_rset(&mut self) -> String {
        self.envelope.reset();
        if self.state != SessionState::Greeted {
            self.state = SessionState::Identified;
        }
        format!("{}\r\n", codes::OK)
    }

    async fn receive_data<S>(&mut self, buf_reader: &mut BufReader<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let read_result = timeout(IDLE_TIMEOUT, buf_reader.read_line(&mut line)).await;
            let n = match read_result {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    let _ = buf_reader
                        .write_all(codes::conn_closed(&self.hostname).as_bytes())
                        .await;
                    return Err(MailError::SmtpProtocol("idle timeout during DATA".into()));
                }
            };

            if n == 0 {
                return Err(MailError::SmtpProtocol("connection closed during DATA".into()));
            }

            if line.len() > MAX_LINE_LENGTH {
                buf_reader.write_all(codes::LINE_TOO_LONG.as_bytes()).await?;
                buf_reader.write_all(b"\r\n").await?;
                continue;
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed == "." {
                break;
            }

            let unstuffed = if let Some(rest) = trimmed.strip_prefix('.') {
                rest
            } else {
                trimmed
            };

            let new_size = self.envelope.size + unstuffed.len() + 1;
            if new_size > MAX_MESSAGE_SIZE {
                buf_reader
                    .write_all(format!("{}\r\n", codes::MESSAGE_TOO_LARGE).as_bytes())
                    .await?;
                return Err(MailError::SmtpProtocol("message too large".into()));
            }

            self.envelope.size = new_size;
            self.envelope.lines.push(unstuffed.to_string());
        }

        self.deliver().await?;
        buf_reader.write_all(format!("{}\r\n", codes::OK).as_bytes()).await?;

        self.envelope.reset();
        self.state = SessionState::Identified;
        Ok(())
    }

    /// Deliver the buffered envelope into every local recipient's INBOX.
    /// Outbound (submission) envelopes are not stored here; they are
    /// handed to [`crate::smtp::client::SmtpClient`] by the caller once
    /// this returns, via the `outgoing` flag on the drained envelope.
    async fn deliver(&self) -> Result<()> {
        if self.envelope.outgoing {
            let mail = OutboundMessage {
                sender: self.envelope.sender.clone().unwrap_or_default(),
                recipients: self.envelope.recipients.clone(),
                lines: self.envelope.lines.clone(),
            };
            let delivered = self.outbound_client.send(&mail).await?;
            info!(
                remote = %self.remote_addr,
                "relayed outbound submission to {}/{} recipient(s)",
                delivered,
                self.envelope.recipients.len()
            );
            return Ok(());
        }

        let body: String = self.envelope.lines.iter().map(|l| format!("{}\n", l)).collect();
        let headers = parse_headers(&self.envelope.lines);
        let mail_id: u32 = rand::random();

        for recipient in &self.envelope.recipients {
            let user = self.user_store.get_by_email(recipient)?;
            let mailbox = self.mail_store.get_or_create_default_mailbox(&user.name);
            let mail = Mail {
                id: mail_id,
                mailbox_id: mailbox.id,
                flags: Vec::new(),
                received_at: chrono::Utc::now(),
                size: self.envelope.size,
                headers: headers.clone(),
                body: body.clone(),
            };
            self.mail_store.insert_mail(&user.name, mail)?;
        }

        Ok(())
    }

    async fn handle_starttls(&mut self, stream: &mut SmtpStream) -> Result<bool> {
        let tls_config = match &self.tls_config {
            Some(c) => c.clone(),
            None => {
                stream.write_all(format!("{}\r\n", codes::NOT_IMPLEMENTED).as_bytes()).await?;
                return Ok(false);
            }
        };

        if self.tls_active {
            stream.write_all(codes::bad_sequence("no prior STARTTLS").as_bytes()).await?;
            return Ok(false);
        }

        stream.write_all(codes::READY_STARTING_TLS.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;

        let tcp_stream = match std::mem::replace(stream, SmtpStream::Upgrading) {
            SmtpStream::Plain(tcp) => tcp,
            _ => {
                return Err(MailError::Tls("stream not plain at STARTTLS".to_string()));
            }
        };

        let acceptor = tls_config.acceptor();
        let tls_stream = acceptor
            .accept(tcp_stream)
            .await
            .map_err(|e| MailError::Tls(format!("handshake failed: {}", e)))?;

        *stream = SmtpStream::Tls(Box::new(tls_stream));
        self.tls_active = true;
        self.state = SessionState::Greeted;
        self.client_hostname = None;
        self.envelope.reset();

        Ok(true)
    }

    async fn handle_auth<S>(
        &mut self,
        mechanism: &str,
        initial_response: Option<String>,
        buf_reader: &mut BufReader<S>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.encryption_required() {
            buf_reader
                .write_all(format!("{}\r\n", codes::ENCRYPTION_REQUIRED).as_bytes())
                .await?;
            return Ok(());
        }
        if self.state != SessionState::Identified {
            buf_reader.write_all(codes::bad_sequence("EHLO").as_bytes()).await?;
            return Ok(());
        }

        let auth_mechanism = match AuthMechanism::from_str(mechanism) {
            Some(m) => m,
            None => {
                buf_reader.write_all(format!("{}\r\n", codes::NOT_IMPLEMENTED).as_bytes()).await?;
                return Ok(());
            }
        };

        match auth_mechanism {
            AuthMechanism::Plain => {
                let auth_data = match initial_response {
                    Some(data) => data,
                    None => {
                        buf_reader.write_all(b"334 \r\n").await?;
                        let mut line = String::new();
                        timeout(IDLE_TIMEOUT, buf_reader.read_line(&mut line))
                            .await
                            .map_err(|_| MailError::SmtpProtocol("AUTH timeout".into()))??;
                        line.trim().to_string()
                    }
                };

                let (username, password) = match Authenticator::decode_plain_auth(&auth_data) {
                    Ok(pair) => pair,
                    Err(_) => {
                        buf_reader.write_all(format!("{}\r\n", codes::INVALID_BASE64).as_bytes()).await?;
                        return Ok(());
                    }
                };
                self.finish_auth(&username, &password, buf_reader).await
            }
            AuthMechanism::Login => {
                self.login_username = None;
                self.state = SessionState::AwaitingUsername;
                buf_reader.write_all(format!("{}\r\n", codes::AUTH_USERNAME).as_bytes()).await?;
                Ok(())
            }
        }
    }

    async fn continue_login_username<S>(
        &mut self,
        line: &str,
        buf_reader: &mut BufReader<S>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let username = match Authenticator::decode_login_credential(line) {
            Ok(u) => u,
            Err(_) => {
                self.state = SessionState::Identified;
                buf_reader.write_all(format!("{}\r\n", codes::INVALID_BASE64).as_bytes()).await?;
                return Ok(());
            }
        };
        self.login_username = Some(username);
        self.state = SessionState::AwaitingPassword;
        buf_reader.write_all(format!("{}\r\n", codes::AUTH_PASSWORD).as_bytes()).await?;
        Ok(())
    }

    async fn continue_login_password<S>(
        &mut self,
        line: &str,
        buf_reader: &mut BufReader<S>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let password = match Authenticator::decode_login_credential(line) {
            Ok(p) => p,
            Err(_) => {
                self.state = SessionState::Identified;
                buf_reader.write_all(format!("{}\r\n", codes::INVALID_BASE64).as_bytes()).await?;
                return Ok(());
            }
        };
        let username = self.login_username.take().unwrap_or_default();
        self.state = SessionState::Identified;
        self.finish_auth(&username, &password, buf_reader).await
    }

    async fn finish_auth<S>(
        &mut self,
        username: &str,
        password: &str,
        buf_reader: &mut BufReader<S>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.state = SessionState::Identified;
        if self.authenticator.authenticate(username, password).await? {
            self.authenticated_user = Some(username.to_string());
            info!(remote = %self.remote_addr, "authenticated as {}", username);
            buf_reader.write_all(format!("{}\r\n", codes::AUTH_SUCCESS).as_bytes()).await?;
        } else {
            warn!(remote = %self.remote_addr, "authentication failed for {}", username);
            buf_reader.write_all(format!("{}\r\n", codes::AUTH_FAILED).as_bytes()).await?;
        }
        Ok(())
    }
}

/// Parse the header block of a buffered DATA payload: every line up to
/// the first blank line, split on the first `:`, key and value trimmed.
/// A header-shaped line with no colon before the blank line is treated
/// as the start of the body, not a header.
fn parse_headers(lines: &[String]) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((key, value)) => {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => break,
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_headers_stops_at_blank_line() {
        let lines = vec![
            "Subject: Test".to_string(),
            "From: a@b.c".to_string(),
            "".to_string(),
            "Body line one".to_string(),
        ];
        let headers = parse_headers(&lines);
        assert_eq!(headers.get("Subject").unwrap(), "Test");
        assert_eq!(headers.get("From").unwrap(), "a@b.c");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn parse_headers_with_no_blank_line_treats_colonless_as_body_start() {
        let lines = vec!["Subject: Test".to_string(), "Body.".to_string()];
        let headers = parse_headers(&lines);
        assert_eq!(headers.len(), 1);
    }

    fn new_session() -> SmtpSession {
        SmtpSession::new(
            "mail.local".to_string(),
            "127.0.0.1:1234".to_string(),
            None,
            Arc::new(UserStore::new()),
            Arc::new(MailStore::new()),
            Arc::new(SmtpClient::new("mail.local".to_string(), None)),
        )
    }

    #[test]
    fn ehlo_then_mail_from_local_unauthenticated_requires_auth() {
        let mut session = new_session();
        session.handle_command(SmtpCommand::Ehlo("client".to_string()));
        let resp = session.handle_command(SmtpCommand::MailFrom("u@mail.local".to_string()));
        assert!(resp.starts_with("530"));
    }

    #[test]
    fn inbound_delivery_from_foreign_sender_to_known_local_user_is_accepted() {
        let mut session = new_session();
        session
            .user_store
            .insert("oliver", "pw", "oliver@mail.local", vec![])
            .unwrap();
        session.handle_command(SmtpCommand::Ehlo("client".to_string()));
        let mail_from = session.handle_command(SmtpCommand::MailFrom("x@remote.com".to_string()));
        assert!(mail_from.starts_with("250"));
        let rcpt_to = session.handle_command(SmtpCommand::RcptTo("oliver@mail.local".to_string()));
        assert!(rcpt_to.starts_with("250"));
        assert!(!session.envelope.outgoing);
    }

    #[test]
    fn foreign_to_foreign_relay_is_denied() {
        let mut session = new_session();
        session.handle_command(SmtpCommand::Ehlo("client".to_string()));
        session.handle_command(SmtpCommand::MailFrom("x@remote.com".to_string()));
        let rcpt_to = session.handle_command(SmtpCommand::RcptTo("y@other.com".to_string()));
        assert!(rcpt_to.starts_with("554"));
    }

    #[test]
    fn rcpt_to_unknown_local_user_is_rejected() {
        let mut session = new_session();
        session.handle_command(SmtpCommand::Ehlo("client".to_string()));
        session.handle_command(SmtpCommand::MailFrom("x@remote.com".to_string()));
        let rcpt_to = session.handle_command(SmtpCommand::RcptTo("ghost@mail.local".to_string()));
        assert!(rcpt_to.starts_with("550"));
    }

    #[test]
    fn data_without_rcpt_to_is_bad_sequence() {
        let mut session = new_session();
        session.handle_command(SmtpCommand::Ehlo("client".to_string()));
        session.handle_command(SmtpCommand::MailFrom("x@remote.com".to_string()));
        let resp = session.handle_command(SmtpCommand::Data);
        assert!(resp.starts_with("503"));
    }

    #[test]
    fn null_sender_is_accepted() {
        let mut session = new_session();
        session.handle_command(SmtpCommand::Ehlo("client".to_string()));
        let resp = session.handle_command(SmtpCommand::MailFrom("".to_string()));
        assert!(resp.starts_with("250"));
    }

    #[test]
    fn rset_clears_envelope_and_returns_to_identified() {
        let mut session = new_session();
        session.handle_command(SmtpCommand::Ehlo("client".to_string()));
        session.handle_command(SmtpCommand::MailFrom("x@remote.com".to_string()));
        session.handle_command(SmtpCommand::Rset);
        assert_eq!(session.state, SessionState::Identified);
        assert!(session.envelope.sender.is_none());
    }
}
