//! Outbound SMTP client: one-shot relay of a submitted message to each
//! recipient's mail exchanger. No queueing or retry — a recipient that
//! can't be delivered to right now is simply not counted as delivered.

use crate::authentication::dkim::{generate_message_id_local_part, DkimSigner};
use crate::error::{MailError, Result};
use crate::utils::dns::lookup_mx;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::rustls::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// A message accepted for outbound submission: sender, recipients, and
/// the buffered DATA lines (headers + body), not yet DKIM-signed.
pub struct OutboundMessage {
    pub sender: String,
    pub recipients: Vec<String>,
    pub lines: Vec<String>,
}

/// Either side of an MX connection, before or after STARTTLS.
enum MxStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for MxStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MxStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MxStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MxStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MxStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MxStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MxStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MxStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MxStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MxStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Relays [`OutboundMessage`]s to their recipients' mail exchangers,
/// signing once per message with the server's DKIM key.
pub struct SmtpClient {
    local_hostname: String,
    dkim_signer: Option<Arc<DkimSigner>>,
}

impl SmtpClient {
    pub fn new(local_hostname: String, dkim_signer: Option<Arc<DkimSigner>>) -> Self {
        Self {
            local_hostname,
            dkim_signer,
        }
    }

    /// Deliver `mail` to as many recipients as possible. Returns the
    /// count of recipients successfully delivered; this can be less
    /// than `mail.recipients.len()` without being an error — per
    /// recipient, MX or delivery failure just drops that recipient
    /// from the count rather than queueing a retry.
    pub async fn send(&self, mail: &OutboundMessage) -> Result<usize> {
        let signed_lines = self.sign(mail)?;
        let mut delivered = 0;

        for recipient in &mail.recipients {
            let domain = recipient.rsplit_once('@').map(|(_, d)| d).unwrap_or("");

            let mx_hosts = if domain.eq_ignore_ascii_case("localhost") {
                vec!["localhost".to_string()]
            } else {
                match lookup_mx(domain).await {
                    Ok(hosts) => hosts
                        .into_iter()
                        .map(|h| h.trim_end_matches(":25").to_string())
                        .collect(),
                    Err(e) => {
                        warn!(recipient = %recipient, error = %e, "MX resolution failed, dropping recipient");
                        continue;
                    }
                }
            };

            let mut ok = false;
            for host in &mx_hosts {
                match self
                    .attempt_delivery(host, &mail.sender, recipient, &signed_lines)
                    .await
                {
                    Ok(()) => {
                        ok = true;
                        break;
                    }
                    Err(e) => {
                        debug!(host = %host, error = %e, "delivery attempt failed, trying next MX");
                    }
                }
            }

            if ok {
                delivered += 1;
            } else {
                warn!(recipient = %recipient, "all MX attempts failed, dropping recipient");
            }
        }

        Ok(delivered)
    }

    fn sign(&self, mail: &OutboundMessage) -> Result<Vec<String>> {
        let Some(signer) = &self.dkim_signer else {
            return Ok(mail.lines.clone());
        };

        let header_block = Self::build_header_block(mail, &self.local_hostname);
        debug!("assembled DKIM header block for outbound message");

        let mut raw = header_block.into_bytes();
        raw.extend_from_slice(mail.lines.join("\r\n").as_bytes());

        let signed = signer.sign_and_prepend(&raw)?;
        let signed_str = String::from_utf8(signed)
            .map_err(|e| MailError::Dkim(format!("signed message is not valid UTF-8: {}", e)))?;
        Ok(signed_str.split("\r\n").map(str::to_string).collect())
    }

    /// Build the From/To/Subject/Date/Message-ID header block prepended
    /// to a message before DKIM signing. Subject is scraped from any
    /// existing `Subject:` header in `mail.lines`; Message-ID is freshly
    /// generated per send.
    fn build_header_block(mail: &OutboundMessage, local_hostname: &str) -> String {
        let domain = mail
            .sender
            .rsplit_once('@')
            .map(|(_, d)| d)
            .unwrap_or(local_hostname);
        let message_id = format!("{}@{}", generate_message_id_local_part(), domain);
        let subject = mail
            .lines
            .iter()
            .take_while(|l| !l.is_empty())
            .find_map(|l| l.split_once(':').filter(|(k, _)| k.eq_ignore_ascii_case("subject")))
            .map(|(_, v)| v.trim())
            .unwrap_or("");

        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMessage-ID: <{}>\r\n\r\n",
            mail.sender,
            mail.recipients.join(", "),
            subject,
            chrono::Utc::now().to_rfc2822(),
            message_id,
        )
    }

    /// Dial one MX host and run the whole dialogue. The connection is
    /// owned by this call for its entire lifetime and dropped exactly
    /// once when it returns, whether or not STARTTLS upgraded it.
    async fn attempt_delivery(
        &self,
        host: &str,
        sender: &str,
        recipient: &str,
        lines: &[String],
    ) -> Result<()> {
        let port = if host.eq_ignore_ascii_case("localhost") { 2525 } else { 25 };
        let tcp = TcpStream::connect(format!("{}:{}", host, port)).await?;
        let mut stream = MxStream::Plain(tcp);

        let mut reader = BufReader::new(&mut stream);
        read_response(&mut reader, "220").await?;

        write_line(&mut stream, &format!("EHLO {}", self.local_hostname)).await?;
        let mut reader = BufReader::new(&mut stream);
        let ehlo_response = read_response(&mut reader, "250").await?;

        if ehlo_response.to_uppercase().contains("STARTTLS") {
            write_line(&mut stream, "STARTTLS").await?;
            let mut reader = BufReader::new(&mut stream);
            read_response(&mut reader, "220").await?;

            let tcp = match stream {
                MxStream::Plain(tcp) => tcp,
                MxStream::Tls(_) => unreachable!("freshly connected stream is never TLS yet"),
            };

            let connector = TlsConnector::from(Arc::new(insecure_client_tls_config()));
            let server_name = ServerName::try_from(host)
                .map_err(|e| MailError::Tls(format!("invalid SNI name {}: {}", host, e)))?;
            let upgraded = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| MailError::Tls(format!("TLS handshake with {} failed: {}", host, e)))?;
            stream = MxStream::Tls(Box::new(upgraded));

            write_line(&mut stream, &format!("EHLO {}", self.local_hostname)).await?;
            let mut reader = BufReader::new(&mut stream);
            read_response(&mut reader, "250").await?;
        }

        write_line(&mut stream, &format!("MAIL FROM:<{}>", sender)).await?;
        let mut reader = BufReader::new(&mut stream);
        read_response(&mut reader, "250").await?;

        write_line(&mut stream, &format!("RCPT TO:<{}>", recipient)).await?;
        let mut reader = BufReader::new(&mut stream);
        read_response(&mut reader, "250").await?;

        write_line(&mut stream, "DATA").await?;
        let mut reader = BufReader::new(&mut stream);
        read_response(&mut reader, "354").await?;

        for line in lines {
            let stuffed = if line.starts_with('.') {
                format!(".{}", line)
            } else {
                line.clone()
            };
            write_line(&mut stream, &stuffed).await?;
        }
        write_line(&mut stream, ".").await?;
        let mut reader = BufReader::new(&mut stream);
        read_response(&mut reader, "250").await?;

        write_line(&mut stream, "QUIT").await?;
        let mut reader = BufReader::new(&mut stream);
        let _ = read_response(&mut reader, "221").await;

        Ok(())
        // `stream` drops here, closing the connection exactly once.
    }
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug!("S: {}", line);
    writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_response<R>(reader: &mut BufReader<R>, expected: &str) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut full_response = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(MailError::SmtpProtocol("connection closed mid-response".into()));
        }
        debug!("C: {}", line.trim_end());
        full_response.push_str(&line);
        if line.len() >= 4 && &line[3..4] == " " {
            break;
        }
    }

    if !full_response.starts_with(expected) {
        return Err(MailError::SmtpProtocol(format!(
            "expected {}, got: {}",
            expected,
            full_response.trim_end()
        )));
    }
    Ok(full_response)
}

/// TLS config used for outbound STARTTLS. Mail exchangers on the open
/// internet routinely present certificates an opportunistic client has
/// no prior trust anchor for; verification is disabled here the same
/// way opportunistic-TLS MTAs do, since the alternative is silently
/// falling back to plaintext instead.
fn insecure_client_tls_config() -> tokio_rustls::rustls::ClientConfig {
    struct NoVerify;
    impl tokio_rustls::rustls::client::ServerCertVerifier for NoVerify {
        fn verify_server_cert(
            &self,
            _end_entity: &tokio_rustls::rustls::Certificate,
            _intermediates: &[tokio_rustls::rustls::Certificate],
            _server_name: &ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: std::time::SystemTime,
        ) -> std::result::Result<
            tokio_rustls::rustls::client::ServerCertVerified,
            tokio_rustls::rustls::Error,
        > {
            Ok(tokio_rustls::rustls::client::ServerCertVerified::assertion())
        }
    }

    tokio_rustls::rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(NoVerify))
        .with_no_client_auth()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_drops_recipients_whose_domain_has_no_mx_records() {
        let client = SmtpClient::new("mail.local".to_string(), None);
        let mail = OutboundMessage {
            sender: "a@mail.local".to_string(),
            recipients: vec!["b@nonexistent-domain-for-tests-12345.invalid".to_string()],
            lines: vec!["Subject: hi".to_string(), "".to_string(), "body".to_string()],
        };
        let delivered = client.send(&mail).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn sign_without_a_signer_passes_lines_through_unchanged() {
        let client = SmtpClient::new("mail.local".to_string(), None);
        let mail = OutboundMessage {
            sender: "a@mail.local".to_string(),
            recipients: vec![],
            lines: vec!["Subject: hi".to_string()],
        };
        assert_eq!(client.sign(&mail).unwrap(), mail.lines);
    }

    #[test]
    fn header_block_carries_envelope_and_scraped_subject() {
        let mail = OutboundMessage {
            sender: "a@example.com".to_string(),
            recipients: vec!["b@example.net".to_string(), "c@example.net".to_string()],
            lines: vec!["Subject: hello there".to_string(), "".to_string(), "body".to_string()],
        };
        let block = SmtpClient::build_header_block(&mail, "mail.local");

        assert!(block.starts_with("From: a@example.com\r\n"));
        assert!(block.contains("To: b@example.net, c@example.net\r\n"));
        assert!(block.contains("Subject: hello there\r\n"));
        assert!(block.contains("Date: "));
        assert!(block.contains("Message-ID: <"));
        assert!(block.contains("@example.com>\r\n"));
        assert!(block.ends_with("\r\n\r\n"));
    }

    #[test]
    fn header_block_defaults_to_empty_subject_when_absent() {
        let mail = OutboundMessage {
            sender: "a@example.com".to_string(),
            recipients: vec!["b@example.net".to_string()],
            lines: vec!["".to_string(), "body".to_string()],
        };
        let block = SmtpClient::build_header_block(&mail, "mail.local");
        assert!(block.contains("Subject: \r\n"));
    }

    #[test]
    fn header_block_falls_back_to_local_hostname_for_bare_sender() {
        let mail = OutboundMessage {
            sender: "postmaster".to_string(),
            recipients: vec![],
            lines: vec![],
        };
        let block = SmtpClient::build_header_block(&mail, "mail.local");
        assert!(block.contains("@mail.local>\r\n"));
    }
}
