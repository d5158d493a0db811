//! DKIM signing for outgoing mail (RFC 6376)

use crate::error::{MailError, Result};
use mail_auth::common::crypto::{RsaKey, Sha256};
use mail_auth::common::headers::HeaderWriter;
use mail_auth::dkim::DkimSigner as MailAuthDkimSigner;
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const MESSAGE_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MESSAGE_ID_LEN: usize = 20;

/// Signs outgoing mail with the server's DKIM key. Held as a single
/// `Arc<DkimSigner>` constructed once at startup and shared by every
/// outbound client connection, rather than re-read per message.
pub struct DkimSigner {
    domain: String,
    selector: String,
    private_key: Vec<u8>,
}

impl DkimSigner {
    /// Load the signer's RSA private key (PEM) from disk.
    pub fn new(domain: String, selector: String, private_key_path: &Path) -> Result<Self> {
        let private_key = fs::read(private_key_path)?;
        Ok(Self {
            domain,
            selector,
            private_key,
        })
    }

    /// Sign `message` (full headers + body) and return the
    /// `DKIM-Signature` header value.
    pub fn sign(&self, message: &[u8]) -> Result<String> {
        info!(domain = %self.domain, selector = %self.selector, "signing outgoing message with DKIM");

        let private_key_str = String::from_utf8(self.private_key.clone())
            .map_err(|e| MailError::Dkim(format!("private key is not valid UTF-8: {}", e)))?;
        let rsa_key = RsaKey::<Sha256>::from_rsa_pem(&private_key_str)
            .map_err(|e| MailError::Dkim(format!("failed to load RSA key: {}", e)))?;

        let signature = MailAuthDkimSigner::from_key(rsa_key)
            .domain(&self.domain)
            .selector(&self.selector)
            .headers(["From", "To", "Subject", "Date", "Message-ID"])
            .sign(message)
            .map_err(|e| MailError::Dkim(format!("signing failed: {}", e)))?;

        debug!("DKIM signature generated");
        Ok(signature.to_header())
    }

    /// Sign `message` and prepend the `DKIM-Signature` header to it.
    pub fn sign_and_prepend(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self.sign(message)?;
        let mut signed = Vec::with_capacity(signature.len() + message.len() + 18);
        signed.extend_from_slice(b"DKIM-Signature: ");
        signed.extend_from_slice(signature.as_bytes());
        signed.extend_from_slice(b"\r\n");
        signed.extend_from_slice(message);
        Ok(signed)
    }
}

/// Generate a Message-ID local part: 20 random alphanumeric characters
/// drawn from the process-wide CSPRNG, not a counter.
pub fn generate_message_id_local_part() -> String {
    let mut rng = rand::thread_rng();
    (0..MESSAGE_ID_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..MESSAGE_ID_CHARS.len());
            MESSAGE_ID_CHARS[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn signer_construction_only_reads_the_key_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not actually a valid key").unwrap();

        let signer = DkimSigner::new(
            "example.com".to_string(),
            "mail".to_string(),
            temp_file.path(),
        );
        assert!(signer.is_ok());
    }

    #[test]
    fn signing_with_an_invalid_key_fails() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not actually a valid key").unwrap();
        let signer = DkimSigner::new(
            "example.com".to_string(),
            "mail".to_string(),
            temp_file.path(),
        )
        .unwrap();

        let err = signer.sign(b"From: a@example.com\r\n\r\nbody").unwrap_err();
        assert!(matches!(err, MailError::Dkim(_)));
    }

    #[test]
    fn message_id_local_part_has_expected_length_and_alphabet() {
        let id = generate_message_id_local_part();
        assert_eq!(id.len(), MESSAGE_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn message_id_local_parts_vary() {
        let a = generate_message_id_local_part();
        let b = generate_message_id_local_part();
        assert_ne!(a, b);
    }
}
