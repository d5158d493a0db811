use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP protocol error: {0}")]
    SmtpProtocol(String),

    #[error("IMAP protocol error: {0}")]
    ImapProtocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("DNS lookup failed: {0}")]
    DnsLookup(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("DKIM signing error: {0}")]
    Dkim(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("Mailbox already exists: {0}")]
    MailboxAlreadyExists(String),

    #[error("Mail not found: {0}")]
    MailNotFound(String),

    #[error("Mail already exists: {0}")]
    MailAlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, MailError>;
