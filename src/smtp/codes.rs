//! SMTP response status lines
//!
//! String table of the response lines the server emits, as format
//! strings against `std::fmt` placeholders where the line needs a
//! runtime value (hostname, peer hostname, the required command name).
//! Kept bit-exact against the response table, including the EHLO
//! continuation convention: every multi-line response's last line uses
//! `250 ` (space), never `250-`.

pub const SERVICE_READY: &str = "220 {} SMTP service ready";
pub const READY_STARTING_TLS: &str = "220 Ready to start TLS";
pub const CONN_CLOSED: &str = "221 {} closing connection";
pub const AUTH_SUCCESS: &str = "235 Authentication successful";
pub const OK: &str = "250 OK";
pub const GREETING: &str = "250-{} greets {}";

pub const AUTH_USERNAME: &str = "334 VXNlcm5hbWU6";
pub const AUTH_PASSWORD: &str = "334 UGFzc3dvcmQ6";
pub const START_MAIL_INPUT: &str = "354 Start mail input; end with <CRLF>.<CRLF>";

pub const TOO_MANY_RECIPIENTS: &str = "452 Too many recipients";
pub const BAD_COMMAND: &str = "500 Unrecognized command";
pub const LINE_TOO_LONG: &str = "500 Line too long";
pub const INVALID_BASE64: &str = "501 Invalid base64 encoding";
pub const NOT_IMPLEMENTED: &str = "502 Command not implemented";
pub const BAD_SEQUENCE: &str = "503 Bad sequence: '{}' required first";
pub const AUTH_REQUIRED: &str = "530 Authentication required";
pub const AUTH_FAILED: &str = "535 Authentication failed";
pub const ENCRYPTION_REQUIRED: &str = "538 Encryption required for requested authentication mechanism";
pub const NO_SUCH_USER: &str = "550 No such user here";
pub const MESSAGE_TOO_LARGE: &str = "552 Message too large";
pub const RELAY_DENIED: &str = "554 Relay access denied";
pub const INTERNAL_ERROR: &str = "451 Internal server error";

/// Render a `220 <host> SMTP service ready` greeting.
pub fn service_ready(hostname: &str) -> String {
    format!("220 {} SMTP service ready\r\n", hostname)
}

/// Render a `221 <host> closing connection` line.
pub fn conn_closed(hostname: &str) -> String {
    format!("221 {} closing connection\r\n", hostname)
}

/// Render the full EHLO response: a `250-` line per advertised
/// extension followed by a single `250 ` terminator line. `extensions`
/// lists the lines to advertise (e.g. `STARTTLS`, `AUTH LOGIN PLAIN`)
/// in order; an empty list collapses to one `250 ` line.
pub fn ehlo_greeting(hostname: &str, client_host: &str, extensions: &[&str]) -> String {
    let mut out = String::new();
    let greeting = format!("{} greets {}", hostname, client_host);

    if extensions.is_empty() {
        out.push_str(&format!("250 {}\r\n", greeting));
        return out;
    }

    out.push_str(&format!("250-{}\r\n", greeting));
    for (i, ext) in extensions.iter().enumerate() {
        let is_last = i == extensions.len() - 1;
        let sep = if is_last { "250 " } else { "250-" };
        out.push_str(&format!("{}{}\r\n", sep, ext));
    }
    out
}

/// Render a `250 <host> greets <client>` HELO response (never multi-line).
pub fn helo_greeting(hostname: &str, client_host: &str) -> String {
    format!("250 {} greets {}\r\n", hostname, client_host)
}

/// Render a `503 Bad sequence: '<cmd>' required first` line.
pub fn bad_sequence(required_cmd: &str) -> String {
    format!("503 Bad sequence: '{}' required first\r\n", required_cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ehlo_greeting_last_line_uses_space_not_dash() {
        let resp = ehlo_greeting("mail.local", "client", &["STARTTLS", "AUTH LOGIN PLAIN"]);
        let lines: Vec<&str> = resp.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("250-"));
        assert!(lines[1].starts_with("250-"));
        assert!(lines[2].starts_with("250 "));
        assert!(!lines[2].starts_with("250-"));
    }

    #[test]
    fn ehlo_greeting_with_no_extensions_is_single_line() {
        let resp = ehlo_greeting("mail.local", "client", &[]);
        assert_eq!(resp, "250 mail.local greets client\r\n");
    }
}
