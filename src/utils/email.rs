use crate::error::{MailError, Result};

/// Basic email validation
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(MailError::InvalidEmail("Email is empty".to_string()));
    }

    if !email.contains('@') {
        return Err(MailError::InvalidEmail(
            "Email must contain @".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(MailError::InvalidEmail("Invalid email format".to_string()));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(MailError::InvalidEmail(
            "Email parts cannot be empty".to_string(),
        ));
    }

    if !domain.contains('.') {
        return Err(MailError::InvalidEmail(
            "Domain must contain a dot".to_string(),
        ));
    }

    Ok(())
}

/// The part after `@`, if the address contains exactly one.
pub fn domain_of(email: &str) -> Option<&str> {
    let mut parts = email.splitn(2, '@');
    let _local = parts.next()?;
    parts.next().filter(|d| !d.is_empty())
}

/// The part before `@`, if the address contains one.
pub fn local_part_of(email: &str) -> Option<&str> {
    email.split_once('@').map(|(local, _)| local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name@example.co.uk").is_ok());
    }

    #[test]
    fn test_invalid_email() {
        assert!(validate_email("").is_err());
        assert!(validate_email("test").is_err());
        assert!(validate_email("test@").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("test@domain").is_err());
    }

    #[test]
    fn domain_and_local_part_split_on_at() {
        assert_eq!(domain_of("a@b.com"), Some("b.com"));
        assert_eq!(local_part_of("a@b.com"), Some("a"));
        assert_eq!(domain_of("no-at"), None);
    }
}
