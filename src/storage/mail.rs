//! In-memory mail store
//!
//! Holds per-user mailboxes and the mail delivered into them. The
//! default "INBOX" mailbox (numeric id 1) is auto-provisioned the
//! first time a user's default mailbox is looked up, mirroring the
//! fake store backends this implementation is grounded on.

use crate::error::{MailError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

pub const DEFAULT_MAILBOX_NAME: &str = "INBOX";
pub const DEFAULT_MAILBOX_ID: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub owner: String,
    pub name: String,
    pub id: u32,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Mail {
    pub id: u32,
    pub mailbox_id: u32,
    pub flags: Vec<String>,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub size: usize,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Default)]
struct UserMail {
    mailboxes: Vec<Mailbox>,
    mails: Vec<Mail>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserMail>,
}

/// Shared, mutex-guarded mailbox/mail directory.
pub struct MailStore {
    inner: Mutex<Inner>,
}

impl MailStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn list_mailboxes(&self, user: &str) -> Vec<Mailbox> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(user)
            .map(|u| u.mailboxes.clone())
            .unwrap_or_default()
    }

    pub fn get_mailbox_by_id(&self, user: &str, id: u32) -> Result<Mailbox> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(user)
            .and_then(|u| u.mailboxes.iter().find(|m| m.id == id).cloned())
            .ok_or_else(|| MailError::MailboxNotFound(format!("{}/{}", user, id)))
    }

    pub fn get_mailbox_by_name(&self, user: &str, name: &str) -> Result<Mailbox> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(user)
            .and_then(|u| u.mailboxes.iter().find(|m| m.name == name).cloned())
            .ok_or_else(|| MailError::MailboxNotFound(format!("{}/{}", user, name)))
    }

    /// Look up the user's default mailbox by name, auto-creating INBOX
    /// (id 1, empty flags) on first access. Any other name that misses
    /// still returns a plain not-found error.
    pub fn get_or_create_default_mailbox(&self, user: &str) -> Mailbox {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.users.entry(user.to_string()).or_default();

        if let Some(existing) = entry
            .mailboxes
            .iter()
            .find(|m| m.name == DEFAULT_MAILBOX_NAME)
        {
            return existing.clone();
        }

        let mailbox = Mailbox {
            owner: user.to_string(),
            name: DEFAULT_MAILBOX_NAME.to_string(),
            id: DEFAULT_MAILBOX_ID,
            flags: Vec::new(),
        };
        entry.mailboxes.push(mailbox.clone());
        mailbox
    }

    pub fn insert_mailbox(&self, user: &str, name: &str, id: u32) -> Result<Mailbox> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.users.entry(user.to_string()).or_default();

        if entry.mailboxes.iter().any(|m| m.name == name || m.id == id) {
            return Err(MailError::MailboxAlreadyExists(format!("{}/{}", user, name)));
        }

        let mailbox = Mailbox {
            owner: user.to_string(),
            name: name.to_string(),
            id,
            flags: Vec::new(),
        };
        entry.mailboxes.push(mailbox.clone());
        Ok(mailbox)
    }

    pub fn delete_mailbox(&self, user: &str, id: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .users
            .get_mut(user)
            .ok_or_else(|| MailError::MailboxNotFound(format!("{}/{}", user, id)))?;

        let before = entry.mailboxes.len();
        entry.mailboxes.retain(|m| m.id != id);
        if entry.mailboxes.len() == before {
            return Err(MailError::MailboxNotFound(format!("{}/{}", user, id)));
        }
        Ok(())
    }

    pub fn list_mails(&self, user: &str, mailbox_id: u32) -> Vec<Mail> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(user)
            .map(|u| {
                u.mails
                    .iter()
                    .filter(|m| m.mailbox_id == mailbox_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_mail(&self, user: &str, mailbox_id: u32, mail_id: u32) -> Result<Mail> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(user)
            .and_then(|u| {
                u.mails
                    .iter()
                    .find(|m| m.mailbox_id == mailbox_id && m.id == mail_id)
                    .cloned()
            })
            .ok_or_else(|| MailError::MailNotFound(format!("{}/{}/{}", user, mailbox_id, mail_id)))
    }

    /// Insert a mail into `mailbox_id`. The mailbox must already exist;
    /// a duplicate (mailbox, mail id) pair is rejected.
    pub fn insert_mail(&self, user: &str, mail: Mail) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .users
            .get_mut(user)
            .ok_or_else(|| MailError::MailboxNotFound(mail.mailbox_id.to_string()))?;

        if !entry.mailboxes.iter().any(|m| m.id == mail.mailbox_id) {
            return Err(MailError::MailboxNotFound(mail.mailbox_id.to_string()));
        }

        if entry
            .mails
            .iter()
            .any(|m| m.mailbox_id == mail.mailbox_id && m.id == mail.id)
        {
            return Err(MailError::MailAlreadyExists(format!(
                "{}/{}",
                mail.mailbox_id, mail.id
            )));
        }

        entry.mails.push(mail);
        Ok(())
    }

    pub fn delete_mail(&self, user: &str, mailbox_id: u32, mail_id: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .users
            .get_mut(user)
            .ok_or_else(|| MailError::MailNotFound(format!("{}/{}/{}", user, mailbox_id, mail_id)))?;

        let before = entry.mails.len();
        entry
            .mails
            .retain(|m| !(m.mailbox_id == mailbox_id && m.id == mail_id));
        if entry.mails.len() == before {
            return Err(MailError::MailNotFound(format!(
                "{}/{}/{}",
                user, mailbox_id, mail_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mail(id: u32, mailbox_id: u32) -> Mail {
        Mail {
            id,
            mailbox_id,
            flags: vec![],
            received_at: chrono::Utc::now(),
            size: 5,
            headers: BTreeMap::new(),
            body: "hello".to_string(),
        }
    }

    #[test]
    fn default_mailbox_is_auto_provisioned_once() {
        let store = MailStore::new();
        let first = store.get_or_create_default_mailbox("oliver");
        assert_eq!(first.name, DEFAULT_MAILBOX_NAME);
        assert_eq!(first.id, DEFAULT_MAILBOX_ID);

        let second = store.get_or_create_default_mailbox("oliver");
        assert_eq!(second, first);
        assert_eq!(store.list_mailboxes("oliver").len(), 1);
    }

    #[test]
    fn insert_mail_requires_existing_mailbox() {
        let store = MailStore::new();
        let err = store.insert_mail("oliver", sample_mail(1, 1)).unwrap_err();
        assert!(matches!(err, MailError::MailboxNotFound(_)));
    }

    #[test]
    fn duplicate_mail_insert_is_rejected() {
        let store = MailStore::new();
        store.get_or_create_default_mailbox("oliver");
        store.insert_mail("oliver", sample_mail(1, DEFAULT_MAILBOX_ID)).unwrap();

        let err = store
            .insert_mail("oliver", sample_mail(1, DEFAULT_MAILBOX_ID))
            .unwrap_err();
        assert!(matches!(err, MailError::MailAlreadyExists(_)));
    }

    #[test]
    fn other_mailbox_names_are_not_auto_created() {
        let store = MailStore::new();
        let err = store.get_mailbox_by_name("oliver", "Archive").unwrap_err();
        assert!(matches!(err, MailError::MailboxNotFound(_)));
    }
}
