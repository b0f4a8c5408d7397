use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default wait for the user to answer an access prompt.
pub const DEFAULT_AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Handles with fewer digits than this are short codes and never resolve.
const MIN_PHONE_DIGITS: usize = 7;

/// Maps sender handles to display names.
///
/// Names are resolved in one batch per poll: callers collect every handle
/// first, hand the set to `build_index_for_handles`, then only do lookups.
pub trait NameResolver {
    fn build_index_for_handles(&mut self, handles: &HashSet<String>);
    fn get_contact_name(&self, handle: &str) -> Option<String>;
}

impl<T: NameResolver + ?Sized> NameResolver for Box<T> {
    fn build_index_for_handles(&mut self, handles: &HashSet<String>) {
        (**self).build_index_for_handles(handles)
    }

    fn get_contact_name(&self, handle: &str) -> Option<String> {
        (**self).get_contact_name(handle)
    }
}

/// Resolver that knows nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContacts;

impl NameResolver for NoContacts {
    fn build_index_for_handles(&mut self, _handles: &HashSet<String>) {}

    fn get_contact_name(&self, _handle: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

impl Contact {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.given_name, self.family_name);
        let name = name.trim();
        if name.is_empty() {
            "Unknown".to_string()
        } else {
            name.to_string()
        }
    }
}

/// Source of address book entries.
pub trait ContactStore {
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Ask for access. The answer is sent on `reply`, possibly from another
    /// thread and possibly never.
    fn request_access(&self, reply: Sender<bool>);

    fn contacts(&self) -> Result<Vec<Contact>>;
}

/// Contacts read from a JSON array of [`Contact`] records.
#[derive(Debug, Clone)]
pub struct JsonContactStore {
    path: PathBuf,
}

impl JsonContactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContactStore for JsonContactStore {
    fn authorization_status(&self) -> AuthorizationStatus {
        if self.path.is_file() {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        }
    }

    fn request_access(&self, reply: Sender<bool>) {
        let _ = reply.send(self.path.is_file());
    }

    fn contacts(&self) -> Result<Vec<Contact>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading contacts from {}", self.path.display()))?;
        let contacts = serde_json::from_str(&raw)
            .with_context(|| format!("parsing contacts from {}", self.path.display()))?;
        Ok(contacts)
    }
}

/// Lookup tables built from one enumeration of the store.
#[derive(Debug, Default)]
struct Tables {
    by_last10: HashMap<String, String>,
    by_last7: HashMap<String, String>,
    by_email: HashMap<String, String>,
}

impl Tables {
    fn build(contacts: &[Contact]) -> Self {
        let mut tables = Tables::default();
        for contact in contacts {
            let name = contact.display_name();

            for email in &contact.emails {
                let email = email.trim().to_lowercase();
                if !email.is_empty() {
                    tables.by_email.insert(email, name.clone());
                }
            }

            for phone in &contact.phones {
                let digits = drop_country_code(digits(phone));
                if digits.len() >= 10 {
                    tables.by_last10.insert(tail(&digits, 10).to_string(), name.clone());
                }
                if digits.len() >= MIN_PHONE_DIGITS {
                    tables.by_last7.insert(tail(&digits, 7).to_string(), name.clone());
                }
            }
        }
        tables
    }

    fn lookup(&self, handle: &str) -> Option<String> {
        if handle.contains('@') {
            return self.by_email.get(&handle.to_lowercase()).cloned();
        }

        let digits = digits(handle);
        if digits.len() < MIN_PHONE_DIGITS {
            return None;
        }
        if digits.len() >= 10 {
            if let Some(name) = self.by_last10.get(tail(&digits, 10)) {
                return Some(name.clone());
            }
        }
        self.by_last7.get(tail(&digits, 7)).cloned()
    }
}

/// Name resolver backed by a [`ContactStore`].
///
/// The store is enumerated at most once. Later builds map only handles
/// not seen before against the cached tables.
pub struct ContactIndex<S> {
    store: S,
    timeout: Duration,
    tables: Option<Tables>,
    names: HashMap<String, Option<String>>,
}

impl<S: ContactStore> ContactIndex<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            tables: None,
            names: HashMap::new(),
        }
    }

    fn ensure_authorized(&self) -> bool {
        match self.store.authorization_status() {
            AuthorizationStatus::Authorized => true,
            AuthorizationStatus::Denied => false,
            AuthorizationStatus::NotDetermined => {
                let (tx, rx) = bounded(1);
                self.store.request_access(tx);
                match rx.recv_timeout(self.timeout) {
                    Ok(granted) => granted,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(
                            "Contacts access not answered within {:?}, names stay unresolved",
                            self.timeout
                        );
                        false
                    }
                    Err(RecvTimeoutError::Disconnected) => false,
                }
            }
        }
    }

    fn load_tables(&self) -> Tables {
        if !self.ensure_authorized() {
            info!("Contacts access denied, showing raw handles");
            return Tables::default();
        }

        match self.store.contacts() {
            Ok(contacts) => {
                let tables = Tables::build(&contacts);
                info!(
                    "Indexed {} contacts ({} phone, {} email keys)",
                    contacts.len(),
                    tables.by_last10.len() + tables.by_last7.len(),
                    tables.by_email.len()
                );
                tables
            }
            Err(e) => {
                warn!("Failed to enumerate contacts: {:#}", e);
                Tables::default()
            }
        }
    }
}

impl<S: ContactStore> NameResolver for ContactIndex<S> {
    fn build_index_for_handles(&mut self, handles: &HashSet<String>) {
        if self.tables.is_none() {
            self.tables = Some(self.load_tables());
        }
        let Some(tables) = self.tables.as_ref() else {
            return;
        };

        let mut added = 0;
        for handle in handles {
            if handle.is_empty() || self.names.contains_key(handle) {
                continue;
            }
            self.names.insert(handle.clone(), tables.lookup(handle));
            added += 1;
        }
        debug!("Mapped {} new handles", added);
    }

    fn get_contact_name(&self, handle: &str) -> Option<String> {
        self.names.get(handle).cloned().flatten()
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// `1XXXXXXXXXX` becomes `XXXXXXXXXX`.
fn drop_country_code(digits: String) -> String {
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

fn tail(digits: &str, n: usize) -> &str {
    &digits[digits.len().saturating_sub(n)..]
}
