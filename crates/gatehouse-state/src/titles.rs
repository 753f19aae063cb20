//! Attestation-title allowlist.
//!
//! Titles are canonicalized with SHA-256 over their exact UTF-8 bytes so a
//! lookup costs the same regardless of title length. An ordered registry of
//! every title that was ever enabled exists only for enumeration.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// The canonical key of a title.
pub type TitleKey = [u8; 32];

/// Computes the canonical key of `title`.
pub fn canonicalize(title: &str) -> TitleKey {
    Sha256::digest(title.as_bytes()).into()
}

/// Validity flags plus the ordered registry of known titles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleAllowlist {
    flags: HashMap<TitleKey, bool>,
    registry: Vec<String>,
    registered: HashSet<TitleKey>,
}

impl TitleAllowlist {
    /// Creates an empty allowlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `title` is currently enabled.
    pub fn is_allowed(&self, title: &str) -> bool {
        self.flags
            .get(&canonicalize(title))
            .copied()
            .unwrap_or(false)
    }

    /// Returns `true` if `title` was ever enabled.
    pub fn is_registered(&self, title: &str) -> bool {
        self.registered.contains(&canonicalize(title))
    }

    /// Every title ever enabled, in first-activation order.
    pub fn registry(&self) -> &[String] {
        &self.registry
    }

    /// Lazily lists the currently enabled titles in registration order.
    ///
    /// The iterator borrows the allowlist, so it always reflects the state
    /// at call time. Clone it to restart the enumeration.
    pub fn list_allowed(&self) -> AllowedTitles<'_> {
        AllowedTitles {
            titles: self.registry.iter(),
            flags: &self.flags,
        }
    }

    /// Stores the flag. Returns `true` when the title was appended to the
    /// registry by this call.
    pub(crate) fn set(&mut self, title: &str, valid: bool) -> bool {
        let key = canonicalize(title);
        self.flags.insert(key, valid);
        if valid && self.registered.insert(key) {
            self.registry.push(title.to_string());
            return true;
        }
        false
    }
}

/// Iterator over enabled titles. See [`TitleAllowlist::list_allowed`].
#[derive(Debug, Clone)]
pub struct AllowedTitles<'a> {
    titles: std::slice::Iter<'a, String>,
    flags: &'a HashMap<TitleKey, bool>,
}

impl<'a> Iterator for AllowedTitles<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let flags = self.flags;
        self.titles
            .by_ref()
            .find(|title| flags.get(&canonicalize(title)).copied().unwrap_or(false))
            .map(String::as_str)
    }
}
