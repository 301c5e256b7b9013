//! Static shared-secret allow-list.
//!
//! Key extraction is transport-specific (an HTTP header today). This module
//! only handles membership checks.

use subtle::ConstantTimeEq;

/// Immutable set of privileged access keys loaded at startup.
///
/// An empty list means no restriction.
#[derive(Clone, Default)]
pub struct AllowList {
    keys: Vec<String>,
}

impl AllowList {
    /// Builds the list, dropping blank entries left by sloppy comma lists.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys
            .into_iter()
            .map(Into::into)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        keys.sort();
        keys.dedup();
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether `key` matches a member. Every member is compared so the
    /// timing does not reveal which entry (if any) matched.
    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .iter()
            .fold(false, |found, member| found | ct_eq(key.as_bytes(), member.as_bytes()))
    }
}

impl std::fmt::Debug for AllowList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowList")
            .field("keys", &self.keys.len())
            .finish()
    }
}

/// Constant-time comparison of two byte slices.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_entries_are_ignored() {
        let list = AllowList::new(["", "  ", "alpha", "alpha", " beta "]);
        assert_eq!(list.len(), 2);
        assert!(list.contains("beta"));
        assert!(!list.contains(""));
    }

    #[test]
    fn empty_list_contains_nothing() {
        let list = AllowList::new(Vec::<String>::new());
        assert!(list.is_empty());
        assert!(!list.contains("anything"));
    }

    #[test]
    fn membership_is_exact() {
        let list = AllowList::new(["team-key"]);
        assert!(list.contains("team-key"));
        assert!(!list.contains("team-ke"));
        assert!(!list.contains("team-key2"));
        assert!(!list.contains("TEAM-KEY"));
    }

    #[test]
    fn debug_does_not_print_keys() {
        let list = AllowList::new(["super-secret"]);
        assert!(!format!("{list:?}").contains("super-secret"));
    }
}
