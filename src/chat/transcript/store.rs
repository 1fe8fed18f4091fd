//! Ordered, append-only transcript log.

use crate::chat::transcript::entry::{TranscriptEntry, TranscriptRole};

/// Ordered log of transcript entries.
///
/// Insertion order is display order. Entries are never removed or
/// reordered, and at most one entry (the last one, always an Agent entry)
/// is open for appending.
#[derive(Clone, Debug, Default)]
pub struct TranscriptStore {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptStore {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// All entries in conversation order.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// The entry fragments may currently be merged into, if any.
    #[must_use]
    pub fn open_entry(&self) -> Option<&TranscriptEntry> {
        self.entries
            .last()
            .filter(|entry| entry.role() == TranscriptRole::Agent && !entry.is_finalized())
    }

    /// Owned copy of every entry, for presentation.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries.clone()
    }

    /// Append a finalized User entry, closing any open Agent entry.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.close_open();
        self.entries.push(TranscriptEntry::user(content));
    }

    /// Start a new open Agent entry, closing any open one.
    pub fn open_agent(&mut self, content: impl Into<String>) {
        self.close_open();
        self.entries.push(TranscriptEntry::open_agent(content));
    }

    /// Append a finalized Agent entry that later fragments will not extend.
    pub fn push_degraded_agent(&mut self, content: impl Into<String>) {
        self.close_open();
        self.entries.push(TranscriptEntry::finalized_agent(content));
    }

    /// Concatenate `text` onto the open entry.
    ///
    /// Returns `false` (and changes nothing) when no entry is open.
    pub fn append_to_open(&mut self, text: &str) -> bool {
        match self.entries.last_mut() {
            Some(entry) if entry.role() == TranscriptRole::Agent && !entry.is_finalized() => {
                entry.push_str(text);
                true
            }
            _ => false,
        }
    }

    fn close_open(&mut self) {
        if let Some(entry) = self.entries.last_mut() {
            entry.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_entry_closes_open_agent_entry() {
        let mut store = TranscriptStore::new();
        store.open_agent("A");
        assert!(store.open_entry().is_some());

        store.push_user("hi");
        assert!(store.open_entry().is_none());
        assert!(store.entries().iter().all(TranscriptEntry::is_finalized));
        assert!(!store.append_to_open("more"));
        assert_eq!(store.entries()[0].content(), "A");
    }

    #[test]
    fn test_append_extends_only_the_last_open_entry() {
        let mut store = TranscriptStore::new();
        store.open_agent("Hel");
        assert!(store.append_to_open("lo"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.last().map(TranscriptEntry::content), Some("Hello"));
    }

    #[test]
    fn test_degraded_entry_is_never_extended() {
        let mut store = TranscriptStore::new();
        store.push_degraded_agent("\u{fffd}");
        assert!(store.open_entry().is_none());
        assert!(!store.append_to_open("x"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut store = TranscriptStore::new();
        store.open_agent("A");
        let snapshot = store.snapshot();
        store.append_to_open("B");
        assert_eq!(snapshot[0].content(), "A");
        assert_eq!(store.entries()[0].content(), "AB");
    }
}
