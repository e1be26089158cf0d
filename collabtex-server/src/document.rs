//! Versioned document model with operational-transform-style rebasing.
//!
//! A [`Document`] holds one active [`Paragraph`] plus the full history of
//! mutations applied to it. Clients submit edits against whatever version
//! they last observed; [`Document::insert`] and [`Document::delete`] rebase
//! the edit's position against every mutation committed since, so that an
//! edit produced against a stale snapshot still lands in the right place.

use chrono::{DateTime, Utc};

/// Identifier for a paragraph within a document. The core protocol only
/// ever uses a single paragraph per document, but the type stays distinct
/// from a bare index so a future multi-paragraph layout doesn't need to
/// renumber anything.
pub type ParagraphId = u64;

/// A unit of logical grouping within a document. Paragraphs do not affect
/// merge semantics; a document's rebase rules operate on the text of its
/// single active paragraph.
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub id: ParagraphId,
    pub text: String,
}

/// One committed mutation, indexed by the version in effect after it
/// applied. `history[v]` is the mutation that took the document from
/// version `v` to version `v + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    Insert { pos: usize, text: String },
    Delete { pos: usize, len: usize },
}

/// A single collaboratively-edited document.
pub struct Document {
    /// Unique across the server; enforced at creation time by the registry.
    pub name: String,
    /// User name recorded at creation.
    pub creator: String,
    paragraphs: Vec<Paragraph>,
    /// Monotonically increasing; starts at 0, incremented on every
    /// successful mutation.
    pub version: u64,
    history: Vec<MutationRecord>,
    /// Every user name that has ever opened this document, in first-open
    /// order. Never shrinks: this is "online collaborators" in name only.
    collaborators: Vec<String>,
    chat: String,
    last_edit: DateTime<Utc>,
}

impl Document {
    /// Create a new, empty document. The creator is recorded both as
    /// `creator` and as the first entry in the collaborator list, matching
    /// `newDoc`'s behavior of adding the caller as first collaborator.
    pub fn new(name: impl Into<String>, creator: impl Into<String>) -> Self {
        let creator = creator.into();
        Self {
            name: name.into(),
            paragraphs: vec![Paragraph {
                id: 0,
                text: String::new(),
            }],
            version: 0,
            history: Vec::new(),
            collaborators: vec![creator.clone()],
            chat: String::new(),
            last_edit: Utc::now(),
            creator,
        }
    }

    /// The current text of the document's single active paragraph.
    pub fn text(&self) -> &str {
        &self.paragraphs[0].text
    }

    /// Every user name that has ever opened this document.
    pub fn collaborators(&self) -> &[String] {
        &self.collaborators
    }

    /// `collaborators()`, comma-joined, for wire responses.
    pub fn collaborators_csv(&self) -> String {
        self.collaborators.join(",")
    }

    /// Number of mutations applied so far; `history.len()` always equals
    /// `version`.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Appends `name` to the collaborator list if it isn't already present.
    /// Idempotent: opening the same document twice as the same user never
    /// duplicates the entry.
    pub fn add_collaborator(&mut self, name: &str) {
        if !self.collaborators.iter().any(|c| c == name) {
            self.collaborators.push(name.to_string());
        }
    }

    /// The full chat transcript, `"<user> : <line>\n"` per entry.
    pub fn chat(&self) -> &str {
        &self.chat
    }

    /// Appends one already-newline-terminated chat line.
    pub fn append_chat(&mut self, user: &str, line: &str) {
        self.chat.push_str(user);
        self.chat.push_str(" : ");
        self.chat.push_str(line);
        if !line.ends_with('\n') {
            self.chat.push('\n');
        }
    }

    /// `lastEdit` formatted as `"H:MM AM|PM , MM/DD"`.
    pub fn date(&self) -> String {
        format_timestamp(self.last_edit)
    }

    /// Rebases `pos` against every mutation committed strictly after
    /// `client_version`, per the insertion/deletion rules in the core
    /// spec. When `client_version` equals the current version this is the
    /// identity transform.
    fn rebase_position(&self, mut pos: usize, client_version: u64) -> usize {
        let start = (client_version as usize).min(self.history.len());
        for mutation in &self.history[start..] {
            match mutation {
                MutationRecord::Insert { pos: p, text } => {
                    if *p <= pos {
                        pos += char_len(text);
                    }
                }
                MutationRecord::Delete { pos: p, len } => {
                    if p + len <= pos {
                        pos -= len;
                    } else if *p >= pos {
                        // no change
                    } else {
                        // deletion straddles pos; snap to its start
                        pos = *p;
                    }
                }
            }
        }
        pos
    }

    /// Rebase-and-apply an insertion submitted against `client_version`.
    /// Returns the rebased position and the new document version.
    pub fn insert(&mut self, pos: usize, text: &str, client_version: u64) -> (usize, u64) {
        let mut pos = self.rebase_position(pos, client_version);
        let len = char_len(self.text());
        pos = pos.min(len);
        insert_at(&mut self.paragraphs[0].text, pos, text);
        self.history.push(MutationRecord::Insert {
            pos,
            text: text.to_string(),
        });
        self.version += 1;
        self.last_edit = Utc::now();
        (pos, self.version)
    }

    /// Rebase-and-apply a deletion submitted against `client_version`.
    /// Returns the rebased position, the clamped length actually removed,
    /// and the new document version. A deletion that rebases to a zero
    /// length is still recorded and still bumps the version, so clients
    /// observe a version tick even for a no-op.
    pub fn delete(&mut self, pos: usize, length: usize, client_version: u64) -> (usize, usize, u64) {
        let mut pos = self.rebase_position(pos, client_version);
        let len = char_len(self.text());
        pos = pos.min(len);
        let length = length.min(len - pos);
        if length > 0 {
            delete_at(&mut self.paragraphs[0].text, pos, length);
        }
        self.history.push(MutationRecord::Delete { pos, len: length });
        self.version += 1;
        self.last_edit = Utc::now();
        (pos, length, self.version)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn byte_offset(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .nth(char_pos)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn insert_at(s: &mut String, pos: usize, text: &str) {
    let idx = byte_offset(s, pos);
    s.insert_str(idx, text);
}

fn delete_at(s: &mut String, pos: usize, len: usize) {
    let start = byte_offset(s, pos);
    let end = byte_offset(s, pos + len);
    s.replace_range(start..end, "");
}

/// Formats a timestamp as `"H:MM AM|PM , MM/DD"` in UTC.
fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format("%-I:%M %p , %m/%d").to_string()
}

#[cfg(test)]
impl Document {
    /// Test-only helper: seed the document's text without recording a
    /// mutation, as if it already held this content at version 0.
    fn seed_text(&mut self, text: &str) {
        self.paragraphs[0].text = text.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebase_identity_at_current_version() {
        let mut doc = Document::new("paper", "alice");
        doc.insert(0, "abc", 0);
        let (pos, version) = doc.insert(3, "!", doc.version);
        assert_eq!(pos, 3);
        assert_eq!(version, 2);
        assert_eq!(doc.text(), "abc!");
    }

    #[test]
    fn concurrent_inserts_at_same_position_converge() {
        let mut doc = Document::new("paper", "alice");
        doc.insert(0, "abc", 0);
        assert_eq!(doc.version, 1);

        // Alice's insert, issued against v1, applies first and becomes v2.
        doc.insert(1, "X", 1);
        assert_eq!(doc.text(), "aXbc");

        // Bob's insert, also issued against v1 but dequeued second, rebases
        // past Alice's insertion at the same position and becomes v3.
        let (pos, version) = doc.insert(1, "Y", 1);
        assert_eq!(pos, 2);
        assert_eq!(version, 3);
        assert_eq!(doc.text(), "aXYbc");
    }

    #[test]
    fn insert_vs_delete_rebase_converges() {
        // Text "hello" already present at v=0 (scenario 4 from the spec).
        let mut doc = Document::new("paper", "alice");
        doc.seed_text("hello");

        // A: insert "!" at the end, against v0 -> applied first.
        let (pos, version) = doc.insert(5, "!", 0);
        assert_eq!((pos, version), (5, 1));
        assert_eq!(doc.text(), "hello!");

        // B: delete(0, 2) issued against v0, rebased against A's insert.
        let (pos, len, version) = doc.delete(0, 2, 0);
        assert_eq!((pos, len, version), (0, 2, 2));
        assert_eq!(doc.text(), "llo!");
    }

    #[test]
    fn deletion_straddling_position_snaps_to_start() {
        let mut doc = Document::new("paper", "alice");
        doc.seed_text("hello world");
        // A deletes "hello " (0..6) against v0.
        doc.delete(0, 6, 0);
        assert_eq!(doc.text(), "world");
        // B inserts at position 3 against v0, which straddled A's delete
        // range [0,6); it should snap to the deletion's start, position 0.
        let (pos, _) = doc.insert(3, "X", 0);
        assert_eq!(pos, 0);
        assert_eq!(doc.text(), "Xworld");
    }

    #[test]
    fn delete_rebasing_to_zero_length_still_bumps_version() {
        let mut doc = Document::new("paper", "alice");
        doc.seed_text("ab");
        doc.delete(0, 2, 0);
        assert_eq!(doc.text(), "");
        let before = doc.version;
        let (_, len, version) = doc.delete(0, 2, 0);
        assert_eq!(len, 0);
        assert_eq!(version, before + 1);
    }

    #[test]
    fn history_length_tracks_version() {
        let mut doc = Document::new("paper", "alice");
        doc.insert(0, "abc", 0);
        doc.delete(0, 1, doc.version);
        assert_eq!(doc.history_len() as u64, doc.version);
    }

    #[test]
    fn idempotent_open_does_not_duplicate_collaborator() {
        let mut doc = Document::new("paper", "alice");
        doc.add_collaborator("bob");
        doc.add_collaborator("bob");
        assert_eq!(doc.collaborators(), &["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn chat_append_matches_expected_suffix() {
        let mut doc = Document::new("paper", "alice");
        doc.append_chat("alice", "hi");
        assert!(doc.chat().ends_with("alice : hi\n"));
    }

    #[test]
    fn unicode_text_rebases_by_char_count_not_bytes() {
        let mut doc = Document::new("paper", "alice");
        doc.insert(0, "h\u{1F389}e", 0); // "h🎉e"
        let (pos, _) = doc.insert(3, "!", doc.version);
        assert_eq!(pos, 3);
        assert_eq!(doc.text(), "h\u{1F389}e!");
    }
}
