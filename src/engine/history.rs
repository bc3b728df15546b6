//! Caret history for stepping back over jumps.

use crate::document::Paragraph;

/// Oldest entries are dropped past this many positions.
pub const HISTORY_CAPACITY: usize = 100;

/// Positions the caret jumped between, oldest first.
///
/// Recording after stepping back discards the entries ahead of the
/// pointer, like a browser's back stack.
#[derive(Debug, Default)]
pub struct CaretHistory {
    entries: Vec<Paragraph>,
    ptr: usize,
}

impl CaretHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a caret move from `from` to `to`.
    pub fn record(&mut self, from: &Paragraph, to: &Paragraph) {
        self.entries.truncate(self.ptr);
        for position in [from, to] {
            let repeated = self
                .entries
                .last()
                .is_some_and(|last| same_place(last, position));
            if !repeated {
                self.entries.push(position.clone());
            }
        }
        if self.entries.len() > HISTORY_CAPACITY {
            let excess = self.entries.len() - HISTORY_CAPACITY;
            self.entries.drain(..excess);
        }
        self.ptr = self.entries.len();
    }

    /// Step back to the latest recorded position other than `current`.
    ///
    /// Positions in other documents are passed over. `None` once the
    /// history is exhausted; the pointer then stays at the oldest entry.
    pub fn go_back(&mut self, current: &Paragraph) -> Option<Paragraph> {
        while self.ptr > 0 {
            self.ptr -= 1;
            let entry = &self.entries[self.ptr];
            if entry.document_key() == current.document_key() && !same_place(entry, current) {
                return Some(entry.clone());
            }
        }
        None
    }
}

fn same_place(a: &Paragraph, b: &Paragraph) -> bool {
    a.document_key() == b.document_key() && a.same_position(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;

    #[test]
    fn test_back_over_recorded_jumps() {
        let doc = TextDocument::from_plain_text("a\nb\nc\nd");
        let at = |i| Paragraph::new(doc.cursor_at(i));
        let mut history = CaretHistory::new();
        history.record(&at(0), &at(2));
        history.record(&at(2), &at(3));
        assert_eq!(history.len(), 3);

        assert_eq!(history.go_back(&at(3)).map(|p| p.text()), Some("c".to_string()));
        assert_eq!(history.go_back(&at(2)).map(|p| p.text()), Some("a".to_string()));
        assert!(history.go_back(&at(0)).is_none());
    }

    #[test]
    fn test_record_after_back_drops_forward_entries() {
        let doc = TextDocument::from_plain_text("a\nb\nc\nd");
        let at = |i| Paragraph::new(doc.cursor_at(i));
        let mut history = CaretHistory::new();
        history.record(&at(0), &at(3));
        assert_eq!(history.go_back(&at(3)).map(|p| p.text()), Some("a".to_string()));
        history.record(&at(0), &at(1));
        assert_eq!(history.len(), 2);
        assert_eq!(history.go_back(&at(1)).map(|p| p.text()), Some("a".to_string()));
    }

    #[test]
    fn test_capacity_and_foreign_documents() {
        let doc = TextDocument::from_plain_text("a\nb");
        let other = TextDocument::from_plain_text("x\ny");
        let mut history = CaretHistory::new();
        for _ in 0..HISTORY_CAPACITY {
            history.record(&Paragraph::new(doc.cursor_at(0)), &Paragraph::new(doc.cursor_at(1)));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert!(history.go_back(&Paragraph::new(other.cursor_at(0))).is_none());
    }
}
