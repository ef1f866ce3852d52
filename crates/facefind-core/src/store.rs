//! Shared match state: a single in-memory slot holding the last successful match.
//!
//! Built on a `tokio::sync::watch` channel: the slot is replaced wholesale on
//! every write (last write wins), readers can be cloned freely, and the one
//! writer handle is not `Clone`, so only its owner (the login workflow) can
//! ever write. Nothing is persisted.

use crate::types::MatchData;
use std::sync::Arc;
use tokio::sync::watch;

type Slot = Option<Arc<MatchData>>;

/// Create an empty slot, returning its single writer and a reader.
pub fn match_store() -> (MatchWriter, MatchReader) {
    let (tx, rx) = watch::channel::<Slot>(None);
    (MatchWriter { tx }, MatchReader { rx })
}

/// Exclusive write access to the slot.
#[derive(Debug)]
pub struct MatchWriter {
    tx: watch::Sender<Slot>,
}

impl MatchWriter {
    /// Replace the stored match data.
    pub fn set(&self, data: MatchData) {
        tracing::debug!(matches = data.matches.len(), "match state replaced");
        // send_replace stores the value even when every reader has been dropped.
        self.tx.send_replace(Some(Arc::new(data)));
    }

    /// Another reader onto the same slot.
    pub fn reader(&self) -> MatchReader {
        MatchReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read access to the slot.
#[derive(Debug, Clone)]
pub struct MatchReader {
    rx: watch::Receiver<Slot>,
}

impl MatchReader {
    /// Current value, or `None` if no match has succeeded yet.
    pub fn get(&self) -> Option<Arc<MatchData>> {
        self.rx.borrow().clone()
    }

    /// Whether the slot was written since this reader last looked.
    ///
    /// A dropped writer counts as "no change": the last value stays readable.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Read the current value and mark it as seen.
    pub fn get_and_mark_seen(&mut self) -> Option<Arc<MatchData>> {
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Match, MatchSummary};

    fn sample(url: &str) -> MatchData {
        MatchData {
            matches: vec![Match {
                photo_url: url.into(),
                face_id: "f1".into(),
                bounding_box: [1.0, 2.0, 3.0, 4.0],
                confidence: 0.7,
            }],
            summary: MatchSummary {
                total_matched_photos: 1,
                total_faces_considered: 10,
                matching_threshold: 0.3,
            },
        }
    }

    #[test]
    fn test_starts_empty() {
        let (_writer, reader) = match_store();
        assert!(reader.get().is_none());
        assert!(!reader.has_changed());
    }

    #[test]
    fn test_set_replaces_wholesale() {
        let (writer, reader) = match_store();
        writer.set(sample("a.jpg"));
        writer.set(sample("b.jpg"));

        let current = reader.get().unwrap();
        assert_eq!(current.matches.len(), 1);
        assert_eq!(current.matches[0].photo_url, "b.jpg");
    }

    #[test]
    fn test_readers_share_the_slot() {
        let (writer, reader) = match_store();
        let other = reader.clone();
        let late = writer.reader();
        writer.set(sample("a.jpg"));
        assert_eq!(other.get().unwrap().matches[0].photo_url, "a.jpg");
        assert_eq!(late.get().unwrap().matches[0].photo_url, "a.jpg");
    }

    #[test]
    fn test_change_tracking() {
        let (writer, mut reader) = match_store();
        writer.set(sample("a.jpg"));
        assert!(reader.has_changed());

        let seen = reader.get_and_mark_seen().unwrap();
        assert_eq!(seen.matches[0].photo_url, "a.jpg");
        assert!(!reader.has_changed());

        writer.set(sample("b.jpg"));
        assert!(reader.has_changed());
    }

    #[test]
    fn test_value_survives_writer_drop() {
        let (writer, reader) = match_store();
        writer.set(sample("a.jpg"));
        drop(writer);
        assert!(reader.get().is_some());
        assert!(!reader.has_changed());
    }

    #[test]
    fn test_set_without_readers_is_kept() {
        let (writer, reader) = match_store();
        drop(reader);
        writer.set(sample("a.jpg"));
        assert!(writer.reader().get().is_some());
    }
}
