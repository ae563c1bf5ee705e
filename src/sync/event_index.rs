// Merge state behind the event cache
// Keyed by document identity, so the same event reported by both live queries
// occupies a single slot.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::core::DocumentId;
use crate::models::{ChangeKind, DocumentChange, Event};

#[derive(Debug, Clone)]
struct Slot {
    event: Event,
    /// Order of first appearance; breaks ties between equal `date_time`s
    seq: u64,
}

#[derive(Debug, Default)]
pub struct EventIndex {
    slots: HashMap<DocumentId, Slot>,
    next_seq: u64,
}

/// What one batch did to the index
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub upserted: usize,
    pub removed: usize,
    pub dropped: usize,
}

impl BatchOutcome {
    pub fn changed(&self) -> bool {
        self.upserted + self.removed > 0
    }
}

impl EventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.slots.contains_key(id)
    }

    /// Apply changes in order. Undecodable documents are skipped; the rest of
    /// the batch still applies.
    pub fn apply<'a>(&mut self, changes: impl IntoIterator<Item = &'a DocumentChange>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for change in changes {
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    match Event::from_document(&change.document_id, &change.document) {
                        Ok(event) => {
                            self.upsert(event);
                            outcome.upserted += 1;
                        }
                        Err(err) => {
                            warn!("dropping event {}: {}", change.document_id, err);
                            outcome.dropped += 1;
                        }
                    }
                }
                ChangeKind::Removed => {
                    if self.remove(&change.document_id).is_some() {
                        outcome.removed += 1;
                    } else {
                        debug!("removal of unknown event {} ignored", change.document_id);
                    }
                }
            }
        }
        outcome
    }

    pub fn upsert(&mut self, event: Event) {
        match self.slots.get_mut(&event.document_id) {
            Some(slot) => slot.event = event,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.slots.insert(event.document_id.clone(), Slot { event, seq });
            }
        }
    }

    pub fn remove(&mut self, id: &DocumentId) -> Option<Event> {
        self.slots.remove(id).map(|slot| slot.event)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Events ascending by `date_time`; equal instants keep first-seen order
    pub fn sorted(&self) -> Vec<Event> {
        let mut slots: Vec<&Slot> = self.slots.values().collect();
        slots.sort_by(|a, b| {
            a.event
                .date_time
                .cmp(&b.event.date_time)
                .then(a.seq.cmp(&b.seq))
        });
        slots.into_iter().map(|slot| slot.event.clone()).collect()
    }
}
