// In-memory document store with live queries
// Mirrors the hosted database closely enough to drive the sync layer in tests
// and in the demo binary.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::core::DocumentId;
use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::{DocumentStore, ListenerRegistration, Subscription};
use crate::models::{ChangeBatch, ChangeKind, Document, DocumentChange, QueryFilter};

type ListenerId = u64;

struct Listener {
    collection: String,
    filter: QueryFilter,
    sender: mpsc::UnboundedSender<ChangeBatch>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, BTreeMap<DocumentId, Document>>,
    listeners: HashMap<ListenerId, Listener>,
    next_listener: ListenerId,
}

impl StoreState {
    /// Replace (or remove, with `None`) one document and notify every live
    /// query on the collection whose result set is affected.
    fn write(&mut self, collection: &str, id: &DocumentId, next: Option<Document>) {
        let docs = self.collections.entry(collection.to_string()).or_default();
        let previous = match &next {
            Some(doc) => docs.insert(id.clone(), doc.clone()),
            None => docs.remove(id),
        };

        let mut closed = Vec::new();
        for (listener_id, listener) in &self.listeners {
            if listener.collection != collection {
                continue;
            }
            let was = previous
                .as_ref()
                .filter(|doc| listener.filter.matches(id, doc));
            let now = next.as_ref().filter(|doc| listener.filter.matches(id, doc));
            let change = match (was, now) {
                (None, Some(doc)) => DocumentChange::new(id.clone(), ChangeKind::Added, doc.clone()),
                (Some(_), Some(doc)) => {
                    DocumentChange::new(id.clone(), ChangeKind::Modified, doc.clone())
                }
                (Some(doc), None) => DocumentChange::new(id.clone(), ChangeKind::Removed, doc.clone()),
                (None, None) => continue,
            };
            if listener.sender.send(vec![change]).is_err() {
                closed.push(*listener_id);
            }
        }
        for listener_id in closed {
            self.listeners.remove(&listener_id);
        }
    }

    fn existing(&self, collection: &str, id: &DocumentId) -> AppResult<Document> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{}/{}", collection, id)))
    }
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MemoryRegistration {
    state: Weak<Mutex<StoreState>>,
    listener_id: ListenerId,
}

impl ListenerRegistration for MemoryRegistration {
    fn remove(&self) {
        if let Some(state) = self.state.upgrade() {
            lock(&state).listeners.remove(&self.listener_id);
        }
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
    fail_deletes: AtomicBool,
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("InMemoryDocumentStore")
            .field("collections", &state.collections.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delete fail, as a rejected remote call would
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Write a document as-is, bypassing any typed encoding
    pub fn put_raw(&self, collection: &str, id: impl Into<DocumentId>, document: Document) {
        lock(&self.state).write(collection, &id.into(), Some(document));
    }

    /// Number of live queries currently registered on a collection
    pub fn listener_count(&self, collection: &str) -> usize {
        lock(&self.state)
            .listeners
            .values()
            .filter(|l| l.collection == collection)
            .count()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        lock(&self.state)
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn update_array(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        apply: impl FnOnce(&mut Vec<Value>),
    ) -> AppResult<()> {
        let mut state = lock(&self.state);
        let mut doc = state.existing(collection, id)?;
        let mut items = match doc.remove(field) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        apply(&mut items);
        doc.insert(field.to_string(), Value::Array(items));
        state.write(collection, id, Some(doc));
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    #[instrument(skip(self))]
    async fn subscribe(&self, collection: &str, filter: QueryFilter) -> AppResult<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);

        let initial: ChangeBatch = state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(id, doc)| filter.matches(id, doc))
                    .map(|(id, doc)| DocumentChange::new(id.clone(), ChangeKind::Added, doc.clone()))
                    .collect()
            })
            .unwrap_or_default();
        debug!("live query on {} starts with {} documents", collection, initial.len());
        sender
            .send(initial)
            .map_err(|_| AppError::Store("listener closed before first snapshot".to_string()))?;

        let listener_id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(
            listener_id,
            Listener {
                collection: collection.to_string(),
                filter,
                sender,
            },
        );

        let registration = MemoryRegistration {
            state: Arc::downgrade(&self.state),
            listener_id,
        };
        Ok(Subscription::new(receiver, Box::new(registration)))
    }

    async fn get(&self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>> {
        Ok(lock(&self.state)
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    #[instrument(skip(self, document))]
    async fn add(&self, collection: &str, document: Document) -> AppResult<DocumentId> {
        let id = DocumentId::generate();
        lock(&self.state).write(collection, &id, Some(document));
        debug!("added {}/{}", collection, id);
        Ok(id)
    }

    #[instrument(skip(self, fields))]
    async fn merge(&self, collection: &str, id: &DocumentId, fields: Document) -> AppResult<()> {
        let mut state = lock(&self.state);
        let mut doc = state.existing(collection, id)?;
        doc.extend(fields);
        state.write(collection, id, Some(doc));
        Ok(())
    }

    #[instrument(skip(self, fields))]
    async fn upsert(&self, collection: &str, id: &DocumentId, fields: Document) -> AppResult<()> {
        let mut state = lock(&self.state);
        let mut doc = state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .unwrap_or_default();
        doc.extend(fields);
        state.write(collection, id, Some(doc));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn array_union(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        values: &[String],
    ) -> AppResult<()> {
        self.update_array(collection, id, field, |items| {
            for value in values {
                if !items.iter().any(|item| item.as_str() == Some(value.as_str())) {
                    items.push(Value::from(value.as_str()));
                }
            }
        })
    }

    #[instrument(skip(self))]
    async fn array_remove(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        values: &[String],
    ) -> AppResult<()> {
        self.update_array(collection, id, field, |items| {
            items.retain(|item| !values.iter().any(|v| item.as_str() == Some(v.as_str())));
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, id: &DocumentId) -> AppResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            warn!("rejecting delete of {}/{}", collection, id);
            return Err(AppError::Store(format!("delete of {}/{} rejected", collection, id)));
        }
        lock(&self.state).write(collection, id, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn first_batch_is_the_current_result_set() {
        let store = InMemoryDocumentStore::new();
        store.put_raw("events", "a", doc(json!({"attendees": ["u1"]})));
        store.put_raw("events", "b", doc(json!({"attendees": ["u2"]})));

        let mut sub = store
            .subscribe("events", QueryFilter::array_contains("attendees", "u1"))
            .await
            .unwrap();
        let first = sub.next_batch().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].document_id, DocumentId::from("a"));
        assert_eq!(first[0].kind, ChangeKind::Added);
    }

    #[tokio::test]
    async fn changes_are_relative_to_the_filter() {
        let store = InMemoryDocumentStore::new();
        let mut sub = store
            .subscribe("events", QueryFilter::array_contains("attendees", "u1"))
            .await
            .unwrap();
        assert!(sub.next_batch().await.unwrap().is_empty());

        let id = store.add("events", doc(json!({"attendees": ["u2"]}))).await.unwrap();
        store
            .array_union("events", &id, "attendees", &["u1".to_string()])
            .await
            .unwrap();
        store
            .merge("events", &id, doc(json!({"name": "x"})))
            .await
            .unwrap();
        store
            .array_remove("events", &id, "attendees", &["u1".to_string()])
            .await
            .unwrap();

        let kinds: Vec<ChangeKind> = [
            sub.next_batch().await.unwrap(),
            sub.next_batch().await.unwrap(),
            sub.next_batch().await.unwrap(),
        ]
        .iter()
        .map(|batch| batch[0].kind)
        .collect();
        assert_eq!(kinds, vec![ChangeKind::Added, ChangeKind::Modified, ChangeKind::Removed]);
    }

    #[tokio::test]
    async fn subscription_is_a_stream_of_batches() {
        use futures::StreamExt;

        let store = InMemoryDocumentStore::new();
        store.put_raw("events", "a", doc(json!({"attendees": ["u1"]})));
        let sub = store
            .subscribe("events", QueryFilter::array_contains("attendees", "u1"))
            .await
            .unwrap();
        store.put_raw("events", "a", doc(json!({"attendees": ["u1"], "name": "x"})));

        let batches: Vec<ChangeBatch> = sub.take(2).collect().await;
        assert_eq!(batches[0][0].kind, ChangeKind::Added);
        assert_eq!(batches[1][0].kind, ChangeKind::Modified);
        assert_eq!(store.listener_count("events"), 0);
    }

    #[tokio::test]
    async fn unsubscribe_releases_the_listener() {
        let store = InMemoryDocumentStore::new();
        let mut sub = store
            .subscribe("events", QueryFilter::array_contains("attendees", "u1"))
            .await
            .unwrap();
        assert_eq!(store.listener_count("events"), 1);
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(store.listener_count("events"), 0);

        let other = store
            .subscribe("events", QueryFilter::array_contains("attendees", "u1"))
            .await
            .unwrap();
        drop(other);
        assert_eq!(store.listener_count("events"), 0);
    }

    #[tokio::test]
    async fn merge_on_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .merge("events", &"nope".into(), Document::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        // deletes of missing documents succeed, like the hosted store
        store.delete("events", &"nope".into()).await.unwrap();
    }

    #[tokio::test]
    async fn union_skips_values_already_present() {
        let store = InMemoryDocumentStore::new();
        store.put_raw("events", "a", doc(json!({"attendees": ["u1"]})));
        store
            .array_union("events", &"a".into(), "attendees", &["u1".into(), "u2".into()])
            .await
            .unwrap();
        let stored = store.get("events", &"a".into()).await.unwrap().unwrap();
        assert_eq!(stored["attendees"], json!(["u1", "u2"]));
    }
}
