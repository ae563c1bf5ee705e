// Event Synchronization Cache
// Merges the "attending" and "invited" live queries of one user into a single
// de-duplicated, date-ordered list that observers read through a watch channel.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::StoreConfig;
use crate::core::{DocumentId, UserId};
use crate::error::AppResult;
use crate::infrastructure::traits::{DocumentStore, Subscription};
use crate::models::event::fields;
use crate::models::{DocumentChange, Event, QueryFilter};
use crate::sync::event_index::EventIndex;

/// The published, date-ordered list of events
pub type EventList = Arc<Vec<Event>>;

/// Which live query a batch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    Attending,
    Invited,
}

impl QuerySource {
    fn field(self) -> &'static str {
        match self {
            QuerySource::Attending => fields::ATTENDEES,
            QuerySource::Invited => fields::INVITED_USERS,
        }
    }
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySource::Attending => write!(f, "attending"),
            QuerySource::Invited => write!(f, "invited"),
        }
    }
}

#[derive(Default)]
struct CacheState {
    index: EventIndex,
    /// Bumped by every start and stop; workers from an older generation are inert
    generation: u64,
    running: bool,
    workers: Vec<JoinHandle<()>>,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared between the cache handle and its per-query workers. Every mutation
/// of the index and every publish happens under the one lock.
struct Shared {
    state: Mutex<CacheState>,
    publisher: watch::Sender<EventList>,
}

impl Shared {
    fn publish(&self, state: &CacheState) {
        self.publisher.send_replace(Arc::new(state.index.sorted()));
    }

    /// Apply one batch if `generation` is still current. Returns false once
    /// the worker should exit.
    fn apply_batch(&self, generation: u64, source: QuerySource, batch: &[DocumentChange]) -> bool {
        let mut state = lock(&self.state);
        if state.generation != generation {
            debug!("discarding late {} batch of {} changes", source, batch.len());
            return false;
        }
        let outcome = state.index.apply(batch);
        if outcome.changed() {
            self.publish(&state);
        }
        debug!(
            source = %source,
            upserted = outcome.upserted,
            removed = outcome.removed,
            dropped = outcome.dropped,
            "applied change batch"
        );
        true
    }

    /// End the current generation and hand back its workers
    fn halt(&self) -> Vec<JoinHandle<()>> {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.running = false;
        std::mem::take(&mut state.workers)
    }
}

pub struct EventSyncCache {
    store: Arc<dyn DocumentStore>,
    collection: String,
    shared: Arc<Shared>,
}

impl fmt::Debug for EventSyncCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("EventSyncCache")
            .field("collection", &self.collection)
            .field("running", &state.running)
            .field("events", &state.index.len())
            .finish()
    }
}

impl EventSyncCache {
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Self {
        let (publisher, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            store,
            collection: config.events_collection.clone(),
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState::default()),
                publisher,
            }),
        }
    }

    /// Observe the published list. Each value is a complete batch result.
    pub fn subscribe(&self) -> watch::Receiver<EventList> {
        self.shared.publisher.subscribe()
    }

    /// Current published list
    pub fn events(&self) -> EventList {
        self.shared.publisher.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    /// Follow the events `user` attends or is invited to. Without a signed-in
    /// user this does nothing at all, including to a run already in progress.
    /// Restarting for a user replaces the previous queries.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn start(&self, user: Option<&UserId>) -> AppResult<()> {
        let Some(user) = user else {
            debug!("no signed-in user; event sync left as is");
            return Ok(());
        };

        abort_all(self.shared.halt());

        let generation = {
            let mut state = lock(&self.shared.state);
            if !state.index.is_empty() {
                state.index.clear();
                self.shared.publish(&state);
            }
            state.generation
        };

        let attending = self.open(QuerySource::Attending, user).await?;
        let invited = self.open(QuerySource::Invited, user).await?;

        let mut state = lock(&self.shared.state);
        if state.generation != generation {
            // stopped or restarted while the queries were opening
            debug!("event sync for {} superseded before it began", user);
            return Ok(());
        }
        state.running = true;
        for (source, subscription) in [
            (QuerySource::Attending, attending),
            (QuerySource::Invited, invited),
        ] {
            let shared = Arc::clone(&self.shared);
            state
                .workers
                .push(tokio::spawn(consume(shared, generation, source, subscription)));
        }
        info!("event sync started for {}", user);
        Ok(())
    }

    async fn open(&self, source: QuerySource, user: &UserId) -> AppResult<Subscription> {
        let filter = QueryFilter::array_contains(source.field(), user.as_str());
        self.store.subscribe(&self.collection, filter).await
    }

    /// Apply a batch directly, as a live query would. Ignored while stopped.
    pub fn on_change_batch(&self, batch: &[DocumentChange]) {
        let mut state = lock(&self.shared.state);
        if !state.running {
            debug!("cache stopped; ignoring batch of {} changes", batch.len());
            return;
        }
        if state.index.apply(batch).changed() {
            self.shared.publish(&state);
        }
    }

    /// Remove the event locally right away, then ask the store to delete it.
    /// A failed remote delete is logged and the local removal stands.
    /// The returned handle resolves with the remote outcome.
    pub fn delete(&self, id: &DocumentId) -> JoinHandle<AppResult<()>> {
        {
            let mut state = lock(&self.shared.state);
            if state.running && state.index.remove(id).is_some() {
                self.shared.publish(&state);
            }
        }

        let store = Arc::clone(&self.store);
        let collection = self.collection.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let result = store.delete(&collection, &id).await;
            match &result {
                Ok(()) => debug!("deleted event {}", id),
                Err(err) => error!("Error deleting event {}: {}", id, err),
            }
            result
        })
    }

    /// Release both live queries. After this returns the published list no
    /// longer changes. Safe to call repeatedly.
    pub fn stop(&self) {
        let workers = self.shared.halt();
        if !workers.is_empty() {
            info!("event sync stopped");
        }
        abort_all(workers);
    }

    /// `stop`, then wait until the workers (and their queries) are gone
    pub async fn shutdown(&self) {
        for worker in self.shared.halt() {
            worker.abort();
            let _ = worker.await;
        }
    }
}

impl Drop for EventSyncCache {
    fn drop(&mut self) {
        self.stop();
    }
}

fn abort_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        worker.abort();
    }
}

async fn consume(
    shared: Arc<Shared>,
    generation: u64,
    source: QuerySource,
    mut subscription: Subscription,
) {
    while let Some(batch) = subscription.next().await {
        if !shared.apply_batch(generation, source, &batch) {
            break;
        }
    }
    if lock(&shared.state).generation == generation {
        // the store ended the query; the list simply stops updating
        warn!("{} live query ended", source);
    }
    subscription.unsubscribe();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::infrastructure::memory_store::InMemoryDocumentStore;
    use crate::models::{ChangeKind, Document};
    use serde_json::json;
    use std::time::Duration;

    fn event_doc(name: &str, at: &str, attendees: &[&str], invited: &[&str]) -> Document {
        json!({
            "name": name,
            "address": "here",
            "theme": "",
            "dateTime": at,
            "hostUid": "host",
            "attendees": attendees,
            "invitedUsers": invited,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn setup() -> (Arc<InMemoryDocumentStore>, EventSyncCache) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cache = EventSyncCache::new(store.clone(), &Config::default().store);
        (store, cache)
    }

    async fn wait_for(rx: &mut watch::Receiver<EventList>, len: usize) -> EventList {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let current = rx.borrow_and_update().clone();
                if current.len() == len {
                    return current;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for publish")
    }

    #[tokio::test]
    async fn start_without_user_is_a_no_op() {
        let (store, cache) = setup();
        cache.start(None).await.unwrap();
        assert!(!cache.is_running());
        assert_eq!(store.listener_count("events"), 0);
    }

    #[tokio::test]
    async fn start_without_user_leaves_a_running_cache_alone() {
        let (store, cache) = setup();
        store.put_raw("events", "e1", event_doc("E1", "2025-01-02T00:00:00Z", &["u1"], &[]));
        let mut rx = cache.subscribe();
        cache.start(Some(&"u1".into())).await.unwrap();
        wait_for(&mut rx, 1).await;

        cache.start(None).await.unwrap();
        assert!(cache.is_running());
        assert_eq!(store.listener_count("events"), 2);
        assert_eq!(cache.events().len(), 1);

        store.put_raw("events", "e2", event_doc("E2", "2025-01-03T00:00:00Z", &["u1"], &[]));
        let events = wait_for(&mut rx, 2).await;
        assert_eq!(events[1].name, "E2");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn merges_both_queries_without_duplicates() {
        let (store, cache) = setup();
        store.put_raw("events", "both", event_doc("Both", "2025-01-02T00:00:00Z", &["u1"], &["u1"]));
        store.put_raw("events", "inv", event_doc("Inv", "2025-01-01T00:00:00Z", &["host"], &["u1"]));
        store.put_raw("events", "other", event_doc("Other", "2025-01-01T00:00:00Z", &["u2"], &[]));

        let mut rx = cache.subscribe();
        cache.start(Some(&"u1".into())).await.unwrap();
        assert_eq!(store.listener_count("events"), 2);

        let events = wait_for(&mut rx, 2).await;
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Inv", "Both"]);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn delete_is_optimistic_even_when_remote_fails() {
        let (store, cache) = setup();
        store.put_raw("events", "e1", event_doc("E1", "2025-01-02T00:00:00Z", &["u1"], &[]));
        let mut rx = cache.subscribe();
        cache.start(Some(&"u1".into())).await.unwrap();
        wait_for(&mut rx, 1).await;

        store.set_fail_deletes(true);
        let remote = cache.delete(&"e1".into());
        // gone before the remote call has been awaited
        assert!(cache.events().is_empty());
        assert!(remote.await.unwrap().is_err());
        assert!(cache.events().is_empty());
        assert_eq!(store.document_count("events"), 1);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_final() {
        let (store, cache) = setup();
        let mut rx = cache.subscribe();
        cache.start(Some(&"u1".into())).await.unwrap();
        store.put_raw("events", "e1", event_doc("E1", "2025-01-02T00:00:00Z", &["u1"], &[]));
        wait_for(&mut rx, 1).await;

        cache.stop();
        cache.stop();
        assert!(!cache.is_running());

        store.put_raw("events", "e2", event_doc("E2", "2025-01-03T00:00:00Z", &["u1"], &[]));
        cache.on_change_batch(&[DocumentChange::new(
            "e3",
            ChangeKind::Added,
            event_doc("E3", "2025-01-03T00:00:00Z", &["u1"], &[]),
        )]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.events().len(), 1);

        cache.shutdown().await;
        assert_eq!(store.listener_count("events"), 0);
    }

    #[tokio::test]
    async fn restart_for_another_user_replaces_the_list() {
        let (store, cache) = setup();
        store.put_raw("events", "a", event_doc("A", "2025-01-02T00:00:00Z", &["u1"], &[]));
        store.put_raw("events", "b", event_doc("B", "2025-01-02T00:00:00Z", &["u2"], &[]));
        let mut rx = cache.subscribe();

        cache.start(Some(&"u1".into())).await.unwrap();
        assert_eq!(wait_for(&mut rx, 1).await[0].name, "A");

        cache.start(Some(&"u2".into())).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let current = rx.borrow_and_update().clone();
                if current.len() == 1 && current[0].name == "B" {
                    break;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        cache.shutdown().await;
        assert_eq!(store.listener_count("events"), 0);
    }
}
