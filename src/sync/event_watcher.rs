// Live view of a single event, for detail screens

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::core::DocumentId;
use crate::error::AppResult;
use crate::infrastructure::traits::{DocumentStore, Subscription};
use crate::models::{ChangeKind, Event, QueryFilter};

#[derive(Debug)]
pub struct EventWatcher {
    document_id: DocumentId,
    current: watch::Receiver<Option<Event>>,
    worker: Option<JoinHandle<()>>,
}

impl EventWatcher {
    /// Follow one event document. Publishes `None` until a valid version is
    /// seen and again after the event is deleted. Undecodable updates keep
    /// the last good version.
    pub async fn watch(
        store: Arc<dyn DocumentStore>,
        config: &StoreConfig,
        document_id: DocumentId,
    ) -> AppResult<Self> {
        let subscription = store
            .subscribe(
                &config.events_collection,
                QueryFilter::DocumentId(document_id.clone()),
            )
            .await?;
        let (publisher, current) = watch::channel(None);
        let worker = tokio::spawn(follow(subscription, publisher));
        Ok(Self {
            document_id,
            current,
            worker: Some(worker),
        })
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn current(&self) -> Option<Event> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Event>> {
        self.current.clone()
    }

    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn follow(mut subscription: Subscription, publisher: watch::Sender<Option<Event>>) {
    while let Some(batch) = subscription.next_batch().await {
        for change in batch {
            match change.kind {
                ChangeKind::Removed => {
                    debug!("event {} removed", change.document_id);
                    publisher.send_replace(None);
                }
                ChangeKind::Added | ChangeKind::Modified => {
                    match Event::from_document(&change.document_id, &change.document) {
                        Ok(event) => {
                            publisher.send_replace(Some(event));
                        }
                        Err(err) => warn!("ignoring update to {}: {}", change.document_id, err),
                    }
                }
            }
        }
    }
}
