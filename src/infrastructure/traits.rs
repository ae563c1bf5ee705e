use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::core::DocumentId;
use crate::error::AppResult;
use crate::models::{ChangeBatch, Document, QueryFilter};

/// Remote document store with live queries. Stands in for the hosted database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Start a live query. The first batch holds every matching document as
    /// `Added`; later batches report changes relative to the filter.
    async fn subscribe(&self, collection: &str, filter: QueryFilter) -> AppResult<Subscription>;

    async fn get(&self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>>;

    /// Write a new document; the store assigns its identity
    async fn add(&self, collection: &str, document: Document) -> AppResult<DocumentId>;

    /// Overwrite the given fields of an existing document
    async fn merge(&self, collection: &str, id: &DocumentId, fields: Document) -> AppResult<()>;

    /// Like `merge`, but creates the document when it does not exist
    async fn upsert(&self, collection: &str, id: &DocumentId, fields: Document) -> AppResult<()>;

    /// Append values missing from an array field
    async fn array_union(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        values: &[String],
    ) -> AppResult<()>;

    /// Remove every occurrence of the values from an array field
    async fn array_remove(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        values: &[String],
    ) -> AppResult<()>;

    async fn delete(&self, collection: &str, id: &DocumentId) -> AppResult<()>;
}

/// Releases a live query on the store side
pub trait ListenerRegistration: Send + Sync {
    fn remove(&self);
}

/// Receiving end of a live query. Delivery stops on `unsubscribe` or drop.
pub struct Subscription {
    batches: mpsc::UnboundedReceiver<ChangeBatch>,
    registration: Option<Box<dyn ListenerRegistration>>,
}

impl Subscription {
    pub fn new(
        batches: mpsc::UnboundedReceiver<ChangeBatch>,
        registration: Box<dyn ListenerRegistration>,
    ) -> Self {
        Self {
            batches,
            registration: Some(registration),
        }
    }

    /// Next batch, or `None` once the query has ended
    pub async fn next_batch(&mut self) -> Option<ChangeBatch> {
        self.batches.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_some()
    }

    /// Safe to call more than once
    pub fn unsubscribe(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
        self.batches.close();
    }
}

impl Stream for Subscription {
    type Item = ChangeBatch;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().batches.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
