// EventService - host and guest operations on event documents
// Writes go straight to the store; open caches and watchers pick them up
// through their live queries.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::config::StoreConfig;
use crate::core::{DocumentId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::DocumentStore;
use crate::models::event::fields;
use crate::models::{Coordinates, Event, EventUpdate, NewEvent};

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl EventService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            collection: config.events_collection.clone(),
        }
    }

    /// Create an event hosted by `host`, who becomes its first attendee
    #[instrument(skip(self, draft))]
    pub async fn create_event(
        &self,
        host: Option<&UserId>,
        draft: NewEvent,
        coordinates: Option<Coordinates>,
    ) -> AppResult<DocumentId> {
        let host = host.ok_or(AppError::Unauthenticated)?;
        let document = draft.into_document(host, coordinates, Utc::now())?;
        let id = self.store.add(&self.collection, document).await?;
        info!("event {} created by {}", id, host);
        Ok(id)
    }

    pub async fn get_event(&self, id: &DocumentId) -> AppResult<Event> {
        let document = self
            .store
            .get(&self.collection, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;
        Ok(Event::from_document(id, &document)?)
    }

    #[instrument(skip(self))]
    pub async fn invite_user(&self, id: &DocumentId, invitee: &UserId) -> AppResult<()> {
        if invitee.as_str().trim().is_empty() {
            return Err(AppError::Validation("Invitee is required.".to_string()));
        }
        self.store
            .array_union(
                &self.collection,
                id,
                fields::INVITED_USERS,
                &[invitee.as_str().to_string()],
            )
            .await
    }

    /// Add `user` to the attendees. Their invitation, if any, is left in place.
    #[instrument(skip(self))]
    pub async fn join_event(&self, id: &DocumentId, user: &UserId) -> AppResult<()> {
        self.store
            .array_union(&self.collection, id, fields::ATTENDEES, &[user.as_str().to_string()])
            .await?;
        info!("{} joined event {}", user, id);
        Ok(())
    }

    /// Host-only. The host cannot be removed from their own event.
    #[instrument(skip(self))]
    pub async fn remove_attendee(
        &self,
        id: &DocumentId,
        acting: &UserId,
        attendee: &UserId,
    ) -> AppResult<()> {
        let event = self.host_checked(id, acting, "remove attendees").await?;
        if event.is_host(attendee) {
            return Err(AppError::Validation(
                "The host cannot be removed from their own event.".to_string(),
            ));
        }
        self.store
            .array_remove(&self.collection, id, fields::ATTENDEES, &[attendee.as_str().to_string()])
            .await
    }

    #[instrument(skip(self, update))]
    pub async fn update_event(
        &self,
        id: &DocumentId,
        acting: Option<&UserId>,
        update: EventUpdate,
    ) -> AppResult<()> {
        let acting = acting.ok_or(AppError::Unauthenticated)?;
        self.host_checked(id, acting, "update event details").await?;
        let changes = update.into_fields(Utc::now())?;
        self.store.merge(&self.collection, id, changes).await
    }

    /// Host-only remote delete. Cached lists should use `EventSyncCache::delete`
    /// so the event disappears locally first.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, id: &DocumentId, acting: &UserId) -> AppResult<()> {
        self.host_checked(id, acting, "delete the event").await?;
        self.store.delete(&self.collection, id).await?;
        info!("event {} deleted by {}", id, acting);
        Ok(())
    }

    async fn host_checked(&self, id: &DocumentId, acting: &UserId, action: &str) -> AppResult<Event> {
        let event = self.get_event(id).await?;
        if !event.is_host(acting) {
            return Err(AppError::PermissionDenied(format!("Only the host can {}.", action)));
        }
        Ok(event)
    }
}
