use std::sync::Arc;

use crate::{
    config::Config,
    core::DocumentId,
    error::AppResult,
    infrastructure::traits::DocumentStore,
    services::{DeepLinkManager, EventService, ProfileService},
    sync::{EventSyncCache, EventWatcher},
};

/// Everything a signed-in session needs, wired to one store
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub events: EventService,
    pub profiles: ProfileService,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        let events = EventService::new(store.clone(), &config.store);
        let profiles = ProfileService::new(store.clone(), &config.store);

        Self {
            store,
            events,
            profiles,
            config,
        }
    }

    /// A fresh, not yet started cache for the home screen
    pub fn event_cache(&self) -> EventSyncCache {
        EventSyncCache::new(self.store.clone(), &self.config.store)
    }

    pub async fn watch_event(&self, id: DocumentId) -> AppResult<EventWatcher> {
        EventWatcher::watch(self.store.clone(), &self.config.store, id).await
    }

    pub fn deep_links(&self) -> DeepLinkManager {
        DeepLinkManager::new(&self.config.deep_link)
    }
}
