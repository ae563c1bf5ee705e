// ProfileService - user profiles stored under users/<uid>

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::config::StoreConfig;
use crate::core::{DocumentId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::DocumentStore;
use crate::models::{ProfileDraft, UserProfile};

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            collection: config.users_collection.clone(),
        }
    }

    #[instrument(skip(self, draft))]
    pub async fn save_profile(&self, uid: Option<&UserId>, draft: ProfileDraft) -> AppResult<()> {
        let uid = uid.ok_or(AppError::Unauthenticated)?;
        self.store
            .upsert(&self.collection, &document_id(uid), draft.into_document())
            .await
    }

    pub async fn load_profile(&self, uid: &UserId) -> AppResult<Option<UserProfile>> {
        let Some(document) = self.store.get(&self.collection, &document_id(uid)).await? else {
            return Ok(None);
        };
        Ok(Some(UserProfile::from_document(uid.clone(), &document)?))
    }

    /// Read from the stored profile every time; there is no cached flag
    pub async fn is_setup_complete(&self, uid: &UserId) -> AppResult<bool> {
        Ok(self
            .load_profile(uid)
            .await?
            .is_some_and(|profile| profile.is_setup_complete()))
    }

    /// Profiles for an attendee list, in the given order. Users without a
    /// readable profile are left out.
    #[instrument(skip(self, uids), fields(count = uids.len()))]
    pub async fn attendee_profiles(&self, uids: &[UserId]) -> AppResult<Vec<UserProfile>> {
        let mut profiles = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.load_profile(uid).await {
                Ok(Some(profile)) => profiles.push(profile),
                Ok(None) => {}
                Err(AppError::Decode(err)) => warn!("skipping profile {}: {}", uid, err),
                Err(err) => return Err(err),
            }
        }
        Ok(profiles)
    }
}

fn document_id(uid: &UserId) -> DocumentId {
    DocumentId::new(uid.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::infrastructure::memory_store::InMemoryDocumentStore;
    use serde_json::json;

    fn service() -> (Arc<InMemoryDocumentStore>, ProfileService) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = ProfileService::new(store.clone(), &Config::default().store);
        (store, service)
    }

    fn draft(first: &str, last: &str) -> ProfileDraft {
        ProfileDraft {
            first_name: first.into(),
            last_name: last.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn setup_completion_follows_the_stored_profile() {
        let (_, service) = service();
        let uid = UserId::from("u1");
        assert!(!service.is_setup_complete(&uid).await.unwrap());

        service.save_profile(Some(&uid), draft("Ada", "")).await.unwrap();
        assert!(!service.is_setup_complete(&uid).await.unwrap());

        service.save_profile(Some(&uid), draft("Ada", "Lovelace")).await.unwrap();
        assert!(service.is_setup_complete(&uid).await.unwrap());
    }

    #[tokio::test]
    async fn attendee_profiles_skip_missing_and_malformed() {
        let (store, service) = service();
        service.save_profile(Some(&"a".into()), draft("A", "A")).await.unwrap();
        service.save_profile(Some(&"c".into()), draft("C", "C")).await.unwrap();
        store.put_raw("users", "b", json!({"firstName": 3}).as_object().cloned().unwrap());

        let uids: Vec<UserId> = ["c", "b", "ghost", "a"].into_iter().map(UserId::from).collect();
        let profiles = service.attendee_profiles(&uids).await.unwrap();
        let names: Vec<&str> = profiles.iter().map(|p| p.first_name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
        assert!(service.attendee_profiles(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saving_requires_a_user() {
        let (_, service) = service();
        assert!(matches!(
            service.save_profile(None, draft("A", "B")).await,
            Err(AppError::Unauthenticated)
        ));
    }
}
