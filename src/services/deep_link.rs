// Event invitation links: https://<host>/event/<event id>

use tracing::{debug, info, instrument};
use url::Url;

use crate::config::DeepLinkConfig;
use crate::core::{DocumentId, UserId};
use crate::error::AppResult;
use crate::services::event_service::EventService;

#[derive(Debug, Clone)]
pub struct DeepLinkManager {
    host: String,
    pending: Option<DocumentId>,
}

impl DeepLinkManager {
    pub fn new(config: &DeepLinkConfig) -> Self {
        Self {
            host: config.host.clone(),
            pending: None,
        }
    }

    /// Link guests open to join `event_id`
    pub fn share_link(&self, event_id: &DocumentId) -> String {
        format!("https://{}/event/{}", self.host, event_id)
    }

    /// Remember the event a link points at. Links for other hosts, schemes or
    /// paths are ignored and leave any pending event untouched.
    pub fn handle_url(&mut self, raw: &str) -> Option<&DocumentId> {
        let event_id = self.parse(raw)?;
        info!("deep link detected, pending event {}", event_id);
        self.pending = Some(event_id);
        self.pending.as_ref()
    }

    fn parse(&self, raw: &str) -> Option<DocumentId> {
        let url = Url::parse(raw).ok()?;
        if url.scheme() != "https" || url.host_str() != Some(self.host.as_str()) {
            debug!("ignoring link {}", raw);
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["event", .., last] => Some(DocumentId::new(*last)),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&DocumentId> {
        self.pending.as_ref()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Join the pending event as `user`. Nothing happens without both a
    /// pending link and a signed-in user. The link is cleared once joined.
    #[instrument(skip(self, events))]
    pub async fn accept_pending(
        &mut self,
        events: &EventService,
        user: Option<&UserId>,
    ) -> AppResult<Option<DocumentId>> {
        let (Some(event_id), Some(user)) = (self.pending.clone(), user) else {
            return Ok(None);
        };
        events.join_event(&event_id, user).await?;
        self.clear();
        Ok(Some(event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn manager() -> DeepLinkManager {
        DeepLinkManager::new(&Config::default().deep_link)
    }

    #[test]
    fn parses_event_links_for_our_host() {
        let mut links = manager();
        assert_eq!(
            links.handle_url("https://potluckapp.com/event/abc123").map(|id| id.as_str()),
            Some("abc123")
        );
        assert_eq!(links.pending().map(|id| id.as_str()), Some("abc123"));
    }

    #[test]
    fn ignores_foreign_links() {
        let mut links = manager();
        for raw in [
            "http://potluckapp.com/event/abc",
            "https://evil.example/event/abc",
            "https://potluckapp.com/profile/abc",
            "https://potluckapp.com/event",
            "not a url",
        ] {
            assert!(links.handle_url(raw).is_none(), "{} should be ignored", raw);
        }
        assert!(links.pending().is_none());
    }

    #[test]
    fn share_link_round_trips() {
        let mut links = manager();
        let url = links.share_link(&"e42".into());
        assert_eq!(url, "https://potluckapp.com/event/e42");
        assert_eq!(links.handle_url(&url).map(|id| id.as_str()), Some("e42"));
        links.clear();
        assert!(links.pending().is_none());
    }
}
