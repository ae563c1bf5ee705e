use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub deep_link: DeepLinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub events_collection: String,
    pub users_collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepLinkConfig {
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                events_collection: "events".to_string(),
                users_collection: "users".to_string(),
            },
            deep_link: DeepLinkConfig {
                host: "potluckapp.com".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let host = env::var("POTLUCK_DEEP_LINK_HOST").unwrap_or(defaults.deep_link.host);
        if host.is_empty() || host.contains('/') {
            anyhow::bail!("POTLUCK_DEEP_LINK_HOST must be a bare host name, got {:?}", host);
        }

        Ok(Self {
            store: StoreConfig {
                events_collection: env::var("POTLUCK_EVENTS_COLLECTION")
                    .unwrap_or(defaults.store.events_collection),
                users_collection: env::var("POTLUCK_USERS_COLLECTION")
                    .unwrap_or(defaults.store.users_collection),
            },
            deep_link: DeepLinkConfig { host },
        })
    }
}
