//! Cached access to the signed-in user's children.

use std::time::Duration;

use chrono::Utc;
use db::{
    DBService,
    models::children::{CachedChildren, Child},
};
use serde::Serialize;
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info, warn};

use super::enact_api::{EnactApiClient, EnactApiError};

const CACHE_DURATION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize)]
pub struct ChildrenInfo {
    pub children: Vec<Child>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct MemoryCache {
    children: Vec<Child>,
    fetched_at: Instant,
}

pub struct ChildrenInfoService {
    client: EnactApiClient,
    store: Option<DBService>,
    cache: RwLock<Option<MemoryCache>>,
}

impl ChildrenInfoService {
    pub fn new(client: EnactApiClient, store: Option<DBService>) -> Self {
        Self {
            client,
            store,
            cache: RwLock::new(None),
        }
    }

    /// Children from memory when fresh, otherwise from the backend, falling
    /// back to the persisted copy when the backend is unreachable.
    pub async fn get_children(&self, token: &str, force_refresh: bool) -> ChildrenInfo {
        if token.trim().is_empty() {
            return ChildrenInfo {
                children: Vec::new(),
                from_cache: false,
                error: Some("No access token provided".to_string()),
            };
        }

        if !force_refresh {
            if let Some(children) = self.fresh_cached().await {
                debug!("Returning children info from memory cache");
                return ChildrenInfo {
                    children,
                    from_cache: true,
                    error: None,
                };
            }
        }

        match self.client.fetch_children(token).await {
            Ok(children) => {
                let children = with_ages(children);
                self.remember(&children).await;
                info!(count = children.len(), "Children info fetched");
                ChildrenInfo {
                    children,
                    from_cache: false,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Children fetch failed, trying persisted cache");
                self.fallback(&e).await
            }
        }
    }

    pub async fn update_children(
        &self,
        token: &str,
        children: &[Child],
    ) -> Result<(), EnactApiError> {
        self.client.update_children(token, children).await?;
        self.clear_cache().await;
        info!(count = children.len(), "Children info updated");
        Ok(())
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.take();
        if let Some(db) = &self.store {
            if let Err(e) = CachedChildren::clear(&db.pool).await {
                warn!(error = %e, "Failed to clear children cache");
            }
        }
    }

    pub async fn cached_children(&self) -> Vec<Child> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    pub fn needs_profile_completion(children: &[Child]) -> bool {
        children.iter().any(|child| !child.is_profile_complete())
    }

    async fn fresh_cached(&self) -> Option<Vec<Child>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < CACHE_DURATION)
            .map(|c| c.children.clone())
    }

    async fn remember(&self, children: &[Child]) {
        *self.cache.write().await = Some(MemoryCache {
            children: children.to_vec(),
            fetched_at: Instant::now(),
        });
        if let Some(db) = &self.store {
            if let Err(e) = CachedChildren::store(&db.pool, children).await {
                warn!(error = %e, "Failed to persist children cache");
            }
        }
    }

    async fn fallback(&self, cause: &EnactApiError) -> ChildrenInfo {
        let persisted = match &self.store {
            Some(db) => match CachedChildren::load(&db.pool).await {
                Ok(cached) => cached,
                Err(e) => {
                    warn!(error = %e, "Failed to load children cache");
                    None
                }
            },
            None => None,
        };

        match persisted {
            Some(cached) => {
                let children = with_ages(cached.children.0);
                *self.cache.write().await = Some(MemoryCache {
                    children: children.clone(),
                    fetched_at: Instant::now(),
                });
                ChildrenInfo {
                    children,
                    from_cache: true,
                    error: Some("Using cached data - API temporarily unavailable".to_string()),
                }
            }
            None => ChildrenInfo {
                children: Vec::new(),
                from_cache: false,
                error: Some(cause.user_message()),
            },
        }
    }
}

fn with_ages(children: Vec<Child>) -> Vec<Child> {
    let today = Utc::now().date_naive();
    children
        .into_iter()
        .map(|child| child.with_age(today))
        .collect()
}
