//! Cache-aside store for platform login cookies
//!
//! The in-memory map is consulted first; the `sessions` table is the
//! source of truth on a miss. Entries self-expire lazily on `load`; a
//! bulk sweep reaps expired durable rows. The in-memory layer is
//! process-local: when the orchestrator runs across multiple processes
//! only durable storage is coherent, which is a documented limitation
//! rather than something this cache tries to solve.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::Result;
use crate::types::{CookieJar, SessionCookieRecord};

#[derive(Debug, Clone)]
struct CachedSession {
    cookie_blob: String,
    expires_at: i64,
}

pub struct SessionCache {
    db: Database,
    ttl: Duration,
    memory: RwLock<HashMap<(String, String), CachedSession>>,
}

impl SessionCache {
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self {
            db,
            ttl,
            memory: RwLock::new(HashMap::new()),
        }
    }

    /// Load usable cookies for a key, or `None` if absent or expired.
    ///
    /// Memory first; an expired in-memory entry is evicted and the
    /// durable row consulted, so a key whose persisted expiry has passed
    /// returns nothing even while a stale entry lingers in memory.
    pub async fn load(&self, user_id: &str, platform: &str) -> Result<Option<CookieJar>> {
        let key = (user_id.to_string(), platform.to_string());
        let now = Utc::now().timestamp();

        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(&key) {
                if now < entry.expires_at {
                    let cookies: CookieJar = serde_json::from_str(&entry.cookie_blob)?;
                    return Ok(Some(cookies));
                }
            }
        }

        // Evict an expired entry before falling through to storage
        {
            let mut memory = self.memory.write().await;
            if memory.get(&key).is_some_and(|e| now >= e.expires_at) {
                memory.remove(&key);
                debug!(user_id, platform, "evicted expired in-memory session");
            }
        }

        if let Some(record) = self.db.get_session(user_id, platform).await? {
            if now < record.expires_at {
                let cookies: CookieJar = serde_json::from_str(&record.cookie_blob)?;
                self.memory.write().await.insert(
                    key,
                    CachedSession {
                        cookie_blob: record.cookie_blob,
                        expires_at: record.expires_at,
                    },
                );
                return Ok(Some(cookies));
            }
        }

        Ok(None)
    }

    /// Store freshly captured cookies with an absolute expiry of
    /// now + TTL, in memory first and then durably.
    ///
    /// Returns `Ok(true)` when the durable upsert succeeded, `Ok(false)`
    /// when only the in-memory layer took the write; the cache stays
    /// usable for the rest of the process lifetime either way.
    pub async fn save(&self, user_id: &str, platform: &str, cookies: &CookieJar) -> Result<bool> {
        let expires_at = (Utc::now() + self.ttl).timestamp();
        let cookie_blob = serde_json::to_string(cookies)?;

        self.memory.write().await.insert(
            (user_id.to_string(), platform.to_string()),
            CachedSession {
                cookie_blob: cookie_blob.clone(),
                expires_at,
            },
        );

        let record = SessionCookieRecord {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            cookie_blob,
            expires_at,
        };

        match self.db.upsert_session(&record).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(
                    user_id,
                    platform,
                    error = %e,
                    "session persisted in memory only, durability degraded"
                );
                Ok(false)
            }
        }
    }

    /// Remove a session from both layers. Absence in either is not an
    /// error; returns whether anything was removed.
    pub async fn delete(&self, user_id: &str, platform: &str) -> Result<bool> {
        let key = (user_id.to_string(), platform.to_string());
        let in_memory = self.memory.write().await.remove(&key).is_some();
        let durable = self.db.delete_session(user_id, platform).await?;
        Ok(in_memory || durable)
    }

    /// Sweep expired rows from durable storage, returning the removed
    /// count. In-memory entries are left to self-expire on `load`.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.db.delete_expired_sessions(now.timestamp()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookies(pairs: &[(&str, &str)]) -> CookieJar {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn test_cache(ttl: Duration) -> SessionCache {
        let db = Database::in_memory().await.unwrap();
        SessionCache::new(db, ttl)
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let cache = test_cache(Duration::days(7)).await;
        let jar = cookies(&[("li_at", "AQEDAxyz"), ("JSESSIONID", "ajax:123")]);

        let durable = cache.save("u1", "linkedin", &jar).await.unwrap();
        assert!(durable);

        let loaded = cache.load("u1", "linkedin").await.unwrap().unwrap();
        assert_eq!(loaded, jar);
    }

    #[tokio::test]
    async fn test_load_miss_returns_none() {
        let cache = test_cache(Duration::days(7)).await;
        assert!(cache.load("u1", "linkedin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_falls_through_to_durable_storage() {
        let db = Database::in_memory().await.unwrap();
        let jar = cookies(&[("sid", "abc")]);

        // Row written by another process; nothing in this cache's memory
        db.upsert_session(&SessionCookieRecord {
            user_id: "u1".to_string(),
            platform: "indeed".to_string(),
            cookie_blob: serde_json::to_string(&jar).unwrap(),
            expires_at: Utc::now().timestamp() + 3600,
        })
        .await
        .unwrap();

        let cache = SessionCache::new(db, Duration::days(7));
        let loaded = cache.load("u1", "indeed").await.unwrap().unwrap();
        assert_eq!(loaded, jar);

        // Hit populates memory
        assert!(cache
            .memory
            .read()
            .await
            .contains_key(&("u1".to_string(), "indeed".to_string())));
    }

    #[tokio::test]
    async fn test_expired_entry_returns_none_even_when_cached_in_memory() {
        // Zero TTL: the write lands in both layers already expired
        let cache = test_cache(Duration::zero()).await;
        let jar = cookies(&[("sid", "abc")]);

        cache.save("u1", "linkedin", &jar).await.unwrap();
        assert!(cache
            .memory
            .read()
            .await
            .contains_key(&("u1".to_string(), "linkedin".to_string())));

        assert!(cache.load("u1", "linkedin").await.unwrap().is_none());

        // The stale in-memory entry was evicted by the failed load
        assert!(!cache
            .memory
            .read()
            .await
            .contains_key(&("u1".to_string(), "linkedin".to_string())));
    }

    #[tokio::test]
    async fn test_save_is_upsert_per_key() {
        let cache = test_cache(Duration::days(7)).await;

        cache
            .save("u1", "linkedin", &cookies(&[("sid", "old")]))
            .await
            .unwrap();
        cache
            .save("u1", "linkedin", &cookies(&[("sid", "new")]))
            .await
            .unwrap();

        let loaded = cache.load("u1", "linkedin").await.unwrap().unwrap();
        assert_eq!(loaded.get("sid").unwrap(), "new");

        // Exactly one durable row for the key
        let record = cache.db.get_session("u1", "linkedin").await.unwrap().unwrap();
        assert!(record.cookie_blob.contains("new"));
    }

    #[tokio::test]
    async fn test_delete_removes_both_layers() {
        let cache = test_cache(Duration::days(7)).await;
        cache
            .save("u1", "linkedin", &cookies(&[("sid", "abc")]))
            .await
            .unwrap();

        assert!(cache.delete("u1", "linkedin").await.unwrap());
        assert!(cache.load("u1", "linkedin").await.unwrap().is_none());
        assert!(cache.db.get_session("u1", "linkedin").await.unwrap().is_none());

        // Deleting an absent key is a no-op, not an error
        assert!(!cache.delete("u1", "linkedin").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sweeps_storage_only() {
        let cache = test_cache(Duration::days(7)).await;
        let now = Utc::now();

        // One live session through the cache, one already-expired row
        // written straight to storage
        cache
            .save("u1", "linkedin", &cookies(&[("sid", "live")]))
            .await
            .unwrap();
        cache
            .db
            .upsert_session(&SessionCookieRecord {
                user_id: "u2".to_string(),
                platform: "indeed".to_string(),
                cookie_blob: "{}".to_string(),
                expires_at: now.timestamp() - 60,
            })
            .await
            .unwrap();

        let removed = cache.cleanup_expired(now).await.unwrap();
        assert_eq!(removed, 1);

        // The live session is untouched in both layers
        assert!(cache.load("u1", "linkedin").await.unwrap().is_some());
    }
}
