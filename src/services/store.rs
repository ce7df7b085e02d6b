use crate::error::FacilitatorError;
use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// String key-value store with expiring keys and string sets.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, FacilitatorError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), FacilitatorError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FacilitatorError>;

    /// Writes only if `key` is absent. Returns whether the write happened.
    /// Must be a single atomic operation on the backend.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, FacilitatorError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, FacilitatorError>;

    async fn set_add(&self, set: &str, member: &str) -> Result<(), FacilitatorError>;

    async fn set_remove(&self, set: &str, member: &str) -> Result<(), FacilitatorError>;

    async fn set_members(&self, set: &str) -> Result<Vec<String>, FacilitatorError>;

    async fn ping(&self) -> bool;

    fn backend(&self) -> &'static str;
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, FacilitatorError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), FacilitatorError> {
    let serialized = serde_json::to_string(value)?;
    store.set(key, &serialized).await
}

/// Redis when reachable, otherwise the in-process store.
pub async fn connect(redis_url: &str) -> Arc<dyn KeyValueStore> {
    match redis::Client::open(redis_url) {
        Ok(client) => match client.get_connection_manager().await {
            Ok(conn) => {
                tracing::info!("Redis connected successfully");
                return Arc::new(RedisStore::new(conn));
            }
            Err(e) => {
                tracing::warn!("Redis connection failed: {}, using memory store only", e);
            }
        },
        Err(e) => {
            tracing::warn!("Redis client creation failed: {}, using memory store only", e);
        }
    }
    Arc::new(MemoryStore::new())
}

pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FacilitatorError> {
        let mut conn = self.conn.clone();
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), FacilitatorError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FacilitatorError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        tracing::debug!("Stored key: {} with TTL: {}s", key, ttl.as_secs());
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, FacilitatorError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, FacilitatorError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<(), FacilitatorError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(set, member).await?;
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<(), FacilitatorError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(set, member).await?;
        Ok(())
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, FacilitatorError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers::<_, Vec<String>>(set).await?)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[derive(Clone)]
struct StoredValue {
    value: String,
    ttl: Option<Duration>,
}

struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &StoredValue, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-process store used when Redis is unavailable, and in tests.
pub struct MemoryStore {
    values: Cache<String, StoredValue>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: Cache::builder().expire_after(PerEntryTtl).build(),
            sets: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FacilitatorError> {
        Ok(self.values.get(key).await.map(|v| v.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), FacilitatorError> {
        self.values
            .insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    ttl: None,
                },
            )
            .await;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FacilitatorError> {
        self.values
            .insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    ttl: Some(ttl),
                },
            )
            .await;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, FacilitatorError> {
        let stored = StoredValue {
            value: value.to_string(),
            ttl: Some(ttl),
        };
        let entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(async move { stored })
            .await;
        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<bool, FacilitatorError> {
        Ok(self.values.remove(key).await.is_some())
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<(), FacilitatorError> {
        self.sets
            .write()
            .await
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<(), FacilitatorError> {
        let mut sets = self.sets.write().await;
        if let Some(members) = sets.get_mut(set) {
            members.remove(member);
            if members.is_empty() {
                sets.remove(set);
            }
        }
        Ok(())
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, FacilitatorError> {
        let sets = self.sets.read().await;
        let mut members: Vec<String> = sets
            .get(set)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
