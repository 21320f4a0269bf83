//! [`JournalStore`] over Redis.
//!
//! The two key families live in two logical databases so that `RANDOMKEY`
//! against the list database can only ever return a timestamp list. Point
//! both URLs at the same server with different `/db` suffixes (the usual
//! deployment), or at different servers entirely.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::JournalStore;

/// A [`JournalStore`] backed by two Redis logical databases: one for action
/// log entries (value + TTL), one for per-item timestamp lists.
#[derive(Clone)]
pub struct RedisJournalStore {
    logs: ConnectionManager,
    lists: ConnectionManager,
}

impl RedisJournalStore {
    /// Connects to the two databases, e.g. `redis://127.0.0.1/0` for logs
    /// and `redis://127.0.0.1/1` for lists. The two keyspaces must be
    /// disjoint; nothing else may write to the list database.
    pub async fn connect(logs_url: &str, lists_url: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(
            logs_url != lists_url,
            "log and list databases must be disjoint keyspaces",
        );
        let logs = ConnectionManager::new(redis::Client::open(logs_url)?).await?;
        let lists = ConnectionManager::new(redis::Client::open(lists_url)?).await?;
        Ok(Self { logs, lists })
    }
}

#[async_trait]
impl JournalStore for RedisJournalStore {
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.logs.clone();
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.logs.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> anyhow::Result<i64> {
        let mut conn = self.logs.clone();
        let remaining: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(remaining)
    }

    async fn list_append(&self, key: &str, element: &str) -> anyhow::Result<()> {
        let mut conn = self.lists.clone();
        let _length: i64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(element)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>> {
        let mut conn = self.lists.clone();
        let elements: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        Ok(elements)
    }

    async fn list_remove(&self, key: &str, element: &str, count: usize) -> anyhow::Result<usize> {
        let mut conn = self.lists.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(key)
            .arg(count as i64)
            .arg(element)
            .query_async(&mut conn)
            .await?;
        Ok(removed.max(0) as usize)
    }

    async fn list_delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.lists.clone();
        let _removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_length(&self, key: &str) -> anyhow::Result<usize> {
        let mut conn = self.lists.clone();
        let length: i64 = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(length.max(0) as usize)
    }

    async fn random_list_key(&self) -> anyhow::Result<Option<String>> {
        let mut conn = self.lists.clone();
        let key: Option<String> = redis::cmd("RANDOMKEY").query_async(&mut conn).await?;
        Ok(key)
    }
}
