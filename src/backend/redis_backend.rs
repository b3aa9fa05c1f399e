//! Redis-backed key-value store

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use super::{KvBackend, WriteOp};
use crate::error::BackendResult;

/// Number of keys requested per SCAN round trip
const SCAN_BATCH: usize = 100;

/// Redis backend over a shared multiplexed connection.
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl RedisBackend {
    /// Connects to the Redis server at `url`.
    pub async fn connect(url: &str) -> BackendResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis backend");
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> BackendResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        for op in &ops {
            match op {
                WriteOp::SetEx {
                    key,
                    value,
                    ttl_secs,
                } => {
                    pipe.set_ex(key, value, *ttl_secs).ignore();
                }
                WriteOp::SAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
                WriteOp::Expire { key, ttl_secs } => {
                    pipe.expire(key, *ttl_secs as i64).ignore();
                }
            }
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> BackendResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn srem(&self, key: &str, members: &[String]) -> BackendResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let removed: u64 = conn.srem(key, members).await?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> BackendResult<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn scan(&self, pattern: &str, limit: usize) -> BackendResult<Vec<String>> {
        let mut conn = self.conn();
        let mut found = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            found.extend(batch);
            cursor = next;
            if cursor == 0 || found.len() >= limit {
                break;
            }
        }

        found.truncate(limit);
        Ok(found)
    }

    async fn dbsize(&self) -> BackendResult<u64> {
        let mut conn = self.conn();
        let size: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(size)
    }

    async fn flush(&self) -> BackendResult<()> {
        let mut conn = self.conn();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
