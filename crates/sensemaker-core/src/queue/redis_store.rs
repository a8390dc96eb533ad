use super::store::ListStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// Default list name for queued jobs
pub const DEFAULT_COLLECTION: &str = "queue:jobs";

/// Redis-backed list store (for production)
///
/// Pending jobs live in `<collection>`, taken jobs in
/// `<collection>:processing` until acknowledged.
pub struct RedisListStore {
    client: redis::Client,
    collection: String,
    processing: String,
}

impl RedisListStore {
    /// Create a store over the default collection
    ///
    /// # Errors
    ///
    /// Returns error if the Redis URL is invalid
    pub fn new(redis_url: &str) -> Result<Self> {
        Self::with_collection(redis_url, DEFAULT_COLLECTION)
    }

    /// Create a store over a named collection
    ///
    /// # Errors
    ///
    /// Returns error if the Redis URL is invalid
    pub fn with_collection(redis_url: &str, collection: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Store(format!("invalid redis url: {}", e)))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            processing: format!("{}:processing", collection),
        })
    }

    /// Collection name
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Store(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn push(&self, payload: &str) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let len: usize = redis::cmd("RPUSH")
            .arg(&self.collection)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!(collection = %self.collection, len, "job appended");
        Ok(len)
    }

    async fn take(&self) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let payload: Option<String> = redis::cmd("LMOVE")
            .arg(&self.collection)
            .arg(&self.processing)
            .arg("LEFT")
            .arg("RIGHT")
            .query_async(&mut conn)
            .await?;
        Ok(payload)
    }

    async fn ack(&self, payload: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recover(&self) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let mut count = 0;

        // Newest first onto the head leaves the oldest at the front.
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing)
                .arg(&self.collection)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            count += 1;
        }

        if count > 0 {
            info!(collection = %self.collection, count, "recovered unacknowledged jobs");
        }
        Ok(count)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.collection)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(items)
    }

    async fn depth(&self) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let len: usize = redis::cmd("LLEN")
            .arg(&self.collection)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(&self.collection)
            .arg(&self.processing)
            .query_async(&mut conn)
            .await?;
        info!(collection = %self.collection, "queue cleared");
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
