//! Job queue using a Redis list.

use async_trait::async_trait;
use guardian_models::VideoJob;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};

/// Source of video jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Pop the next job, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the wait elapsed with the queue empty. The pop is
    /// atomic: concurrent consumers never receive the same entry.
    async fn pop(&self, timeout: Duration) -> QueueResult<Option<VideoJob>>;

    /// Push a job for consumers.
    async fn enqueue(&self, job: &VideoJob) -> QueueResult<()>;

    /// Number of queued entries.
    async fn len(&self) -> QueueResult<usize>;
}

/// Parse a queue payload, rejecting entries without an id or a path.
pub fn decode_job(payload: &str) -> QueueResult<VideoJob> {
    let job: VideoJob = serde_json::from_str(payload)
        .map_err(|e| QueueError::malformed(payload, e.to_string()))?;
    if !job.is_complete() {
        return Err(QueueError::malformed(payload, "missing videoId or filePath"));
    }
    Ok(job)
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// List the backend pushes video jobs onto
    pub queue_key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            queue_key: "video:queue".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            queue_key: std::env::var("VIDEO_QUEUE_KEY")
                .unwrap_or_else(|_| "video:queue".to_string()),
        }
    }
}

/// Redis list queue client.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn queue_key(&self) -> &str {
        &self.config.queue_key
    }

    /// Check that Redis is reachable.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn pop(&self, timeout: Duration) -> QueueResult<Option<VideoJob>> {
        // BRPOP holds its connection for the whole wait; use a dedicated one.
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.config.queue_key)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };

        match decode_job(&payload) {
            Ok(job) => {
                debug!(video_id = %job.video_id, "Popped video job");
                Ok(Some(job))
            }
            Err(e) => {
                warn!(queue = %self.config.queue_key, "Dropping malformed job: {}", e);
                Err(e)
            }
        }
    }

    async fn enqueue(&self, job: &VideoJob) -> QueueResult<()> {
        if !job.is_complete() {
            return Err(QueueError::enqueue_failed("job needs videoId and filePath"));
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.config.queue_key)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;
        debug!(video_id = %job.video_id, "Enqueued video job");
        Ok(())
    }

    async fn len(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: usize = redis::cmd("LLEN")
            .arg(&self.config.queue_key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}
