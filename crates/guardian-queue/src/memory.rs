//! In-process job queue.

use async_trait::async_trait;
use guardian_models::VideoJob;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use crate::error::QueueResult;
use crate::queue::{decode_job, JobQueue};

/// FIFO queue holding raw payloads, with the same pop semantics as Redis.
#[derive(Default)]
pub struct MemoryJobQueue {
    entries: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a raw payload, valid or not.
    pub async fn push_raw(&self, payload: impl Into<String>) {
        self.entries.lock().await.push_front(payload.into());
        self.notify.notify_one();
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn pop(&self, timeout: Duration) -> QueueResult<Option<VideoJob>> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if let Some(payload) = self.entries.lock().await.pop_back() {
                    return payload;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(payload) => decode_job(&payload).map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn enqueue(&self, job: &VideoJob) -> QueueResult<()> {
        self.push_raw(serde_json::to_string(job)?).await;
        Ok(())
    }

    async fn len(&self) -> QueueResult<usize> {
        Ok(self.entries.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&VideoJob::new("v1", "/a.mp4")).await.unwrap();
        queue.enqueue(&VideoJob::new("v2", "/b.mp4")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);

        let first = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        let second = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.video_id, "v1");
        assert_eq!(second.video_id, "v2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_when_empty() {
        let queue = MemoryJobQueue::new();
        let start = tokio::time::Instant::now();
        assert!(queue.pop(Duration::from_secs(30)).await.unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(MemoryJobQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.enqueue(&VideoJob::new("v9", "/c.mp4")).await.unwrap();

        let job = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(job.video_id, "v9");
    }

    #[tokio::test]
    async fn test_malformed_entry_is_consumed() {
        let queue = MemoryJobQueue::new();
        queue.push_raw("{broken").await;
        assert!(queue.pop(Duration::from_secs(1)).await.unwrap_err().is_malformed());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_consumers_receive_distinct_jobs() {
        let queue = Arc::new(MemoryJobQueue::new());
        for i in 0..20 {
            queue
                .enqueue(&VideoJob::new(format!("v{}", i), "/x.mp4"))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(job) = queue.pop(Duration::from_millis(50)).await.unwrap() {
                    ids.push(job.video_id);
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20);
    }
}
