//! Periodic background flushing of crawl output.
//!
//! The saver buffers posts and summaries per tab and flushes them to the
//! [`FileStore`] on a fixed interval, so a crash mid-crawl loses at most one
//! interval's worth of data. A failed flush requeues its batch instead of
//! dropping it; the data goes out on the next tick once the store recovers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use marketpulse_core::{Post, PostSummary};

use crate::file_store::FileStore;

#[derive(Default)]
struct Pending {
    posts: HashMap<String, Vec<Post>>,
    summaries: HashMap<String, Vec<PostSummary>>,
}

#[derive(Clone)]
pub struct IncrementalSaver {
    store: Arc<FileStore>,
    pending: Arc<Mutex<Pending>>,
}

/// Handle to a running saver loop. Dropping it without calling
/// [`SaverHandle::stop`] abandons pending data.
pub struct SaverHandle {
    saver: IncrementalSaver,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IncrementalSaver {
    #[must_use]
    pub fn new(store: Arc<FileStore>) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Spawn the periodic flush loop.
    #[must_use]
    pub fn start(&self, interval: Duration) -> SaverHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let saver = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        saver.flush().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        tracing::info!(interval_secs = interval.as_secs(), "incremental saver started");
        SaverHandle {
            saver: self.clone(),
            shutdown,
            task,
        }
    }

    /// Spawn a task draining crawl batches from `rx` into the pending buffer.
    #[must_use]
    pub fn drain_batches(&self, mut rx: mpsc::Receiver<(String, Vec<Post>)>) -> JoinHandle<()> {
        let saver = self.clone();
        tokio::spawn(async move {
            while let Some((tab, posts)) = rx.recv().await {
                tracing::debug!(tab, count = posts.len(), "queueing crawl batch");
                saver.add_posts(&tab, posts).await;
            }
        })
    }

    pub async fn add_posts(&self, tab: &str, posts: Vec<Post>) {
        if posts.is_empty() {
            return;
        }
        let mut pending = self.pending.lock().await;
        pending.posts.entry(tab.to_owned()).or_default().extend(posts);
    }

    pub async fn add_summaries(&self, tab: &str, summaries: Vec<PostSummary>) {
        if summaries.is_empty() {
            return;
        }
        let mut pending = self.pending.lock().await;
        pending
            .summaries
            .entry(tab.to_owned())
            .or_default()
            .extend(summaries);
    }

    /// Flush everything pending. Failed batches are requeued for the next
    /// flush rather than dropped.
    pub async fn flush(&self) {
        let (posts, summaries) = {
            let mut pending = self.pending.lock().await;
            (
                std::mem::take(&mut pending.posts),
                std::mem::take(&mut pending.summaries),
            )
        };

        for (tab, batch) in posts {
            match self.store.save_posts(&tab, &batch).await {
                Ok(new_count) => {
                    tracing::debug!(tab, new_count, "flushed posts");
                }
                Err(e) => {
                    tracing::error!(tab, error = %e, "post flush failed, requeueing batch");
                    self.requeue_posts(&tab, batch).await;
                }
            }
        }

        for (tab, batch) in summaries {
            match self.store.save_summaries(&tab, &batch).await {
                Ok(new_count) => {
                    tracing::debug!(tab, new_count, "flushed summaries");
                }
                Err(e) => {
                    tracing::error!(tab, error = %e, "summary flush failed, requeueing batch");
                    self.requeue_summaries(&tab, batch).await;
                }
            }
        }
    }

    /// Put a failed batch back ahead of anything queued since the flush
    /// started, preserving arrival order.
    async fn requeue_posts(&self, tab: &str, mut batch: Vec<Post>) {
        let mut pending = self.pending.lock().await;
        let entry = pending.posts.entry(tab.to_owned()).or_default();
        batch.append(entry);
        *entry = batch;
    }

    async fn requeue_summaries(&self, tab: &str, mut batch: Vec<PostSummary>) {
        let mut pending = self.pending.lock().await;
        let entry = pending.summaries.entry(tab.to_owned()).or_default();
        batch.append(entry);
        *entry = batch;
    }

    /// Number of posts waiting for the next flush.
    pub async fn pending_post_count(&self) -> usize {
        self.pending.lock().await.posts.values().map(Vec::len).sum()
    }
}

impl SaverHandle {
    /// Stop the loop and flush whatever is still pending.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "saver task panicked");
        }
        self.saver.flush().await;
        tracing::info!("incremental saver stopped");
    }
}
