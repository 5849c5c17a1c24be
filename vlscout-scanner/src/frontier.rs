use crate::error::Result;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::{debug, error, info};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// One unit of work: a URL, where it came from, and how many hops from a seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierItem {
    pub url: String,
    pub source_tag: String,
    pub depth: usize,
}

impl FrontierItem {
    pub fn seed(url: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_tag: source_tag.into(),
            depth: 0,
        }
    }

    /// An item discovered from this one, one hop deeper.
    pub fn child(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_tag: self.source_tag.clone(),
            depth: self.depth + 1,
        }
    }
}

/// Items produced while processing one frontier item.
#[derive(Debug, Default)]
pub struct Discovered {
    pub links: Vec<FrontierItem>,
    /// Guessed URLs, drained only after all regular items.
    pub speculative: Vec<FrontierItem>,
}

#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, item: FrontierItem, worker_id: usize) -> Discovered;
}

#[derive(Default)]
struct Queues {
    regular: VecDeque<FrontierItem>,
    speculative: VecDeque<FrontierItem>,
}

/// Shared work queue with queue-join termination.
///
/// `pending` counts items that are queued or being processed. Workers stop
/// once the queues are empty and `pending` has dropped to zero.
pub struct Frontier {
    queues: Mutex<Queues>,
    pending: AtomicUsize,
    notify: Notify,
    max_depth: usize,
}

impl Frontier {
    pub fn new(max_depth: usize) -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            pending: AtomicUsize::new(0),
            notify: Notify::new(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Queue an item. Items deeper than `max_depth` are refused.
    pub fn enqueue(&self, item: FrontierItem) -> bool {
        self.push(item, false)
    }

    /// Queue a guessed URL behind all regular items.
    pub fn enqueue_speculative(&self, item: FrontierItem) -> bool {
        self.push(item, true)
    }

    fn push(&self, item: FrontierItem, speculative: bool) -> bool {
        if item.depth > self.max_depth {
            debug!("Refusing {} at depth {} (max {})", item.url, item.depth, self.max_depth);
            return false;
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        {
            let mut queues = self.lock();
            if speculative {
                queues.speculative.push_back(item);
            } else {
                queues.regular.push_back(item);
            }
        }
        self.notify.notify_waiters();
        true
    }

    /// Wait for the next item. Returns `None` once all work is done.
    pub async fn next(&self) -> Option<FrontierItem> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queues = self.lock();
                if let Some(item) = queues
                    .regular
                    .pop_front()
                    .or_else(|| queues.speculative.pop_front())
                {
                    return Some(item);
                }
            }

            if self.pending.load(Ordering::SeqCst) == 0 {
                return None;
            }

            notified.await;
        }
    }

    /// Mark one dequeued item as fully processed.
    pub fn complete(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Items queued or in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fixed-size pool of async workers draining one [`Frontier`].
pub struct WorkerPool {
    workers: usize,
    progress_callback: Option<ProgressCallback>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Run until the frontier is drained and nothing is in flight.
    pub async fn run<P>(&self, frontier: Arc<Frontier>, processor: Arc<P>) -> Result<()>
    where
        P: ItemProcessor + 'static,
    {
        info!(
            "Starting {} workers on {} queued items",
            self.workers,
            frontier.pending()
        );

        let mut worker_handles = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            let frontier = frontier.clone();
            let processor = processor.clone();
            let progress_cb = self.progress_callback.clone();

            let handle = tokio::spawn(async move {
                debug!("Worker {} started", worker_id);

                while let Some(item) = frontier.next().await {
                    if let Some(ref callback) = progress_cb {
                        callback(worker_id, item.url.clone());
                    }

                    let url = item.url.clone();
                    // A panicking item is dropped; the worker and its count carry on.
                    match AssertUnwindSafe(processor.process(item, worker_id))
                        .catch_unwind()
                        .await
                    {
                        Ok(discovered) => {
                            for link in discovered.links {
                                frontier.enqueue(link);
                            }
                            for guess in discovered.speculative {
                                frontier.enqueue_speculative(guess);
                            }
                        }
                        Err(_) => error!("Worker {} panicked while processing {}", worker_id, url),
                    }

                    frontier.complete();
                }

                debug!("Worker {} finished", worker_id);
            });

            worker_handles.push(handle);
        }

        for handle in worker_handles {
            handle.await?;
        }

        info!("Frontier drained");
        Ok(())
    }
}
