use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::oneshot;

use crate::error::FetchError;

pub const MAX_CONCURRENT_REQUESTS: usize = 2;
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Raw text fetch primitive
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetcher backed by a shared reqwest client
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {url}");
        let body = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

struct QueuedRequest {
    url: String,
    timeout: Duration,
    responder: oneshot::Sender<Result<String, FetchError>>,
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<QueuedRequest>,
    processing: bool,
}

struct QueueInner {
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<QueueState>,
    active: AtomicUsize,
    max_concurrent: usize,
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// FIFO dispatcher that caps the number of in-flight fetches. Requests start
/// in the order they were enqueued; completion order is not guaranteed.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_max_concurrent(fetcher, MAX_CONCURRENT_REQUESTS)
    }

    pub fn with_max_concurrent(fetcher: Arc<dyn Fetcher>, max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                fetcher,
                state: Mutex::new(QueueState::default()),
                active: AtomicUsize::new(0),
                max_concurrent: max_concurrent.max(1),
            }),
        }
    }

    /// Queue a fetch and wait for its body. A timeout fails only this request
    /// and is not retried.
    pub async fn enqueue(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let (responder, receiver) = oneshot::channel();

        let start_drain = {
            let mut state = self.inner.state();
            state.waiting.push_back(QueuedRequest {
                url: url.to_string(),
                timeout,
                responder,
            });
            debug!("Queued {url} ({} waiting)", state.waiting.len());
            !std::mem::replace(&mut state.processing, true)
        };

        if start_drain {
            tokio::spawn(drain(self.inner.clone()));
        }

        receiver.await.unwrap_or(Err(FetchError::Canceled))
    }

    /// Number of fetches currently running
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Number of requests waiting for a slot
    pub fn waiting(&self) -> usize {
        self.inner.state().waiting.len()
    }
}

async fn drain(inner: Arc<QueueInner>) {
    loop {
        let request = {
            let mut state = inner.state();
            if state.waiting.is_empty() {
                state.processing = false;
                return;
            }
            if inner.active.load(Ordering::SeqCst) >= inner.max_concurrent {
                None
            } else {
                state.waiting.pop_front()
            }
        };

        let Some(request) = request else {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        };

        inner.active.fetch_add(1, Ordering::SeqCst);
        let task_inner = inner.clone();
        tokio::spawn(async move {
            let QueuedRequest { url, timeout, responder } = request;
            let fetch = task_inner.fetcher.fetch_text(&url);
            let result = tokio::time::timeout(timeout, fetch)
                .await
                .unwrap_or_else(|_| Err(FetchError::Timeout { url: url.clone(), timeout }));
            task_inner.active.fetch_sub(1, Ordering::SeqCst);
            if let Err(e) = &result {
                debug!("Fetch failed for {url}: {e}");
            }
            let _ = responder.send(result);
        });
    }
}
