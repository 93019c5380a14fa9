use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::cache::ExpiringCache;
use crate::captions;
use crate::error::{CaptionError, Operation, ServiceError, VideoError};
use crate::extract;
use crate::queue::RequestQueue;
use crate::{TranscriptResult, VideoMetadataResult, extract_video_id, watch_url};

pub const PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Value stored in the video data cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VideoData {
    Transcript(TranscriptResult),
    Metadata(VideoMetadataResult),
}

pub fn transcript_key(video_id: &str, lang: &str) -> String {
    format!("transcript_{video_id}_{lang}")
}

pub fn metadata_key(video_id: &str) -> String {
    format!("metadata_{video_id}")
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Per-key async locks so concurrent requests for the same video scrape once
#[derive(Default)]
struct InFlight {
    locks: Mutex<HashMap<String, KeyLock>>,
}

struct InFlightGuard<'a> {
    owner: &'a InFlight,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl InFlight {
    async fn acquire(&self, key: &str) -> InFlightGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(key.to_string()).or_default().clone()
        };
        InFlightGuard {
            owner: self,
            key: key.to_string(),
            _guard: lock.lock_owned().await,
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // the map and this guard hold the only references when nobody is waiting
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            locks.remove(&self.key);
        }
    }
}

/// Entry point for transcripts and metadata: cache first, then the watch page
pub struct VideoDataService {
    queue: RequestQueue,
    cache: Arc<ExpiringCache<VideoData>>,
    in_flight: InFlight,
}

impl VideoDataService {
    pub fn new(queue: RequestQueue, cache: Arc<ExpiringCache<VideoData>>) -> Self {
        Self {
            queue,
            cache,
            in_flight: InFlight::default(),
        }
    }

    pub fn cache(&self) -> &ExpiringCache<VideoData> {
        &self.cache
    }

    /// Transcript for `url` in `lang`. A video without captions yields an
    /// empty `lines` list, which is cached like any other result.
    pub async fn fetch_transcript(&self, url: &str, lang: &str) -> Result<TranscriptResult, ServiceError> {
        self.transcript(url, lang)
            .await
            .map_err(|e| ServiceError::new(Operation::FetchTranscript, e))
    }

    /// Title, description, tags and publish date for `url`
    pub async fn fetch_video_metadata(&self, url: &str) -> Result<VideoMetadataResult, ServiceError> {
        self.metadata(url)
            .await
            .map_err(|e| ServiceError::new(Operation::FetchMetadata, e))
    }

    fn cached_transcript(&self, key: &str) -> Option<TranscriptResult> {
        match self.cache.get(key)? {
            VideoData::Transcript(t) => Some(t),
            VideoData::Metadata(_) => None,
        }
    }

    fn cached_metadata(&self, key: &str) -> Option<VideoMetadataResult> {
        match self.cache.get(key)? {
            VideoData::Metadata(m) => Some(m),
            VideoData::Transcript(_) => None,
        }
    }

    async fn transcript(&self, url: &str, lang: &str) -> Result<TranscriptResult, VideoError> {
        let url = url.trim();
        let video_id = extract_video_id(url).ok_or_else(|| VideoError::InvalidUrl(url.to_string()))?;
        let key = transcript_key(&video_id, lang);

        if let Some(hit) = self.cached_transcript(&key) {
            return Ok(hit);
        }
        let _in_flight = self.in_flight.acquire(&key).await;
        if let Some(hit) = self.cached_transcript(&key) {
            return Ok(hit);
        }

        let html = self.queue.enqueue(&watch_url(&video_id), PAGE_TIMEOUT).await?;
        let fields = extract::page_fields(&html);

        let lines = match captions::fetch_lines(&self.queue, &html, lang).await {
            Ok(lines) => lines,
            Err(VideoError::Captions(CaptionError::NoCaptions)) => {
                warn!("No captions for {video_id}; caching empty transcript");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        info!("Fetched transcript for {video_id}: {} lines", lines.len());

        let result = TranscriptResult {
            url: url.to_string(),
            video_id,
            title: fields.title,
            author: fields.author,
            channel_url: fields.channel_url,
            lines,
        };
        self.cache.set(key, VideoData::Transcript(result.clone()));
        Ok(result)
    }

    async fn metadata(&self, url: &str) -> Result<VideoMetadataResult, VideoError> {
        let url = url.trim();
        let video_id = extract_video_id(url).ok_or_else(|| VideoError::InvalidUrl(url.to_string()))?;
        let key = metadata_key(&video_id);

        if let Some(hit) = self.cached_metadata(&key) {
            return Ok(hit);
        }
        let _in_flight = self.in_flight.acquire(&key).await;
        if let Some(hit) = self.cached_metadata(&key) {
            return Ok(hit);
        }

        let html = self.queue.enqueue(&watch_url(&video_id), PAGE_TIMEOUT).await?;
        let fields = extract::page_fields(&html);
        let player = extract::player_response_or_default(&html);
        let details = player.details();

        let prefer = |value: Option<&str>, fallback: String| {
            value
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(fallback)
        };

        let result = VideoMetadataResult {
            title: prefer(details.and_then(|d| d.title.as_deref()), fields.title),
            description: details.and_then(|d| d.short_description.clone()).unwrap_or_default(),
            author: prefer(details.and_then(|d| d.author.as_deref()), fields.author),
            channel_url: player.channel_url().unwrap_or(fields.channel_url),
            tags: details.map(|d| d.keywords.clone()).unwrap_or_default(),
            publish_date: player.publish_date().unwrap_or_default().to_string(),
            video_id,
            url: url.to_string(),
        };
        debug!("Fetched metadata for {}: {:?}", result.video_id, result.title);

        self.cache.set(key, VideoData::Metadata(result.clone()));
        Ok(result)
    }
}
