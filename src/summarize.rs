use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Result, bail};
use log::{debug, info};

use crate::cache::ExpiringCache;
use crate::error::{Operation, ServiceError, VideoError};
use crate::service::VideoDataService;
use crate::{TranscriptResult, VideoMetadataResult, extract_video_id};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes YouTube videos into notes. \
Provide a clear, structured summary that captures the key points, main arguments, and important details. \
Use bullet points for key takeaways.";

/// Generates text for a prompt
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String>;
}

/// What a cached summary was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySource {
    Transcript,
    Metadata,
    Multimodal,
}

impl SummarySource {
    pub fn cache_key(&self, video_id: &str) -> String {
        let prefix = match self {
            SummarySource::Transcript => "transcript",
            SummarySource::Metadata => "metadata",
            SummarySource::Multimodal => "multimodal",
        };
        format!("{prefix}_{video_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub video_id: String,
    pub source: SummarySource,
    pub text: String,
}

pub fn transcript_prompt(transcript: &TranscriptResult) -> String {
    format!(
        "Summarize this transcript from the video \"{}\" by {}:\n\n{}",
        transcript.title,
        transcript.author,
        transcript.text()
    )
}

/// Prompt for videos without captions: work from what the uploader wrote
pub fn metadata_prompt(metadata: &VideoMetadataResult) -> String {
    let mut prompt = format!(
        "This video has no transcript. Summarize what it is likely about from its metadata.\n\n\
         Title: {}\nChannel: {}\n",
        metadata.title, metadata.author
    );
    if !metadata.publish_date.is_empty() {
        prompt.push_str(&format!("Published: {}\n", metadata.publish_date));
    }
    if !metadata.tags.is_empty() {
        prompt.push_str(&format!("Tags: {}\n", metadata.tags.join(", ")));
    }
    prompt.push_str(&format!("\nDescription:\n{}", metadata.description));
    prompt
}

pub fn multimodal_prompt(metadata: &VideoMetadataResult) -> String {
    format!(
        "Watch the video at {} and summarize it.\n\nTitle: {}\nChannel: {}\n\nDescription:\n{}",
        metadata.url, metadata.title, metadata.author, metadata.description
    )
}

/// Summaries cached per video, backed by the video data service
pub struct SummaryService {
    videos: Arc<VideoDataService>,
    summarizer: Arc<dyn Summarizer>,
    cache: Arc<ExpiringCache<String>>,
}

impl SummaryService {
    pub fn new(
        videos: Arc<VideoDataService>,
        summarizer: Arc<dyn Summarizer>,
        cache: Arc<ExpiringCache<String>>,
    ) -> Self {
        Self {
            videos,
            summarizer,
            cache,
        }
    }

    /// Summarize from the transcript, or from metadata when there are no captions
    pub async fn summarize(&self, url: &str, lang: &str) -> Result<Summary, ServiceError> {
        let video_id = Self::video_id(url)?;

        for source in [SummarySource::Transcript, SummarySource::Metadata] {
            if let Some(text) = self.cache.get(&source.cache_key(&video_id)) {
                return Ok(Summary { video_id, source, text });
            }
        }

        let transcript = self.videos.fetch_transcript(url, lang).await?;
        let (source, prompt) = if transcript.lines.is_empty() {
            info!("No transcript for {video_id}; summarizing metadata");
            let metadata = self.videos.fetch_video_metadata(url).await?;
            (SummarySource::Metadata, metadata_prompt(&metadata))
        } else {
            (SummarySource::Transcript, transcript_prompt(&transcript))
        };

        self.generate(video_id, source, &prompt).await
    }

    /// Summarize by handing the video URL to a model that can watch it
    pub async fn summarize_multimodal(&self, url: &str) -> Result<Summary, ServiceError> {
        let video_id = Self::video_id(url)?;
        let source = SummarySource::Multimodal;
        if let Some(text) = self.cache.get(&source.cache_key(&video_id)) {
            return Ok(Summary { video_id, source, text });
        }

        let metadata = self.videos.fetch_video_metadata(url).await?;
        self.generate(video_id, source, &multimodal_prompt(&metadata)).await
    }

    fn video_id(url: &str) -> Result<String, ServiceError> {
        extract_video_id(url)
            .ok_or_else(|| ServiceError::new(Operation::Summarize, VideoError::InvalidUrl(url.trim().to_string())))
    }

    async fn generate(&self, video_id: String, source: SummarySource, prompt: &str) -> Result<Summary, ServiceError> {
        debug!("Generating {source:?} summary for {video_id} ({} chars)", prompt.len());
        let text = self
            .summarizer
            .summarize(prompt)
            .await
            .map_err(|e| ServiceError::new(Operation::Summarize, VideoError::Summarize(e)))?;

        self.cache.set(source.cache_key(&video_id), text.clone());
        Ok(Summary { video_id, source, text })
    }
}

/// Summarizer that calls the Anthropic or OpenAI API depending on the model name
pub struct LlmSummarizer {
    client: reqwest::Client,
    model: String,
}

impl LlmSummarizer {
    pub fn new(client: reqwest::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        if is_anthropic_model(&self.model) {
            summarize_anthropic(&self.client, prompt, &self.model).await
        } else {
            summarize_openai(&self.client, prompt, &self.model).await
        }
    }
}

fn is_anthropic_model(model: &str) -> bool {
    model.starts_with("claude")
}

async fn summarize_anthropic(client: &reqwest::Client, prompt: &str, model: &str) -> Result<String> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        eyre::eyre!("ANTHROPIC_API_KEY environment variable not set (required for Claude summarization)")
    })?;

    debug!("Summarizing via Anthropic API with model {model}");

    let body = serde_json::json!({
        "model": model,
        "max_tokens": 4096,
        "system": DEFAULT_SYSTEM_PROMPT,
        "messages": [
            {
                "role": "user",
                "content": prompt
            }
        ]
    });

    let resp = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", &api_key)
        .header("anthropic-version", "2023-06-01")
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("Anthropic API returned {status}: {}", first_line(&body));
    }

    let json: serde_json::Value = resp.json().await?;
    extract_anthropic_text(&json)
}

fn extract_anthropic_text(json: &serde_json::Value) -> Result<String> {
    if let Some(content) = json.get("content").and_then(|c| c.as_array()) {
        let text: String = content
            .iter()
            .filter_map(|block| {
                if block.get("type")?.as_str()? == "text" {
                    block.get("text")?.as_str().map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");
        if !text.is_empty() {
            return Ok(text);
        }
    }
    bail!("unexpected Anthropic API response format");
}

async fn summarize_openai(client: &reqwest::Client, prompt: &str, model: &str) -> Result<String> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| eyre::eyre!("OPENAI_API_KEY environment variable not set (required for OpenAI summarization)"))?;

    debug!("Summarizing via OpenAI API with model {model}");

    let body = serde_json::json!({
        "model": model,
        "messages": [
            {
                "role": "system",
                "content": DEFAULT_SYSTEM_PROMPT
            },
            {
                "role": "user",
                "content": prompt
            }
        ]
    });

    let resp = client
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(&api_key)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("OpenAI API returned {status}: {}", first_line(&body));
    }

    let json: serde_json::Value = resp.json().await?;
    extract_openai_text(&json)
}

fn extract_openai_text(json: &serde_json::Value) -> Result<String> {
    if let Some(text) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
    {
        return Ok(text.to_string());
    }
    bail!("unexpected OpenAI API response format");
}

/// Keep error messages to one line
fn first_line(body: &str) -> &str {
    body.lines().next().unwrap_or_default()
}
