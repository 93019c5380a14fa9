use serde::Serialize;

use crate::{ThumbnailQuality, TranscriptResult, VideoMetadataResult, thumbnail_url};

/// Everything gathered for one video, ready to render
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub author: String,
    pub channel_url: String,
    pub thumbnail_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<TranscriptResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadataResult>,
}

impl Note {
    pub fn from_transcript(transcript: TranscriptResult, quality: ThumbnailQuality) -> Self {
        Self {
            video_id: transcript.video_id.clone(),
            url: transcript.url.clone(),
            title: transcript.title.clone(),
            author: transcript.author.clone(),
            channel_url: transcript.channel_url.clone(),
            thumbnail_url: thumbnail_url(&transcript.video_id, quality),
            summary: None,
            transcript: Some(transcript),
            metadata: None,
        }
    }

    pub fn from_metadata(metadata: VideoMetadataResult, quality: ThumbnailQuality) -> Self {
        Self {
            video_id: metadata.video_id.clone(),
            url: metadata.url.clone(),
            title: metadata.title.clone(),
            author: metadata.author.clone(),
            channel_url: metadata.channel_url.clone(),
            thumbnail_url: thumbnail_url(&metadata.video_id, quality),
            summary: None,
            transcript: None,
            metadata: Some(metadata),
        }
    }
}

fn timestamp(offset_ms: u64) -> String {
    let secs = offset_ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Render as plain text: summary if any, then one cue per line
pub fn render_text(note: &Note) -> String {
    let mut parts = Vec::new();
    if let Some(summary) = &note.summary {
        parts.push(summary.clone());
    }
    if let Some(transcript) = &note.transcript {
        parts.extend(transcript.lines.iter().map(|l| l.text.clone()));
    }
    if let Some(metadata) = &note.metadata {
        parts.push(metadata.description.clone());
    }
    parts.join("\n")
}

pub fn render_json(note: &Note) -> String {
    serde_json::to_string_pretty(note).unwrap_or_default()
}

/// Render as a markdown note with a thumbnail link and timestamped transcript
pub fn render_markdown(note: &Note) -> String {
    let mut out = format!("# {}\n\n", note.title);
    out.push_str(&format!("[![{}]({})]({})\n\n", note.title, note.thumbnail_url, note.url));
    if !note.author.is_empty() {
        if note.channel_url.is_empty() {
            out.push_str(&format!("**Channel:** {}\n\n", note.author));
        } else {
            out.push_str(&format!("**Channel:** [{}]({})\n\n", note.author, note.channel_url));
        }
    }

    if let Some(metadata) = &note.metadata {
        if !metadata.publish_date.is_empty() {
            out.push_str(&format!("**Published:** {}\n\n", metadata.publish_date));
        }
        if !metadata.tags.is_empty() {
            let tags: Vec<String> = metadata.tags.iter().map(|t| format!("#{}", t.replace(' ', "-"))).collect();
            out.push_str(&format!("**Tags:** {}\n\n", tags.join(" ")));
        }
        if !metadata.description.is_empty() {
            out.push_str(&format!("## Description\n\n{}\n\n", metadata.description));
        }
    }

    if let Some(summary) = &note.summary {
        out.push_str(&format!("## Summary\n\n{summary}\n\n"));
    }

    if let Some(transcript) = &note.transcript {
        out.push_str("## Transcript\n\n");
        if transcript.lines.is_empty() {
            out.push_str("_No captions available for this video._\n");
        }
        for line in &transcript.lines {
            out.push_str(&format!("- [{}] {}\n", timestamp(line.offset_ms), line.text));
        }
    }

    out.trim_end().to_string()
}
