pub mod cache;
pub mod captions;
pub mod config;
pub mod debounce;
pub mod error;
pub mod extract;
pub mod output;
pub mod queue;
pub mod service;
pub mod store;
pub mod summarize;

use serde::{Deserialize, Serialize};

/// URL prefixes accepted as YouTube links
const YOUTUBE_PREFIXES: &[&str] = &[
    "https://www.youtube.com/",
    "https://youtube.com/",
    "https://m.youtube.com/",
    "https://youtu.be/",
];

/// A single timed caption cue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub text: String,
    pub duration_ms: u64,
    pub offset_ms: u64,
}

/// Transcript of a video. `lines` is empty when the video has no captions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub url: String,
    pub video_id: String,
    pub title: String,
    pub author: String,
    pub channel_url: String,
    pub lines: Vec<TranscriptLine>,
}

impl TranscriptResult {
    /// Transcript text with cues joined by spaces
    pub fn text(&self) -> String {
        self.lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join(" ")
    }
}

/// Descriptive metadata for a video, used when no transcript exists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadataResult {
    pub title: String,
    pub description: String,
    pub author: String,
    pub channel_url: String,
    pub tags: Vec<String>,
    pub publish_date: String,
    pub video_id: String,
    pub url: String,
}

/// Thumbnail resolution tiers, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ThumbnailQuality {
    Default,
    Medium,
    #[default]
    High,
    Standard,
    MaxRes,
}

impl ThumbnailQuality {
    fn file_name(&self) -> &str {
        match self {
            ThumbnailQuality::Default => "default.jpg",
            ThumbnailQuality::Medium => "mqdefault.jpg",
            ThumbnailQuality::High => "hqdefault.jpg",
            ThumbnailQuality::Standard => "sddefault.jpg",
            ThumbnailQuality::MaxRes => "maxresdefault.jpg",
        }
    }
}

/// True if the string starts with a known YouTube URL prefix
pub fn is_youtube_url(url: &str) -> bool {
    let url = url.trim();
    YOUTUBE_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

/// Extract video ID from the supported YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<String> {
    let parsed = url::Url::parse(input.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    let id = match host.as_str() {
        // youtu.be/ID
        "youtu.be" => parsed.path_segments()?.next().map(str::to_string),
        "youtube.com" | "www.youtube.com" | "m.youtube.com" => {
            let mut segments = parsed.path_segments()?;
            match segments.next() {
                // youtube.com/watch?v=ID
                Some("watch") => parsed
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                // youtube.com/embed/ID, youtube.com/shorts/ID
                Some("embed") | Some("shorts") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    };

    id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Canonical watch page for a video ID
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Thumbnail image URL for a video ID. The image is not checked for existence.
pub fn thumbnail_url(video_id: &str, quality: ThumbnailQuality) -> String {
    format!("https://img.youtube.com/vi/{video_id}/{}", quality.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_watch_url_with_extra_params() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?t=120&v=dQw4w9WgXcQ&list=PL1"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_short_url() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_mobile_and_bare_host() {
        assert_eq!(
            extract_video_id("https://m.youtube.com/watch?v=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtube.com/watch?v=abc123"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_embed_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_shorts_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_other_host() {
        assert_eq!(extract_video_id("https://vimeo.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://example.com/dQw4w9WgXcQ"), None);
    }

    #[test]
    fn test_missing_v_param() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?list=PL1"), None);
        assert_eq!(extract_video_id("https://youtu.be/"), None);
    }

    #[test]
    fn test_invalid_url() {
        assert_eq!(extract_video_id("not-a-valid-url"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn test_whitespace_trimming() {
        assert_eq!(
            extract_video_id("  https://youtu.be/dQw4w9WgXcQ  "),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_is_youtube_url() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=x"));
        assert!(is_youtube_url("https://youtu.be/x"));
        assert!(!is_youtube_url("http://www.youtube.com/watch?v=x"));
        assert!(!is_youtube_url("https://www.youtube.com.evil.com/"));
        assert!(!is_youtube_url("youtube.com/watch?v=x"));
    }

    #[test]
    fn test_thumbnail_url() {
        assert_eq!(
            thumbnail_url("abc", ThumbnailQuality::MaxRes),
            "https://img.youtube.com/vi/abc/maxresdefault.jpg"
        );
        assert_eq!(
            thumbnail_url("abc", ThumbnailQuality::Default),
            "https://img.youtube.com/vi/abc/default.jpg"
        );
        assert_eq!(
            thumbnail_url("abc", ThumbnailQuality::default()),
            "https://img.youtube.com/vi/abc/hqdefault.jpg"
        );
    }

    #[test]
    fn test_transcript_text() {
        let t = TranscriptResult {
            url: String::new(),
            video_id: "x".to_string(),
            title: String::new(),
            author: String::new(),
            channel_url: String::new(),
            lines: vec![
                TranscriptLine { text: "Hello".to_string(), duration_ms: 1000, offset_ms: 0 },
                TranscriptLine { text: "world".to_string(), duration_ms: 1000, offset_ms: 1000 },
            ],
        };
        assert_eq!(t.text(), "Hello world");
    }
}
