use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;

use crate::captions::CaptionTrack;
use crate::error::PageError;

const PLAYER_RESPONSE_MARKERS: &[&str] = &["var ytInitialPlayerResponse = ", "ytInitialPlayerResponse = "];

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerResponse {
    pub captions: Option<CaptionsData>,
    pub video_details: Option<VideoDetails>,
    pub microformat: Option<Microformat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptionsData {
    pub player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptionTracklistRenderer {
    pub caption_tracks: Vec<CaptionTrack>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoDetails {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub channel_id: Option<String>,
    pub short_description: Option<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Microformat {
    pub player_microformat_renderer: Option<PlayerMicroformatRenderer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerMicroformatRenderer {
    pub publish_date: Option<String>,
    pub owner_profile_url: Option<String>,
}

impl PlayerResponse {
    pub fn caption_tracks(&self) -> &[CaptionTrack] {
        self.captions
            .as_ref()
            .and_then(|c| c.player_captions_tracklist_renderer.as_ref())
            .map(|r| r.caption_tracks.as_slice())
            .unwrap_or_default()
    }

    pub fn details(&self) -> Option<&VideoDetails> {
        self.video_details.as_ref()
    }

    pub fn publish_date(&self) -> Option<&str> {
        self.microformat
            .as_ref()
            .and_then(|m| m.player_microformat_renderer.as_ref())
            .and_then(|r| r.publish_date.as_deref())
    }

    /// Channel URL from the player data, if it names one
    pub fn channel_url(&self) -> Option<String> {
        if let Some(id) = self.details().and_then(|d| d.channel_id.as_deref()).filter(|s| !s.is_empty()) {
            return Some(channel_url(id));
        }
        self.microformat
            .as_ref()
            .and_then(|m| m.player_microformat_renderer.as_ref())
            .and_then(|r| r.owner_profile_url.clone())
            .filter(|s| !s.is_empty())
    }
}

/// Title, author and channel read straight from the page markup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFields {
    pub title: String,
    pub author: String,
    pub channel_url: String,
}

/// Slice the player response JSON text out of the page, where it is embedded
/// as an inline `var ytInitialPlayerResponse = {...};` assignment.
///
/// Starts right after the marker and ends at the brace that balances the
/// opening one, ignoring braces inside string literals.
pub fn slice_player_response(html: &str) -> Result<&str, PageError> {
    let start = PLAYER_RESPONSE_MARKERS
        .iter()
        .find_map(|marker| html.find(marker).map(|pos| pos + marker.len()))
        .ok_or(PageError::PlayerDataNotFound)?;

    let remaining = &html[start..];
    if !remaining.starts_with('{') {
        return Err(PageError::PlayerDataNotFound);
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, b) in remaining.bytes().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match b {
            b'\\' if in_string => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&remaining[..=i]);
                }
            }
            _ => {}
        }
    }

    Err(PageError::PlayerDataNotFound)
}

/// Parse the player response, failing if it is missing or malformed
pub fn parse_player_response(html: &str) -> Result<PlayerResponse, PageError> {
    let json = slice_player_response(html)?;
    let response: PlayerResponse = serde_json::from_str(json)?;
    debug!("Parsed player response ({} bytes)", json.len());
    Ok(response)
}

/// Parse the player response, falling back to an empty one
pub fn player_response_or_default(html: &str) -> PlayerResponse {
    parse_player_response(html).unwrap_or_else(|e| {
        warn!("Continuing without player data: {e}");
        PlayerResponse::default()
    })
}

pub fn channel_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}")
}

static META_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta\s+name="title"\s+content="([^"]*)""#).expect("valid regex"));
static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>([^<]*)</title>").expect("valid regex"));
static AUTHOR_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<link\s+itemprop="name"\s+content="([^"]*)""#).expect("valid regex"));
static AUTHOR_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""author"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex"));
static CHANNEL_ID_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""channelId"\s*:\s*"([A-Za-z0-9_-]+)""#).expect("valid regex"));
static CHANNEL_ID_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+itemprop="(?:channelId|identifier)"\s+content="([^"]*)""#).expect("valid regex")
});

fn capture(re: &Regex, html: &str) -> Option<String> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str()).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Decode a JSON string literal body captured by a regex
fn unescape_json(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

/// Title, author and channel from meta tags and inline script text.
///
/// Works without the player response blob; missing fields are empty.
pub fn page_fields(html: &str) -> PageFields {
    let title = capture(&META_TITLE, html)
        .or_else(|| {
            capture(&TITLE_TAG, html).map(|t| t.strip_suffix(" - YouTube").unwrap_or(&t).to_string())
        })
        .unwrap_or_default();

    let author = capture(&AUTHOR_LINK, html)
        .or_else(|| {
            AUTHOR_JSON
                .captures(html)
                .and_then(|caps| caps.get(1))
                .map(|m| unescape_json(m.as_str()))
        })
        .unwrap_or_default();

    let channel_url = CHANNEL_ID_JSON
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| capture(&CHANNEL_ID_META, html))
        .map(|id| channel_url(&id))
        .unwrap_or_default();

    PageFields {
        title,
        author,
        channel_url,
    }
}
