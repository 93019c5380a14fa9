use std::time::Duration;

use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;

use crate::TranscriptLine;
use crate::error::{CaptionError, VideoError};
use crate::extract;
use crate::queue::RequestQueue;

/// Caption payloads are small; don't wait long for them
pub const CAPTION_TIMEOUT: Duration = Duration::from_secs(5);

const YOUTUBE_ORIGIN: &str = "https://www.youtube.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    #[serde(default)]
    pub kind: Option<String>,
}

/// Pick the caption track for `lang`: exact code, then partial code match,
/// then whatever comes first.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], lang: &str) -> Result<&'a CaptionTrack, CaptionError> {
    let lang = lang.to_ascii_lowercase();

    let track = tracks
        .iter()
        .find(|t| t.language_code.eq_ignore_ascii_case(&lang))
        .or_else(|| {
            tracks.iter().find(|t| {
                let code = t.language_code.to_ascii_lowercase();
                !code.is_empty() && !lang.is_empty() && (code.contains(&lang) || lang.contains(&code))
            })
        })
        .or_else(|| tracks.first())
        .ok_or(CaptionError::NoCaptions)?;

    debug!("Using caption track: lang={} kind={:?}", track.language_code, track.kind);
    Ok(track)
}

/// Make a caption base URL absolute
pub fn absolute_caption_url(base_url: &str) -> String {
    if base_url.starts_with("//") {
        format!("https:{base_url}")
    } else if base_url.starts_with('/') {
        format!("{YOUTUBE_ORIGIN}{base_url}")
    } else {
        base_url.to_string()
    }
}

/// Locate, download and parse the transcript for `lang` from a watch page
pub async fn fetch_lines(
    queue: &RequestQueue,
    page_html: &str,
    lang: &str,
) -> Result<Vec<TranscriptLine>, VideoError> {
    let player = extract::parse_player_response(page_html)?;
    let track = select_track(player.caption_tracks(), lang)?;
    let url = absolute_caption_url(&track.base_url);

    let xml = queue
        .enqueue(&url, CAPTION_TIMEOUT)
        .await
        .map_err(CaptionError::from)?;

    Ok(parse_caption_xml(&xml)?)
}

struct Cue {
    offset_ms: u64,
    duration_ms: u64,
    text: String,
}

fn parse_seconds(value: &str) -> u64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| (v * 1000.0).round() as u64)
        .unwrap_or(0)
}

fn parse_millis(value: &str) -> u64 {
    value.trim().parse::<u64>().unwrap_or(0)
}

/// Start a cue from a `<text start dur>` (seconds) or `<p t d>` (milliseconds) element
fn start_cue(e: &BytesStart) -> Option<Cue> {
    let in_seconds = match e.name().as_ref() {
        b"text" => true,
        b"p" => false,
        _ => return None,
    };

    let mut cue = Cue {
        offset_ms: 0,
        duration_ms: 0,
        text: String::new(),
    };

    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value);
        match (in_seconds, attr.key.as_ref()) {
            (true, b"start") => cue.offset_ms = parse_seconds(&value),
            (true, b"dur") => cue.duration_ms = parse_seconds(&value),
            (false, b"t") => cue.offset_ms = parse_millis(&value),
            (false, b"d") => cue.duration_ms = parse_millis(&value),
            _ => {}
        }
    }

    Some(cue)
}

fn finish_cue(cue: Cue, lines: &mut Vec<TranscriptLine>) {
    let text = html_escape::decode_html_entities(&cue.text).trim().to_string();
    if !text.is_empty() {
        lines.push(TranscriptLine {
            text,
            duration_ms: cue.duration_ms,
            offset_ms: cue.offset_ms,
        });
    }
}

/// Parse caption XML into lines ordered by offset.
///
/// Bad numeric attributes become 0. A cue with a mismatched closing tag ends
/// at that tag; other ill-formed markup drops only the cue it appears in. A
/// syntax error after the first cue keeps what was parsed so far.
pub fn parse_caption_xml(xml: &str) -> Result<Vec<TranscriptLine>, CaptionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut lines = Vec::new();
    let mut current: Option<Cue> = None;
    // elements opened inside the current cue, e.g. srv3 <s> word spans
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if current.is_some() {
                    depth += 1;
                } else {
                    current = start_cue(e);
                    depth = 0;
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(cue) = current.as_mut() {
                    let raw = e
                        .unescape()
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(e).into_owned());
                    cue.text.push_str(&raw);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(cue) = current.as_mut() {
                    cue.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                if depth > 0 {
                    depth -= 1;
                } else if let Some(cue) = current.take() {
                    finish_cue(cue, &mut lines);
                }
            }
            Ok(Event::Empty(ref e)) => {
                // <br/> inside a cue separates its lines
                if let Some(cue) = current.as_mut().filter(|_| e.name().as_ref() == b"br") {
                    if !cue.text.ends_with(char::is_whitespace) {
                        cue.text.push(' ');
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(quick_xml::Error::IllFormed(e)) => {
                if let Some(cue) = current.take() {
                    warn!("Dropping caption cue at {}ms: {e}", cue.offset_ms);
                } else {
                    debug!("Ignoring ill-formed caption markup: {e}");
                }
                depth = 0;
            }
            Err(e) => {
                if lines.is_empty() {
                    return Err(CaptionError::Xml(e.to_string()));
                }
                warn!("Caption XML truncated after {} lines: {e}", lines.len());
                break;
            }
            _ => {}
        }
    }

    lines.sort_by_key(|l| l.offset_ms);
    Ok(lines)
}
