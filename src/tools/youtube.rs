//! YouTube toolkit.
//!
//! Fetches video metadata (oEmbed) and caption transcripts from the public
//! watch page, without an API key.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::tool::{parse_args, Tool, ToolRegistry};
use crate::tools::duckduckgo::html_decode;

/// Configuration for YouTube tools
#[derive(Clone)]
pub struct YouTubeConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Preferred caption language; falls back to the first track.
    pub language: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.youtube.com".to_string(),
            timeout_secs: 30,
            language: "en".to_string(),
        }
    }
}

/// Pull the 11-character video id out of a watch, short, embed or shorts URL.
/// A bare id is accepted as-is.
pub fn extract_video_id(url: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(r"(?:[?&]v=|youtu\.be/|/embed/|/shorts/|/live/)([A-Za-z0-9_-]{11})").ok()
        })
        .as_ref()?;

    let url = url.trim();
    if let Some(caps) = pattern.captures(url) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let bare = url.len() == 11
        && url
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    bare.then(|| url.to_string())
}

/// Fetches captions for a video.
#[derive(Clone)]
pub struct TranscriptFetcher {
    http: reqwest::Client,
    config: YouTubeConfig,
}

impl TranscriptFetcher {
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; AgentCourse/0.1)")
            .build()
            .map_err(|e| AgentError::tool("youtube", e))?;
        Ok(Self { http, config })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| AgentError::tool("youtube", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::tool(
                "youtube",
                std::io::Error::other(format!("YouTube returned {status} for {url}")),
            ));
        }
        response.text().await.map_err(|e| AgentError::tool("youtube", e))
    }

    /// The transcript as plain text, or `None` when the video has no captions.
    pub async fn transcript(&self, video_id: &str) -> Result<Option<String>> {
        let watch_url = format!("{}/watch?v={video_id}", self.config.base_url);
        debug!(video_id, "fetching watch page");
        let page = self.get_text(&watch_url).await?;

        let tracks = caption_tracks(&page);
        let Some(track) = pick_track(&tracks, &self.config.language) else {
            return Ok(None);
        };

        let xml = self.get_text(&absolute_url(&self.config.base_url, &track.base_url)).await?;
        let text = parse_timed_text(&xml);
        Ok((!text.is_empty()).then_some(text))
    }

    pub async fn video_data(&self, video_url: &str) -> Result<Value> {
        let url = format!(
            "{}/oembed?format=json&url={}",
            self.config.base_url,
            urlencoding::encode(video_url)
        );
        let body = self.get_text(&url).await?;
        let data: Value = serde_json::from_str(&body)?;
        let keep = [
            "title",
            "author_name",
            "author_url",
            "type",
            "height",
            "width",
            "version",
            "provider_name",
            "provider_url",
            "thumbnail_url",
        ];
        let filtered: serde_json::Map<String, Value> = keep
            .iter()
            .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        Ok(Value::Object(filtered))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode", default)]
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Locate the `"captionTracks": [...]` array in the embedded player JSON.
fn caption_tracks(page: &str) -> Vec<CaptionTrack> {
    let Some(start) = page.find("\"captionTracks\":") else {
        return Vec::new();
    };
    let rest = &page[start + "\"captionTracks\":".len()..];
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Vec<CaptionTrack>>();
    match stream.next() {
        Some(Ok(tracks)) => tracks,
        _ => Vec::new(),
    }
}

/// Manual captions in the preferred language first, then generated ones,
/// then whatever comes first.
fn pick_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let matches_language = |t: &&CaptionTrack| t.language_code.starts_with(language);
    let generated = |t: &&CaptionTrack| t.kind.as_deref() == Some("asr");

    tracks
        .iter()
        .filter(matches_language)
        .find(|t| !generated(t))
        .or_else(|| tracks.iter().find(matches_language))
        .or_else(|| tracks.first())
}

fn absolute_url(base: &str, url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
    }
}

/// Join the `<text>` segments of a timed-text document into one string.
fn parse_timed_text(xml: &str) -> String {
    static SEGMENT: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(segment) = SEGMENT
        .get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").ok())
        .as_ref()
    else {
        return String::new();
    };

    segment
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        // Segments are entity-encoded twice (`&amp;#39;`).
        .map(|m| html_decode(&html_decode(m.as_str())))
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Create a YouTube toolkit with caption and metadata tools
pub fn youtube_toolkit(config: YouTubeConfig) -> Result<ToolRegistry> {
    let fetcher = TranscriptFetcher::new(config)?;
    let mut registry = ToolRegistry::new();
    registry.register(CaptionsTool {
        fetcher: fetcher.clone(),
    });
    registry.register(VideoDataTool { fetcher });
    Ok(registry)
}

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

fn url_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": { "type": "string", "description": "YouTube video URL or id" }
        },
        "required": ["url"]
    })
}

struct CaptionsTool {
    fetcher: TranscriptFetcher,
}

#[async_trait]
impl Tool for CaptionsTool {
    fn name(&self) -> &str {
        "get_youtube_video_captions"
    }

    fn description(&self) -> &str {
        "Get the captions (transcript) of a YouTube video."
    }

    fn parameters(&self) -> Option<Value> {
        Some(url_parameters())
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: UrlArgs = parse_args(self.name(), input)?;
        let Some(video_id) = extract_video_id(&args.url) else {
            return Ok(json!("Error getting video ID from URL, please provide a valid YouTube url"));
        };
        match self.fetcher.transcript(&video_id).await? {
            Some(text) => Ok(Value::String(text)),
            None => Ok(json!("No captions found for video")),
        }
    }
}

struct VideoDataTool {
    fetcher: TranscriptFetcher,
}

#[async_trait]
impl Tool for VideoDataTool {
    fn name(&self) -> &str {
        "get_youtube_video_data"
    }

    fn description(&self) -> &str {
        "Get metadata (title, author, thumbnail) of a YouTube video."
    }

    fn parameters(&self) -> Option<Value> {
        Some(url_parameters())
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: UrlArgs = parse_args(self.name(), input)?;
        let Some(video_id) = extract_video_id(&args.url) else {
            return Ok(json!("Error getting video ID from URL, please provide a valid YouTube url"));
        };
        let canonical = format!("https://www.youtube.com/watch?v={video_id}");
        self.fetcher.video_data(&canonical).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_from_common_url_shapes() {
        let id = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?t=42"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://example.com/video"), None);
    }

    #[test]
    fn finds_caption_tracks_and_prefers_manual_english() {
        let page = r#"var x = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[
            {"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=de","languageCode":"de"},
            {"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en&kind=asr","languageCode":"en","kind":"asr"},
            {"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en","languageCode":"en"}
        ],"audioTracks":[]}}};"#;

        let tracks = caption_tracks(page);
        assert_eq!(tracks.len(), 3);
        let track = pick_track(&tracks, "en").unwrap();
        assert_eq!(track.base_url, "https://www.youtube.com/api/timedtext?v=abc&lang=en");
        assert!(caption_tracks("<html>no captions</html>").is_empty());
    }

    #[test]
    fn joins_timed_text_segments() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0.0" dur="1.5">Hello &amp;amp; welcome</text>
            <text start="1.5" dur="2.0">it&amp;#39;s a
            test</text><text start="4" dur="1"></text></transcript>"#;
        assert_eq!(parse_timed_text(xml), "Hello & welcome it's a test");
    }
}
