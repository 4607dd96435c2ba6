//! Transcript retrieval from YouTube caption tracks.
//!
//! Every per-video failure mode folds into the returned record's status, so
//! one bad candidate never aborts the rest of the run.

use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, SvodkaError};
use crate::types::{Segment, TranscriptRecord, VideoCandidate};

/// English variants tried, in order, before falling back to whatever the
/// video offers.
pub const DEFAULT_PREFERRED_LANGUAGES: &[&str] = &["en", "en-US", "en-GB"];

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
/// Webshare rotating residential gateway; YouTube blocks most datacenter IPs.
const PROXY_GATEWAY: &str = "http://p.webshare.io:80";
const CONSENT_COOKIE: &str = "CONSENT=YES+";
const CONSENT_FORM_MARKER: &str = "action=\"https://consent.youtube.com/s\"";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// One available caption language for a video.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub language_code: String,
    pub name: String,
    pub base_url: String,
}

/// What the watch page reports about a video's captions.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionListing {
    Disabled,
    Unavailable,
    Tracks(Vec<CaptionTrack>),
}

pub struct TranscriptClient {
    http: reqwest::Client,
}

impl TranscriptClient {
    /// Build a client, routing through the Webshare proxy when
    /// `PROXY_USERNAME` and `PROXY_PASSWORD` are both set.
    pub fn new() -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT);

        if let (Ok(user), Ok(pass)) = (
            std::env::var("PROXY_USERNAME"),
            std::env::var("PROXY_PASSWORD"),
        ) {
            info!("routing transcript requests through proxy gateway");
            builder = builder.proxy(reqwest::Proxy::all(PROXY_GATEWAY)?.basic_auth(&user, &pass));
        }

        Ok(Self {
            http: builder.build()?,
        })
    }

    /// List the caption tracks a video offers.
    pub async fn list(&self, video_id: &str) -> Result<CaptionListing> {
        let html = self.watch_page(video_id).await?;
        Ok(parse_caption_listing(&html))
    }

    /// Fetch one candidate's transcript. Infallible per item: any error ends
    /// up as status `Error` on the record.
    pub async fn fetch(
        &self,
        candidate: &VideoCandidate,
        preferred_languages: &[String],
    ) -> TranscriptRecord {
        match self.try_fetch(candidate, preferred_languages).await {
            Ok(record) => record,
            Err(e) => {
                warn!("error retrieving transcript for video {}: {e}", candidate.id);
                TranscriptRecord::failed(candidate.clone(), e.to_string())
            }
        }
    }

    async fn try_fetch(
        &self,
        candidate: &VideoCandidate,
        preferred_languages: &[String],
    ) -> Result<TranscriptRecord> {
        let listing = self.list(&candidate.id).await?;
        let tracks = match resolve_listing(candidate, listing) {
            Ok(tracks) => tracks,
            Err(record) => return Ok(record),
        };

        let Some((track, fallback)) = select_track(&tracks, preferred_languages) else {
            return Ok(TranscriptRecord::unavailable(candidate.clone()));
        };
        if fallback {
            info!(
                "no preferred-language transcript for video {}, using \"{}\"",
                candidate.id, track.language_code
            );
        } else {
            info!(
                "found transcript for video {} with language code {}",
                candidate.id, track.language_code
            );
        }

        let xml = self
            .http
            .get(&track.base_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let segments = parse_timedtext(&xml)?;
        if segments.is_empty() {
            return Ok(TranscriptRecord::unavailable(candidate.clone()));
        }

        Ok(TranscriptRecord::ok(
            candidate.clone(),
            track.language_code.clone(),
            segments,
        ))
    }

    async fn watch_page(&self, video_id: &str) -> Result<String> {
        let url = format!("{WATCH_URL}{video_id}");
        let html = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        if html.contains(CONSENT_FORM_MARKER) {
            // EU consent interstitial; retry once with the consent cookie set.
            let html = self
                .http
                .get(&url)
                .header("Cookie", CONSENT_COOKIE)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            return Ok(html);
        }
        Ok(html)
    }
}

/// Terminal listings become finished records, track listings pass through.
fn resolve_listing(
    candidate: &VideoCandidate,
    listing: CaptionListing,
) -> std::result::Result<Vec<CaptionTrack>, TranscriptRecord> {
    match listing {
        CaptionListing::Disabled => {
            info!("transcripts are disabled for video {}", candidate.id);
            Err(TranscriptRecord::disabled(candidate.clone()))
        }
        CaptionListing::Unavailable => {
            info!("no transcript found for video {}", candidate.id);
            Err(TranscriptRecord::unavailable(candidate.clone()))
        }
        CaptionListing::Tracks(tracks) => Ok(tracks),
    }
}

/// Extract the caption track listing embedded in a watch page.
///
/// No `"captions"` object at all means the uploader disabled them; an object
/// without usable tracks means no transcript exists.
fn parse_caption_listing(html: &str) -> CaptionListing {
    let Some(idx) = html.find("\"captions\":") else {
        return CaptionListing::Disabled;
    };
    let after = &html[idx + "\"captions\":".len()..];
    let Some(end) = after.find(",\"videoDetails") else {
        return CaptionListing::Unavailable;
    };
    let raw = after[..end].replace('\n', " ");
    let Ok(value) = serde_json::from_str::<Value>(&raw) else {
        return CaptionListing::Unavailable;
    };

    let Some(tracks) = value["playerCaptionsTracklistRenderer"]["captionTracks"].as_array() else {
        return CaptionListing::Unavailable;
    };

    let mut out = Vec::new();
    for track in tracks {
        let Some(base_url) = track["baseUrl"].as_str() else {
            continue;
        };
        let language_code = track["languageCode"].as_str().unwrap_or("").to_string();
        let name = track["name"]["simpleText"]
            .as_str()
            .or_else(|| track["name"]["runs"][0]["text"].as_str())
            .unwrap_or("")
            .to_string();
        out.push(CaptionTrack {
            language_code,
            name,
            base_url: base_url.to_string(),
        });
    }

    if out.is_empty() {
        CaptionListing::Unavailable
    } else {
        CaptionListing::Tracks(out)
    }
}

/// Pick the first track matching a preferred language, else fall back to the
/// first listed one. The bool reports whether the fallback was taken.
fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    preferred_languages: &[String],
) -> Option<(&'a CaptionTrack, bool)> {
    for lang in preferred_languages {
        if let Some(track) = tracks.iter().find(|t| t.language_code == *lang) {
            return Some((track, false));
        }
    }
    tracks.first().map(|track| (track, true))
}

/// Parse a timedtext document (`<text start=".." dur="..">..</text>`) into
/// segments.
fn parse_timedtext(xml: &str) -> Result<Vec<Segment>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut segments = Vec::new();
    let mut current: Option<(f64, f64)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"text" => {
                let mut start = 0.0;
                let mut duration = 0.0;
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"start" => start = value.parse().unwrap_or(0.0),
                        b"dur" => duration = value.parse().unwrap_or(0.0),
                        _ => {}
                    }
                }
                current = Some((start, duration));
                text.clear();
            }
            Event::Text(t) => {
                if current.is_some() {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::End(e) if e.name().as_ref() == b"text" => {
                if let Some((start, duration)) = current.take() {
                    let cleaned = unescape_html(text.trim());
                    if !cleaned.is_empty() {
                        segments.push(Segment {
                            text: cleaned,
                            start,
                            duration,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(segments)
}

/// Second unescape pass; YouTube double-escapes entities inside timedtext
/// payloads (`&amp;#39;` and friends).
fn unescape_html(text: &str) -> String {
    let mut out = text.replace("&amp;", "&");
    for (entity, replacement) in [
        ("&#39;", "'"),
        ("&quot;", "\""),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&nbsp;", " "),
    ] {
        out = out.replace(entity, replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TranscriptStatus;

    fn watch_page_with_captions(captions: &str) -> String {
        format!(
            "<html><script>var ytInitialPlayerResponse = {{\"captions\":{captions},\
             \"videoDetails\":{{\"videoId\":\"abc\"}}}};</script></html>"
        )
    }

    fn track(lang: &str) -> String {
        format!(
            "{{\"baseUrl\":\"https://www.youtube.com/api/timedtext?lang={lang}\",\
             \"languageCode\":\"{lang}\",\"name\":{{\"simpleText\":\"{lang}\"}}}}"
        )
    }

    #[test]
    fn test_listing_disabled_without_captions_object() {
        let html = "<html><script>var ytInitialPlayerResponse = \
                    {\"videoDetails\":{\"videoId\":\"abc\"}};</script></html>";
        assert_eq!(parse_caption_listing(html), CaptionListing::Disabled);
    }

    #[test]
    fn test_listing_unavailable_without_tracks() {
        let html = watch_page_with_captions("{\"playerCaptionsTracklistRenderer\":{}}");
        assert_eq!(parse_caption_listing(&html), CaptionListing::Unavailable);
    }

    #[test]
    fn test_listing_parses_tracks_in_order() {
        let captions = format!(
            "{{\"playerCaptionsTracklistRenderer\":{{\"captionTracks\":[{},{}]}}}}",
            track("de"),
            track("en")
        );
        let html = watch_page_with_captions(&captions);
        let CaptionListing::Tracks(tracks) = parse_caption_listing(&html) else {
            panic!("expected tracks");
        };
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].language_code, "de");
        assert_eq!(tracks[1].language_code, "en");
        assert!(tracks[0].base_url.contains("timedtext"));
    }

    #[test]
    fn test_select_track_prefers_language() {
        let tracks = vec![
            CaptionTrack {
                language_code: "de".to_string(),
                name: "German".to_string(),
                base_url: "u1".to_string(),
            },
            CaptionTrack {
                language_code: "en".to_string(),
                name: "English".to_string(),
                base_url: "u2".to_string(),
            },
        ];
        let preferred: Vec<String> = DEFAULT_PREFERRED_LANGUAGES
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (track, fallback) = select_track(&tracks, &preferred).unwrap();
        assert_eq!(track.language_code, "en");
        assert!(!fallback);
    }

    #[test]
    fn test_select_track_falls_back_to_first() {
        let tracks = vec![CaptionTrack {
            language_code: "es".to_string(),
            name: "Spanish".to_string(),
            base_url: "u1".to_string(),
        }];
        let preferred = vec!["en".to_string()];
        let (track, fallback) = select_track(&tracks, &preferred).unwrap();
        assert_eq!(track.language_code, "es");
        assert!(fallback);
    }

    #[test]
    fn test_disabled_listing_becomes_disabled_record() {
        let candidate = VideoCandidate::new("abc", "Some Video");
        let record = resolve_listing(&candidate, CaptionListing::Disabled).unwrap_err();
        assert_eq!(record.status, TranscriptStatus::Disabled);
        assert!(record.segments.is_empty());
    }

    #[test]
    fn test_parse_timedtext_segments() {
        let xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?><transcript>\
                   <text start=\"0.16\" dur=\"2.5\">hello world</text>\
                   <text start=\"2.66\" dur=\"3.1\">it&amp;#39;s a test</text>\
                   </transcript>";
        let segments = parse_timedtext(xml).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello world");
        assert_eq!(segments[0].start, 0.16);
        assert_eq!(segments[0].duration, 2.5);
        assert_eq!(segments[1].text, "it's a test");
    }

    #[test]
    fn test_parse_timedtext_skips_empty_nodes() {
        let xml = "<transcript><text start=\"0\" dur=\"1\"> </text>\
                   <text start=\"1\" dur=\"1\">ok</text></transcript>";
        let segments = parse_timedtext(xml).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "ok");
    }
}
