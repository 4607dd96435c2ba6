//! YouTube keyword search via the internal `youtubei` endpoint.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{Result, SvodkaError};
use crate::types::VideoCandidate;

const SEARCH_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/search?prettyPrint=false";
/// Search filter: video results only, sorted by relevance, as the web client
/// encodes it.
const VIDEO_FILTER_PARAMS: &str = "CAASAhAB";
const CLIENT_NAME: &str = "WEB";
const CLIENT_VERSION: &str = "2.20240726.00.00";
/// Pause between result pages.
const PAGE_PAUSE: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SearchClient {
    http: reqwest::Client,
}

impl SearchClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Search for videos matching `keyword`, returning at most `limit`
    /// candidates in the backend's result order. Follows continuation pages
    /// until `limit` is reached or the backend has nothing more to offer.
    pub async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<VideoCandidate>> {
        info!("searching for most recent videos for keyword: \"{keyword}\"");

        let mut candidates: Vec<VideoCandidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut continuation: Option<String> = None;

        loop {
            let body = match &continuation {
                None => json!({
                    "context": {
                        "client": { "clientName": CLIENT_NAME, "clientVersion": CLIENT_VERSION }
                    },
                    "query": keyword,
                    "params": VIDEO_FILTER_PARAMS,
                }),
                Some(token) => json!({
                    "context": {
                        "client": { "clientName": CLIENT_NAME, "clientVersion": CLIENT_VERSION }
                    },
                    "continuation": token,
                }),
            };

            let payload: Value = self
                .http
                .post(SEARCH_ENDPOINT)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| SvodkaError::SearchFailed {
                    keyword: keyword.to_string(),
                    reason: e.to_string(),
                })?
                .json()
                .await
                .map_err(|e| SvodkaError::SearchFailed {
                    keyword: keyword.to_string(),
                    reason: format!("malformed response body: {e}"),
                })?;

            let page = parse_search_page(&payload, limit - candidates.len(), &mut seen)
                .ok_or_else(|| SvodkaError::SearchFailed {
                    keyword: keyword.to_string(),
                    reason: "unexpected response structure".to_string(),
                })?;

            debug!(
                "search page yielded {} candidate(s), continuation: {}",
                page.items.len(),
                page.continuation.is_some()
            );
            candidates.extend(page.items);

            if candidates.len() >= limit {
                break;
            }
            match page.continuation {
                Some(token) => {
                    continuation = Some(token);
                    tokio::time::sleep(PAGE_PAUSE).await;
                }
                None => break,
            }
        }

        info!("search returned {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}

struct SearchPage {
    items: Vec<VideoCandidate>,
    continuation: Option<String>,
}

/// Pull video items and a continuation token out of one search response.
///
/// Only `videoRenderer` nodes become candidates; shelves, ads and other
/// renderer kinds are skipped, as are ids already in `seen`. Returns `None`
/// when the response carries neither an initial result list nor a
/// continuation list.
fn parse_search_page(
    payload: &Value,
    remaining: usize,
    seen: &mut HashSet<String>,
) -> Option<SearchPage> {
    let initial = payload["contents"]["twoColumnSearchResultsRenderer"]["primaryContents"]
        ["sectionListRenderer"]["contents"]
        .as_array();
    let continued = payload["onResponseReceivedCommands"][0]["appendContinuationItemsAction"]
        ["continuationItems"]
        .as_array();
    let sections = initial.or(continued)?;

    let mut items = Vec::new();
    let mut continuation = None;

    for section in sections {
        if let Some(token) = section["continuationItemRenderer"]["continuationEndpoint"]
            ["continuationCommand"]["token"]
            .as_str()
        {
            continuation = Some(token.to_string());
            continue;
        }
        let Some(entries) = section["itemSectionRenderer"]["contents"].as_array() else {
            continue;
        };
        for entry in entries {
            let renderer = &entry["videoRenderer"];
            let Some(id) = renderer["videoId"].as_str() else {
                continue;
            };
            if items.len() >= remaining || !seen.insert(id.to_string()) {
                continue;
            }
            let title = renderer["title"]["runs"][0]["text"]
                .as_str()
                .unwrap_or("Unknown Title");
            items.push(VideoCandidate::new(id, title));
        }
    }

    Some(SearchPage {
        items,
        continuation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_entry(id: &str, title: &str) -> Value {
        json!({ "videoRenderer": { "videoId": id, "title": { "runs": [{ "text": title }] } } })
    }

    fn sample_response(entries: Vec<Value>, token: Option<&str>) -> Value {
        let mut sections = vec![json!({ "itemSectionRenderer": { "contents": entries } })];
        if let Some(token) = token {
            sections.push(json!({
                "continuationItemRenderer": {
                    "continuationEndpoint": { "continuationCommand": { "token": token } }
                }
            }));
        }
        json!({
            "contents": {
                "twoColumnSearchResultsRenderer": {
                    "primaryContents": { "sectionListRenderer": { "contents": sections } }
                }
            }
        })
    }

    #[test]
    fn test_parse_preserves_order_and_limit() {
        let response = sample_response(
            vec![
                video_entry("aaa", "First"),
                video_entry("bbb", "Second"),
                video_entry("ccc", "Third"),
            ],
            None,
        );

        let mut seen = HashSet::new();
        let page = parse_search_page(&response, 5, &mut seen).unwrap();
        let ids: Vec<_> = page.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "bbb", "ccc"]);

        let mut seen = HashSet::new();
        let page = parse_search_page(&response, 2, &mut seen).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "First");
    }

    #[test]
    fn test_parse_skips_non_video_and_duplicates() {
        let response = sample_response(
            vec![
                video_entry("aaa", "First"),
                json!({ "shelfRenderer": { "title": "People also watched" } }),
                video_entry("aaa", "First again"),
                video_entry("bbb", "Second"),
            ],
            None,
        );

        let mut seen = HashSet::new();
        let page = parse_search_page(&response, 10, &mut seen).unwrap();
        let ids: Vec<_> = page.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_parse_extracts_continuation_token() {
        let response = sample_response(vec![video_entry("aaa", "First")], Some("tok123"));
        let mut seen = HashSet::new();
        let page = parse_search_page(&response, 10, &mut seen).unwrap();
        assert_eq!(page.continuation.as_deref(), Some("tok123"));
    }

    #[test]
    fn test_parse_continuation_response_shape() {
        let response = json!({
            "onResponseReceivedCommands": [{
                "appendContinuationItemsAction": {
                    "continuationItems": [
                        { "itemSectionRenderer": { "contents": [video_entry("ddd", "Fourth")] } }
                    ]
                }
            }]
        });
        let mut seen = HashSet::new();
        let page = parse_search_page(&response, 10, &mut seen).unwrap();
        assert_eq!(page.items[0].id, "ddd");
        assert!(page.continuation.is_none());
    }

    #[test]
    fn test_parse_malformed_response_is_none() {
        let mut seen = HashSet::new();
        assert!(parse_search_page(&json!({ "error": "rate limited" }), 5, &mut seen).is_none());
    }

    #[test]
    fn test_missing_title_falls_back() {
        let response = sample_response(vec![json!({ "videoRenderer": { "videoId": "xyz" } })], None);
        let mut seen = HashSet::new();
        let page = parse_search_page(&response, 5, &mut seen).unwrap();
        assert_eq!(page.items[0].title, "Unknown Title");
    }
}
