//! Newsletter digest generation via a chat-completions provider.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::{Result, SvodkaError};
use crate::provider::Provider;
use crate::types::{Digest, TranscriptRecord};

/// Per-video cap on transcript characters embedded in the prompt.
pub const TRANSCRIPT_CHAR_CAP: usize = 25_000;

/// Generation calls may take a while on long transcript collections.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const SYSTEM_PROMPT: &str = "You are an expert tech newsletter editor. Your goal is to \
    synthesize raw video transcripts into a concise, high-value weekly digest.";

pub struct DigestGenerator {
    http: reqwest::Client,
    provider: Provider,
    model: String,
}

impl DigestGenerator {
    pub fn new(provider: Provider, model_override: Option<String>) -> Result<Self> {
        let model = model_override.unwrap_or_else(|| provider.config().model.to_string());
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            provider,
            model,
        })
    }

    /// Generate the digest from the run's transcript records in one provider
    /// call, so the model can synthesize across videos.
    ///
    /// Returns [`SvodkaError::NoContent`] without touching the network when no
    /// record has a usable transcript.
    pub async fn generate(&self, records: &[TranscriptRecord], subject: &str) -> Result<Digest> {
        let usable = usable_records(records)?;
        let user_prompt = build_user_prompt(&usable);

        let config = self.provider.config();
        let api_key = self.provider.validate_api_key()?;

        info!(
            "sending digest request to {} (model {})",
            self.provider.name(),
            self.model
        );
        let response: Value = self
            .http
            .post(config.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": user_prompt },
                ],
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SvodkaError::GenerationFailed {
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| SvodkaError::GenerationFailed {
                reason: format!("malformed response body: {e}"),
            })?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SvodkaError::GenerationFailed {
                reason: format!("unexpected API response: {response}"),
            })?;
        if content.trim().is_empty() {
            return Err(SvodkaError::GenerationFailed {
                reason: "provider returned empty content".to_string(),
            });
        }

        Ok(Digest {
            subject: subject.to_string(),
            body_markdown: content.trim().to_string(),
        })
    }
}

/// Filter to records that actually carry a transcript; `NoContent` when none
/// do.
fn usable_records(records: &[TranscriptRecord]) -> Result<Vec<&TranscriptRecord>> {
    let usable: Vec<&TranscriptRecord> = records.iter().filter(|r| r.is_ok()).collect();
    if usable.is_empty() {
        return Err(SvodkaError::NoContent);
    }
    Ok(usable)
}

/// Label every transcript clearly so the model can attribute takeaways and
/// build links.
fn build_context_block(records: &[&TranscriptRecord]) -> String {
    let mut block = String::new();
    for (i, record) in records.iter().enumerate() {
        let mut transcript = record.text();
        if transcript.len() > TRANSCRIPT_CHAR_CAP {
            warn!(
                "transcript for video {} truncated to {} characters",
                record.video.id, TRANSCRIPT_CHAR_CAP
            );
            truncate_at_char_boundary(&mut transcript, TRANSCRIPT_CHAR_CAP);
        }
        block.push_str(&format!("--- VIDEO {} ---\n", i + 1));
        block.push_str(&format!("Title: {}\n", record.video.title));
        block.push_str(&format!("URL: {}\n", record.video.url));
        block.push_str(&format!("Transcript: {}\n\n", transcript));
    }
    block
}

fn build_user_prompt(records: &[&TranscriptRecord]) -> String {
    format!(
        r#"Here are the transcripts from the most recent videos.

Please write a Newsletter Digest in Markdown format.

**Strict Formatting Rules:**
1. Do NOT include a main headline or title at the top.
2. Do NOT include an Executive Summary or Intro.
3. Start directly with the list of videos.
4. Do NOT include a "TL;DR" line for the videos.
5. Do NOT include any concluding remarks, "If you want...", or offers for further instructions at the end.

**Structure for each video:**
### Title: <Original Video Title>
Link: [Watch on YouTube](<Original Video URL>)
Key Takeaways:

- <Bullet 1: Specific, actionable detail>
- <Bullet 2: Specific, actionable detail>
... (Provide between 2 and 5 bullet points. Use fewer for short/simple videos, and more for dense/complex technical content.)

**(IMPORTANT: You must leave a blank line between 'Key Takeaways:' and the first bullet point so the list renders correctly.)**
---

Data:
{context}"#,
        context = build_context_block(records)
    )
}

/// `String::truncate` panics off a char boundary; back up to the nearest one.
fn truncate_at_char_boundary(s: &mut String, cap: usize) {
    if s.len() <= cap {
        return;
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Segment, VideoCandidate};

    fn ok_record(id: &str, title: &str, text: &str) -> TranscriptRecord {
        TranscriptRecord::ok(
            VideoCandidate::new(id, title),
            "en".to_string(),
            vec![Segment {
                text: text.to_string(),
                start: 0.0,
                duration: 1.0,
            }],
        )
    }

    #[test]
    fn test_all_failed_input_is_no_content() {
        let records = vec![
            TranscriptRecord::disabled(VideoCandidate::new("aaa", "First")),
            TranscriptRecord::disabled(VideoCandidate::new("bbb", "Second")),
        ];
        assert!(matches!(
            usable_records(&records),
            Err(SvodkaError::NoContent)
        ));
    }

    #[test]
    fn test_usable_records_filters_failures() {
        let records = vec![
            ok_record("aaa", "First", "some talk"),
            TranscriptRecord::unavailable(VideoCandidate::new("bbb", "Second")),
        ];
        let usable = usable_records(&records).unwrap();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].video.id, "aaa");
    }

    #[test]
    fn test_context_block_labels_each_video() {
        let first = ok_record("aaa", "First", "alpha talk");
        let second = ok_record("bbb", "Second", "beta talk");
        let block = build_context_block(&[&first, &second]);
        assert!(block.contains("--- VIDEO 1 ---"));
        assert!(block.contains("--- VIDEO 2 ---"));
        assert!(block.contains("Title: First"));
        assert!(block.contains("URL: https://www.youtube.com/watch?v=bbb"));
        assert!(block.contains("Transcript: alpha talk"));
    }

    #[test]
    fn test_context_block_truncates_long_transcripts() {
        let record = ok_record("aaa", "Long", &"x".repeat(TRANSCRIPT_CHAR_CAP + 500));
        let block = build_context_block(&[&record]);
        let transcript_line = block
            .lines()
            .find(|l| l.starts_with("Transcript:"))
            .unwrap();
        assert_eq!(transcript_line.len(), "Transcript: ".len() + TRANSCRIPT_CHAR_CAP);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let mut s = "héllo".to_string();
        truncate_at_char_boundary(&mut s, 2);
        assert_eq!(s, "h");
    }

    #[test]
    fn test_user_prompt_carries_rules_and_data() {
        let record = ok_record("aaa", "First", "alpha talk");
        let prompt = build_user_prompt(&[&record]);
        assert!(prompt.contains("Strict Formatting Rules"));
        assert!(prompt.contains("Watch on YouTube"));
        assert!(prompt.contains("alpha talk"));
    }
}
