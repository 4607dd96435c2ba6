//! Persistence for pipeline artifacts.
//!
//! Both artifacts are written before delivery is attempted and are never
//! rolled back. The transcript file round-trips: loading reproduces the same
//! record sequence that was saved.

use std::path::Path;

use tokio::fs;
use tracing::info;

use crate::error::Result;
use crate::types::{Digest, TranscriptRecord};

/// Save the run's transcript records as pretty-printed JSON, in pipeline
/// order.
pub async fn save_transcripts(records: &[TranscriptRecord], path: &Path) -> Result<()> {
    let pretty_json = serde_json::to_string_pretty(records)?;
    fs::write(path, &pretty_json).await?;
    info!(
        "saved {} transcript record(s) to {}",
        records.len(),
        path.display()
    );
    Ok(())
}

/// Load a previously saved transcript collection.
pub async fn load_transcripts(path: &Path) -> Result<Vec<TranscriptRecord>> {
    let json_content = fs::read_to_string(path).await?;
    let records: Vec<TranscriptRecord> = serde_json::from_str(&json_content)?;
    Ok(records)
}

/// Save the digest body as a Markdown text file.
pub async fn save_digest(digest: &Digest, path: &Path) -> Result<()> {
    fs::write(path, &digest.body_markdown).await?;
    info!("saved digest to {}", path.display());
    Ok(())
}

/// Load a previously saved digest body.
pub async fn load_digest(path: &Path) -> Result<String> {
    let markdown = fs::read_to_string(path).await?;
    Ok(markdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Segment, TranscriptStatus, VideoCandidate};

    fn sample_records() -> Vec<TranscriptRecord> {
        vec![
            TranscriptRecord::ok(
                VideoCandidate::new("aaa", "First"),
                "en".to_string(),
                vec![Segment {
                    text: "hello".to_string(),
                    start: 0.5,
                    duration: 2.0,
                }],
            ),
            TranscriptRecord::disabled(VideoCandidate::new("bbb", "Second")),
            TranscriptRecord::failed(VideoCandidate::new("ccc", "Third"), "timeout".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_transcripts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.json");

        let records = sample_records();
        save_transcripts(&records, &path).await.unwrap();
        let loaded = load_transcripts(&path).await.unwrap();

        assert_eq!(loaded, records);
        assert_eq!(loaded[1].status, TranscriptStatus::Disabled);
        assert_eq!(loaded[2].error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_digest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digest.md");

        let digest = Digest {
            subject: "YT DIGEST".to_string(),
            body_markdown: "### Title: First\n\n- takeaway".to_string(),
        };
        save_digest(&digest, &path).await.unwrap();
        let loaded = load_digest(&path).await.unwrap();

        assert_eq!(loaded, digest.body_markdown);
    }
}
