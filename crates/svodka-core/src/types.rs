use serde::{Deserialize, Serialize};

/// A video returned by search, not yet confirmed to have a usable transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub id: String,
    pub title: String,
    pub url: String,
}

impl VideoCandidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        let url = format!("https://www.youtube.com/watch?v={}", id);
        Self {
            id,
            title: title.into(),
            url,
        }
    }
}

/// A timestamped fragment of spoken text within a video's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    /// Start offset in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Ok,
    Unavailable,
    Disabled,
    Error,
}

/// Outcome of fetching one candidate's transcript.
///
/// Status `Ok` always carries a non-empty segment list; every other status
/// carries an empty one. `error` holds the backend message for status `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub video: VideoCandidate,
    pub language: String,
    pub segments: Vec<Segment>,
    pub status: TranscriptStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl TranscriptRecord {
    pub fn ok(video: VideoCandidate, language: String, segments: Vec<Segment>) -> Self {
        Self {
            video,
            language,
            segments,
            status: TranscriptStatus::Ok,
            error: None,
        }
    }

    pub fn unavailable(video: VideoCandidate) -> Self {
        Self {
            video,
            language: String::new(),
            segments: Vec::new(),
            status: TranscriptStatus::Unavailable,
            error: None,
        }
    }

    pub fn disabled(video: VideoCandidate) -> Self {
        Self {
            video,
            language: String::new(),
            segments: Vec::new(),
            status: TranscriptStatus::Disabled,
            error: None,
        }
    }

    pub fn failed(video: VideoCandidate, message: String) -> Self {
        Self {
            video,
            language: String::new(),
            segments: Vec::new(),
            status: TranscriptStatus::Error,
            error: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TranscriptStatus::Ok
    }

    /// The full transcript as one string, timestamps discarded.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The generated newsletter document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub subject: String,
    pub body_markdown: String,
}
