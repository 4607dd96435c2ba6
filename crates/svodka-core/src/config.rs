//! Run configuration and the subscription file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, SvodkaError};
use crate::provider::Provider;
use crate::transcript::DEFAULT_PREFERRED_LANGUAGES;

pub const DEFAULT_SUBJECT: &str = "YT DIGEST";
pub const DEFAULT_LIMIT: usize = 5;

/// Everything one pipeline run needs, passed explicitly into each component.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub keyword: String,
    pub limit: usize,
    pub preferred_languages: Vec<String>,
    pub provider: Provider,
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
    pub subject: String,
    pub recipients: Vec<String>,
    pub output_dir: PathBuf,
}

impl RunConfig {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            limit: DEFAULT_LIMIT,
            preferred_languages: preferred_languages_for("en"),
            provider: Provider::default(),
            model: None,
            subject: DEFAULT_SUBJECT.to_string(),
            recipients: Vec::new(),
            output_dir: PathBuf::from("."),
        }
    }

    pub fn transcripts_path(&self) -> PathBuf {
        self.output_dir.join("transcripts.json")
    }

    pub fn digest_path(&self) -> PathBuf {
        self.output_dir.join("digest.md")
    }
}

/// English expands to its regional variants; anything else is tried as given.
pub fn preferred_languages_for(lang: &str) -> Vec<String> {
    if lang == "en" {
        DEFAULT_PREFERRED_LANGUAGES
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        vec![lang.to_string()]
    }
}

/// One entry of the subscription file: who gets a digest for which keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub email: String,
    pub keyword: String,
}

/// Load and validate the subscription file: a JSON array of
/// `{"email", "keyword"}` objects. Entries missing either field or with a
/// non-address email are skipped with a warning; an empty result is an error.
pub fn load_subscriptions(path: &Path) -> Result<Vec<Subscription>> {
    let raw = std::fs::read_to_string(path).map_err(|e| SvodkaError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let entries: Vec<Value> =
        serde_json::from_str(&raw).map_err(|e| SvodkaError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: format!("expected a JSON array of objects: {e}"),
        })?;

    let mut subscriptions = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let email = entry["email"].as_str().map(str::trim).unwrap_or("");
        let keyword = entry["keyword"].as_str().map(str::trim).unwrap_or("");

        if email.is_empty() || !email.contains('@') {
            warn!("subscription entry {idx} has a missing or invalid email, skipping");
            continue;
        }
        if keyword.is_empty() {
            warn!("subscription entry {idx} has no keyword, skipping");
            continue;
        }
        subscriptions.push(Subscription {
            email: email.to_string(),
            keyword: keyword.to_string(),
        });
    }

    if subscriptions.is_empty() {
        return Err(SvodkaError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: "no valid subscription entries".to_string(),
        });
    }
    info!(
        "loaded {} subscription(s) from {}",
        subscriptions.len(),
        path.display()
    );
    Ok(subscriptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_subscriptions(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_skips_invalid_entries() {
        let file = write_subscriptions(
            r#"[
                {"email": "a@example.com", "keyword": "News"},
                {"email": "not-an-address", "keyword": "News"},
                {"email": "b@example.com"},
                {"email": " c@example.com ", "keyword": " Rust "}
            ]"#,
        );
        let subscriptions = load_subscriptions(file.path()).unwrap();
        assert_eq!(subscriptions.len(), 2);
        assert_eq!(subscriptions[0].email, "a@example.com");
        assert_eq!(subscriptions[1].email, "c@example.com");
        assert_eq!(subscriptions[1].keyword, "Rust");
    }

    #[test]
    fn test_load_rejects_empty_file() {
        let file = write_subscriptions("[]");
        assert!(matches!(
            load_subscriptions(file.path()),
            Err(SvodkaError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let file = write_subscriptions("{\"email\": \"a@example.com\"}");
        assert!(load_subscriptions(file.path()).is_err());
    }

    #[test]
    fn test_preferred_languages_expand_english() {
        assert_eq!(preferred_languages_for("en"), vec!["en", "en-US", "en-GB"]);
        assert_eq!(preferred_languages_for("de"), vec!["de"]);
    }

    #[test]
    fn test_run_config_paths() {
        let mut config = RunConfig::new("News");
        config.output_dir = PathBuf::from("/tmp/out");
        assert_eq!(
            config.transcripts_path(),
            PathBuf::from("/tmp/out/transcripts.json")
        );
        assert_eq!(config.digest_path(), PathBuf::from("/tmp/out/digest.md"));
    }
}
