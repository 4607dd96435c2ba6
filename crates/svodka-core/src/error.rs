use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SvodkaError {
    #[error("Search failed for \"{keyword}\": {reason}")]
    SearchFailed { keyword: String, reason: String },

    #[error("Digest generation failed: {reason}")]
    GenerationFailed { reason: String },

    #[error("No usable transcripts to summarize")]
    NoContent,

    #[error("Invalid subscription file {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("XML parse error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },
}

pub type Result<T> = std::result::Result<T, SvodkaError>;
