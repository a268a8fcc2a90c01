use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal classification of a finished conversion.
///
/// Stored alongside the free-text error message so callers can branch on the
/// kind of ending instead of matching message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionOutcome {
    Succeeded,
    Failed,
    Aborted,
}

/// Authoritative status record for one conversion.
///
/// Once `complete` is true the record is frozen: no store mutation will
/// change it again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionStatus {
    /// Original (user-facing) filename of the source.
    pub filename: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Target container format, e.g. "mp4".
    pub format: String,
    /// Quality preset name the job was submitted with.
    pub quality: String,
    /// Progress percentage in [0, 100]. Only reaches 100 via success.
    pub progress: f32,
    pub complete: bool,
    /// Empty string means no error.
    pub error: String,
    /// Set when `complete` becomes true.
    pub outcome: Option<ConversionOutcome>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversionStatus {
    pub fn new(
        filename: impl Into<String>,
        input_path: PathBuf,
        output_path: PathBuf,
        format: impl Into<String>,
        quality: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            input_path,
            output_path,
            format: format.into(),
            quality: quality.into(),
            progress: 0.0,
            complete: false,
            error: String::new(),
            outcome: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A submitted conversion job. 1:1 with a [`ConversionStatus`] under the
/// same conversion id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Caller-generated unique conversion id.
    pub id: String,
    /// Where the source was fetched from, if it was downloaded.
    pub source_url: Option<String>,
    pub original_filename: String,
    pub format: String,
    pub quality: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Reverse playback of video and audio.
    pub reverse: bool,
    /// Strip the audio track.
    pub mute: bool,
}

/// Serializable projection of a conversion published with status events and
/// returned from the status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub id: String,
    pub filename: String,
    pub progress: f32,
    pub complete: bool,
    pub error: String,
    pub outcome: Option<ConversionOutcome>,
    pub format: String,
    pub quality: String,
    /// Download path for the finished output, present once the conversion
    /// completed without error.
    pub download_url: Option<String>,
}

impl ConversionSummary {
    pub fn from_status(id: &str, status: &ConversionStatus) -> Self {
        let download_url = if status.complete && status.error.is_empty() {
            status
                .output_path
                .file_name()
                .map(|n| format!("/downloads/{}", n.to_string_lossy()))
        } else {
            None
        };

        Self {
            id: id.to_string(),
            filename: status.filename.clone(),
            progress: status.progress,
            complete: status.complete,
            error: status.error.clone(),
            outcome: status.outcome,
            format: status.format.clone(),
            quality: status.quality.clone(),
            download_url,
        }
    }
}

/// Push notification emitted by the store on every observable mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreEvent {
    /// A status was inserted or mutated.
    Status {
        conversion_id: String,
        status: ConversionSummary,
    },
    /// A status was removed from the store.
    Removed { conversion_id: String },
}

impl StoreEvent {
    pub fn conversion_id(&self) -> &str {
        match self {
            StoreEvent::Status { conversion_id, .. } => conversion_id,
            StoreEvent::Removed { conversion_id } => conversion_id,
        }
    }
}

/// Lightweight read projection for conversions that are registered as
/// running and not yet complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveConversionInfo {
    pub id: String,
    pub filename: String,
    pub format: String,
    pub quality: String,
    pub progress: f32,
}
