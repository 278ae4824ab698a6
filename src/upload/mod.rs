// Artifact uploads: trial audio, prompt clips, task logs and speech logs
// Defines upload metadata and the uploader trait for testability

mod http;

pub use http::HttpUploader;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status tag carried by every trial artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    /// Still running when the artifact was cut
    #[default]
    Recording,
    Completed,
    /// Left before completion; the collector tags the file name with `_ab`
    Aborted,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Recording => "recording",
            TrialStatus::Completed => "completed",
            TrialStatus::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for a continuous trial recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioUploadMeta {
    pub participant: String,
    /// 1-based trial number
    pub trial_no: u32,
    pub status: TrialStatus,
    /// Epoch milliseconds
    pub start_ts: i64,
    pub end_ts: i64,
    pub duration_ms: u64,
    pub mime_type: String,
}

/// Metadata for a prompt-response clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipUploadMeta {
    pub participant: String,
    /// Plan index of the trigger that armed the clip
    pub index: usize,
    /// Prompt id, e.g. `"question"` or `"27-8"`
    pub question: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub duration_ms: u64,
    pub mime_type: String,
}

/// Metadata shared by the task log and the speech log of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUploadMeta {
    pub participant: String,
    pub trial_no: u32,
    pub status: TrialStatus,
    /// Numbers correctly pressed (`total` when completed)
    pub progress: u32,
    pub total: u32,
    pub miss_count: u32,
    pub elapsed_ms: Option<u64>,
    pub start_ts: Option<i64>,
    pub end_ts: i64,
    pub session_id: String,
}

/// Collector acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// File name chosen by the collector
    pub file: String,
}

/// Errors that can occur while uploading an artifact
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Collector rejected upload with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Failed to encode upload metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for trial artifacts
/// Allows mocking in tests while using the HTTP collector in production
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Upload the continuous recording of one trial (WAV bytes)
    async fn upload_trial_audio(
        &self,
        wav: Vec<u8>,
        meta: AudioUploadMeta,
    ) -> Result<UploadReceipt, UploadError>;

    /// Upload a prompt-response clip (WAV bytes)
    async fn upload_clip(
        &self,
        wav: Vec<u8>,
        meta: ClipUploadMeta,
    ) -> Result<UploadReceipt, UploadError>;

    /// Upload the click/beep/trigger log of one trial (JSON bytes)
    async fn upload_task_log(
        &self,
        body: Vec<u8>,
        meta: LogUploadMeta,
    ) -> Result<UploadReceipt, UploadError>;

    /// Upload the speech transcript log of one trial (JSON bytes)
    async fn upload_text_log(
        &self,
        body: Vec<u8>,
        meta: LogUploadMeta,
    ) -> Result<UploadReceipt, UploadError>;
}

#[cfg(test)]
#[path = "upload_test.rs"]
pub(crate) mod tests;
