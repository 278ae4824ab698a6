// HTTP uploader: multipart POSTs against the collector backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{
    ArtifactUploader, AudioUploadMeta, ClipUploadMeta, LogUploadMeta, UploadError, UploadReceipt,
};
use crate::{debug, warn};

const WAV_MIME: &str = "audio/wav";
const JSON_MIME: &str = "application/json";

/// Reply body shared by all upload endpoints
#[derive(Debug, Default, Deserialize)]
struct UploadReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Uploads artifacts to `<api_base>/upload_*`
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    api_base: String,
}

impl HttpUploader {
    /// Create an uploader for the collector at `api_base` (e.g. `http://host:8787/api`)
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(
        &self,
        endpoint: &str,
        field: &'static str,
        file_name: &'static str,
        mime: &str,
        body: Vec<u8>,
        meta_json: String,
    ) -> Result<UploadReceipt, UploadError> {
        let url = format!("{}/{}", self.api_base, endpoint);
        let size = body.len();
        let part = Part::bytes(body).file_name(file_name).mime_str(mime)?;
        let form = Form::new().part(field, part).text("meta", meta_json);

        debug!("[upload] POST {} ({} bytes)", url, size);
        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        let reply: UploadReply = response.json().await.unwrap_or_default();

        match reply.file {
            Some(file) if status.is_success() && reply.ok => Ok(UploadReceipt { file }),
            _ => {
                let message = reply
                    .error
                    .unwrap_or_else(|| "missing file in reply".to_string());
                warn!("[upload] {} rejected ({}): {}", endpoint, status, message);
                Err(UploadError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl ArtifactUploader for HttpUploader {
    async fn upload_trial_audio(
        &self,
        wav: Vec<u8>,
        meta: AudioUploadMeta,
    ) -> Result<UploadReceipt, UploadError> {
        let meta_json = serde_json::to_string(&meta)?;
        self.post("upload_audio", "audio", "audio.wav", WAV_MIME, wav, meta_json)
            .await
    }

    async fn upload_clip(
        &self,
        wav: Vec<u8>,
        meta: ClipUploadMeta,
    ) -> Result<UploadReceipt, UploadError> {
        let meta_json = serde_json::to_string(&meta)?;
        self.post(
            "upload_question_clip",
            "audio",
            "clip.wav",
            WAV_MIME,
            wav,
            meta_json,
        )
        .await
    }

    async fn upload_task_log(
        &self,
        body: Vec<u8>,
        meta: LogUploadMeta,
    ) -> Result<UploadReceipt, UploadError> {
        let meta_json = serde_json::to_string(&meta)?;
        self.post("upload_log", "log", "taskLog.json", JSON_MIME, body, meta_json)
            .await
    }

    async fn upload_text_log(
        &self,
        body: Vec<u8>,
        meta: LogUploadMeta,
    ) -> Result<UploadReceipt, UploadError> {
        let meta_json = serde_json::to_string(&meta)?;
        self.post(
            "upload_textlog",
            "log",
            "textLog.json",
            JSON_MIME,
            body,
            meta_json,
        )
        .await
    }
}
