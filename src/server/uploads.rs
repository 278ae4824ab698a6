// Upload store: derives file names from the meta part and never overwrites

use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use rand::Rng;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::sanitize::{sanitize_name, sanitize_participant};
use super::StoreError;
use crate::{debug, info};

/// Highest `-N` suffix tried before giving up
pub const MAX_COLLISION_SUFFIX: u32 = 9999;

/// The four upload endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    TrialAudio,
    QuestionClip,
    TaskLog,
    TextLog,
}

impl UploadKind {
    /// Multipart field carrying the payload
    pub fn file_field(self) -> &'static str {
        match self {
            UploadKind::TrialAudio | UploadKind::QuestionClip => "audio",
            UploadKind::TaskLog | UploadKind::TextLog => "log",
        }
    }

    fn dir(self) -> &'static str {
        match self {
            UploadKind::TrialAudio => "audio",
            UploadKind::QuestionClip => "question_clips",
            UploadKind::TaskLog => "tasklog",
            UploadKind::TextLog => "textlog",
        }
    }
}

/// Fields read from the `meta` part
///
/// Numbers may arrive as JSON numbers or numeric strings; anything else is
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadMeta {
    pub participant: Option<String>,
    pub trial_no: Option<i64>,
    pub status: Option<String>,
    pub start_ts: Option<i64>,
    pub duration_ms: Option<f64>,
    pub index: Option<String>,
    pub question: Option<String>,
    pub mime_type: Option<String>,
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl UploadMeta {
    /// Parse the meta part; non-object JSON yields the defaults
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| value.get(key).filter(|v| !v.is_null());
        Self {
            participant: field("participant").and_then(text),
            trial_no: field("trialNo").and_then(numeric).map(|n| n.trunc() as i64),
            status: field("status").and_then(text),
            start_ts: field("startTs").and_then(numeric).map(|n| n as i64),
            duration_ms: field("durationMs").and_then(numeric),
            index: field("index").and_then(text),
            question: field("question").and_then(text),
            mime_type: field("mimeType").and_then(text),
        }
    }

    fn is_aborted(&self) -> bool {
        self.status.as_deref() == Some("aborted")
    }

    /// 1-based trial number; missing or < 1 becomes 1
    fn trial_no(&self) -> i64 {
        self.trial_no.filter(|n| *n >= 1).unwrap_or(1)
    }
}

/// `YYYYMMDD_HHMMSS` in server local time, from `start_ts` when given
pub fn format_stamp(start_ts: Option<i64>, now_ms: i64) -> String {
    let at = start_ts
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .or_else(|| Local.timestamp_millis_opt(now_ms).single())
        .unwrap_or_else(Local::now);
    at.format("%Y%m%d_%H%M%S").to_string()
}

fn audio_extension(mime: Option<&str>) -> &'static str {
    match mime {
        Some(m) if m.contains("wav") => "wav",
        Some(m) if m.contains("mp4") => "mp4",
        Some(m) if m.contains("ogg") => "ogg",
        _ => "webm",
    }
}

/// Where an upload goes, before collision handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TargetName {
    /// Directory relative to the data root
    pub dir: PathBuf,
    pub base: String,
    pub ext: &'static str,
}

pub(crate) fn target_name(
    kind: UploadKind,
    meta: &UploadMeta,
    content_type: Option<&str>,
    now_ms: i64,
) -> TargetName {
    let participant = sanitize_participant(meta.participant.as_deref());
    let stamp = format_stamp(meta.start_ts, now_ms);
    let ab = if meta.is_aborted() { "_ab" } else { "" };
    let trial_no = meta.trial_no();
    let mime = meta.mime_type.as_deref().or(content_type);

    match kind {
        UploadKind::TrialAudio => {
            let duration = meta
                .duration_ms
                .map(|ms| format!("_{:.1}s", ms.max(0.0) / 1000.0))
                .unwrap_or_default();
            TargetName {
                dir: PathBuf::from(kind.dir()),
                base: format!("{participant}{ab}_trial{trial_no}_{stamp}{duration}"),
                ext: audio_extension(mime),
            }
        }
        UploadKind::QuestionClip => {
            let index = meta
                .index
                .as_deref()
                .map_or_else(|| "idxNA".to_string(), |i| format!("idx{}", i));
            let question = meta
                .question
                .as_deref()
                .and_then(sanitize_name)
                .unwrap_or_else(|| "qNA".to_string());
            TargetName {
                dir: Path::new(kind.dir()).join(&participant),
                base: format!("{participant}_{index}_{question}_{stamp}"),
                ext: audio_extension(mime),
            }
        }
        UploadKind::TaskLog | UploadKind::TextLog => {
            let tag = if kind == UploadKind::TaskLog {
                "taskLog"
            } else {
                "textLog"
            };
            TargetName {
                dir: PathBuf::from(kind.dir()),
                base: format!("{participant}{ab}_trial{trial_no}_{stamp}_{tag}"),
                ext: "json",
            }
        }
    }
}

/// Candidate file name for the `attempt`-th try (1-based)
///
/// Clips get a random hex suffix on collision, everything else `-2`, `-3`, ...
pub(crate) fn candidate(kind: UploadKind, target: &TargetName, attempt: u32) -> String {
    if attempt <= 1 {
        return format!("{}.{}", target.base, target.ext);
    }
    match kind {
        UploadKind::QuestionClip => {
            let suffix: u32 = rand::rng().random_range(0..0x100_0000);
            format!("{}_{:06x}.{}", target.base, suffix, target.ext)
        }
        _ => format!("{}-{}.{}", target.base, attempt, target.ext),
    }
}

/// Writes uploads under `audio/`, `question_clips/`, `tasklog/` and `textlog/`
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.to_path_buf(),
        }
    }

    /// Store `bytes` under a fresh name; returns the file name
    pub async fn save(
        &self,
        kind: UploadKind,
        meta: &UploadMeta,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let target = target_name(kind, meta, content_type, crate::events::epoch_ms());
        let dir = self.root.join(&target.dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        for attempt in 1..=MAX_COLLISION_SUFFIX {
            let name = candidate(kind, &target, attempt);
            let path = dir.join(&name);
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("[server] {} exists; trying next name", name);
                    continue;
                }
                Err(e) => return Err(StoreError::io(&path, e)),
            };
            file.write_all(bytes)
                .await
                .map_err(|e| StoreError::io(&path, e))?;
            file.flush().await.map_err(|e| StoreError::io(&path, e))?;

            info!(
                "[server] stored {} ({} bytes) in {}",
                name,
                bytes.len(),
                target.dir.display()
            );
            return Ok(name);
        }
        Err(StoreError::TooManyCollisions(target.base))
    }
}
