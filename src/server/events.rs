// Room-scoped append log: `events_<room>.jsonl` plus an `events_<room>.id` counter

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use super::sanitize::safe_room_id;
use super::StoreError;
use crate::events::epoch_ms;
use crate::{debug, info, warn};

/// Events returned when the client asks for none or a non-positive limit
pub const DEFAULT_LIMIT: usize = 200;
/// Hard cap on events per request
pub const MAX_LIMIT: usize = 1000;

/// Clamp a requested limit to `1..=MAX_LIMIT`
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => (n as u64).min(MAX_LIMIT as u64) as usize,
        _ => DEFAULT_LIMIT,
    }
}

/// Id and timestamp assigned to an appended event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedEvent {
    pub room_id: String,
    pub id: u64,
    pub server_ts: i64,
}

/// File-backed event log, one file pair per room
///
/// Appends and resets for a room run under that room's lock, so ids are
/// strictly increasing per room even with concurrent posts.
pub struct EventStore {
    dir: PathBuf,
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EventStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("_events"),
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn room_lock(&self, room: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(room.to_string())
            .or_default()
            .clone()
    }

    fn log_path(&self, room: &str) -> PathBuf {
        self.dir.join(format!("events_{}.jsonl", room))
    }

    fn id_path(&self, room: &str) -> PathBuf {
        self.dir.join(format!("events_{}.id", room))
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))
    }

    /// Assign the next id and append `body` as one JSON line
    ///
    /// `roomId`, `serverTs` and `id` in `body` are overwritten; every other
    /// field is stored as sent.
    pub async fn append(
        &self,
        raw_room: &str,
        mut body: Map<String, Value>,
    ) -> Result<AppendedEvent, StoreError> {
        let room = safe_room_id(raw_room);
        self.ensure_dir().await?;
        let lock = self.room_lock(&room);
        let _guard = lock.lock().await;

        let id_path = self.id_path(&room);
        let current = match tokio::fs::read_to_string(&id_path).await {
            Ok(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!("[server] unreadable id counter for room {}; restarting at 0", room);
                0
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(StoreError::io(&id_path, e)),
        };
        let id = current + 1;
        tokio::fs::write(&id_path, id.to_string())
            .await
            .map_err(|e| StoreError::io(&id_path, e))?;

        let server_ts = epoch_ms();
        body.insert("roomId".to_string(), Value::from(room.clone()));
        body.insert("serverTs".to_string(), Value::from(server_ts));
        body.insert("id".to_string(), Value::from(id));
        let mut line = serde_json::to_vec(&body)?;
        line.push(b'\n');

        let log_path = self.log_path(&room);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(|e| StoreError::io(&log_path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io(&log_path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&log_path, e))?;

        debug!("[server] room {} event {} appended", room, id);
        Ok(AppendedEvent {
            room_id: room,
            id,
            server_ts,
        })
    }

    /// Truncate the room's log and set its counter back to 0
    pub async fn reset(&self, raw_room: &str) -> Result<String, StoreError> {
        let room = safe_room_id(raw_room);
        self.ensure_dir().await?;
        let lock = self.room_lock(&room);
        let _guard = lock.lock().await;

        let log_path = self.log_path(&room);
        tokio::fs::write(&log_path, b"")
            .await
            .map_err(|e| StoreError::io(&log_path, e))?;
        let id_path = self.id_path(&room);
        tokio::fs::write(&id_path, b"0")
            .await
            .map_err(|e| StoreError::io(&id_path, e))?;

        info!("[server] room {} reset", room);
        Ok(room)
    }

    /// Events with `id > since`, in file order, at most `limit`
    ///
    /// Unknown rooms yield an empty list. Lines that do not parse are skipped.
    pub async fn since(
        &self,
        raw_room: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let room = safe_room_id(raw_room);
        let since = since.max(0) as u64;
        let lock = self.room_lock(&room);
        let _guard = lock.lock().await;

        let log_path = self.log_path(&room);
        let raw = match tokio::fs::read_to_string(&log_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&log_path, e)),
        };

        let events = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter(|event| event.is_object())
            .filter(|event| event.get("id").and_then(Value::as_u64).unwrap_or(0) > since)
            .take(limit)
            .collect();
        Ok(events)
    }
}
