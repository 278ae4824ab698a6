// HTTP relay client for posting and polling room events

use std::time::Duration;

use async_trait::async_trait;

use super::types::{EventsReply, OutgoingEvent, PostAck, PostReply, RelayEvent, TriggerMessage};
use super::{RelayError, RESET, TRIGGER};
use crate::config::RelayConfig;
use crate::{debug, warn};

/// Room-scoped append log shared by the task and screen devices
/// Allows mocking in tests while using HTTP in production
#[async_trait]
pub trait EventRelay: Send + Sync {
    /// Append a TRIGGER event to the room
    async fn post_trigger(&self, trigger: &TriggerMessage) -> Result<PostAck, RelayError>;

    /// Events with `id > since`, oldest first, at most `limit`
    async fn fetch_since(&self, since: u64, limit: u32) -> Result<Vec<RelayEvent>, RelayError>;

    /// Truncate the room's log and id counter
    async fn reset(&self) -> Result<(), RelayError>;
}

/// Relay client for `<api_base>/events`
#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    client: reqwest::Client,
    events_url: String,
    room_id: String,
}

impl HttpRelayClient {
    pub fn new(
        api_base: &str,
        room_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            events_url: format!("{}/events", api_base.trim_end_matches('/')),
            room_id: room_id.into(),
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        Self::new(
            &config.api_base,
            config.room_id.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn post(&self, body: &OutgoingEvent<'_>) -> Result<PostReply, RelayError> {
        let response = self.client.post(&self.events_url).json(body).send().await?;
        let status = response.status();
        let reply: PostReply = response.json().await.unwrap_or_default();
        if !status.is_success() || !reply.ok {
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                message: reply.error.unwrap_or_else(|| "no error message".to_string()),
            });
        }
        Ok(reply)
    }
}

#[async_trait]
impl EventRelay for HttpRelayClient {
    async fn post_trigger(&self, trigger: &TriggerMessage) -> Result<PostAck, RelayError> {
        let body = OutgoingEvent {
            room_id: &self.room_id,
            event_type: TRIGGER,
            from: Some("task"),
            trigger: Some(trigger),
        };
        let reply = self.post(&body).await?;
        match (reply.id, reply.server_ts) {
            (Some(id), Some(server_ts)) => {
                debug!(
                    "[relay] trigger {} accepted as id {} in room {}",
                    trigger.trigger_index, id, self.room_id
                );
                Ok(PostAck { id, server_ts })
            }
            _ => Err(RelayError::MalformedReply(
                "missing id or serverTs".to_string(),
            )),
        }
    }

    async fn fetch_since(&self, since: u64, limit: u32) -> Result<Vec<RelayEvent>, RelayError> {
        let response = self
            .client
            .get(&self.events_url)
            .query(&[
                ("roomId", self.room_id.clone()),
                ("since", since.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        let reply: EventsReply = response.json().await?;
        if !status.is_success() || !reply.ok {
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                message: reply.error.unwrap_or_else(|| "no error message".to_string()),
            });
        }

        // Skip individual malformed lines rather than failing the whole poll
        let mut events = Vec::with_capacity(reply.events.len());
        for raw in reply.events {
            match serde_json::from_value::<RelayEvent>(raw) {
                Ok(event) => events.push(event),
                Err(e) => warn!("[relay] skipping malformed event: {}", e),
            }
        }
        Ok(events)
    }

    async fn reset(&self) -> Result<(), RelayError> {
        let body = OutgoingEvent {
            room_id: &self.room_id,
            event_type: RESET,
            from: None,
            trigger: None,
        };
        let reply = self.post(&body).await?;
        if !reply.reset {
            return Err(RelayError::MalformedReply("reset not acknowledged".to_string()));
        }
        Ok(())
    }
}
