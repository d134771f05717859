//! Notification clients and the system message center

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::sqlite_helpers::now_timestamp;
use crate::db::{Database, MessageClientRecord};

/// Channel types a client row may name
pub const CHANNEL_TYPES: &[&str] = &[
    "telegram", "wechat", "serverchan", "bark", "pushplus", "iyuu", "slack", "gotify", "pushdeer",
];

/// Channels that can receive commands back from the user
pub const INTERACTIVE_TYPES: &[&str] = &["telegram", "wechat", "slack"];

/// Delivers to one kind of notification service
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, client: &MessageClientRecord, title: &str, text: &str, image: Option<&str>) -> Result<()>;

    /// Try a client configuration without saving it
    async fn status(&self, kind: &str, config: &serde_json::Value) -> bool;
}

/// Used when no channel implementation is wired in
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredChannel;

#[async_trait]
impl MessageChannel for UnconfiguredChannel {
    async fn send(&self, client: &MessageClientRecord, _title: &str, _text: &str, _image: Option<&str>) -> Result<()> {
        anyhow::bail!("No {} channel available for {}", client.kind, client.name)
    }

    async fn status(&self, _kind: &str, _config: &serde_json::Value) -> bool {
        false
    }
}

/// Outcome of a send to one client
#[derive(Debug, Clone, Serialize)]
pub struct ClientDelivery {
    pub id: i64,
    pub name: String,
    pub success: bool,
    pub message: String,
}

/// Cached client rows plus the channel that serves them
pub struct MessageService {
    channel: Arc<dyn MessageChannel>,
    clients: RwLock<Vec<MessageClientRecord>>,
}

impl MessageService {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            channel,
            clients: RwLock::new(Vec::new()),
        }
    }

    pub async fn reload(&self, db: &Database) -> Result<usize> {
        let clients = db.message_clients().list().await?;
        let count = clients.len();
        *self.clients.write() = clients;
        debug!(count, "Message clients loaded");
        Ok(count)
    }

    pub fn clients(&self) -> Vec<MessageClientRecord> {
        self.clients.read().clone()
    }

    pub fn client(&self, id: i64) -> Option<MessageClientRecord> {
        self.clients.read().iter().find(|c| c.id == id).cloned()
    }

    /// Send to every enabled client, or only to `ids` when given
    pub async fn send_custom_message(
        &self,
        ids: Option<&[i64]>,
        title: &str,
        text: &str,
        image: Option<&str>,
    ) -> Vec<ClientDelivery> {
        let targets: Vec<MessageClientRecord> = self
            .clients
            .read()
            .iter()
            .filter(|c| c.enabled && ids.is_none_or(|ids| ids.contains(&c.id)))
            .cloned()
            .collect();

        let mut results = Vec::with_capacity(targets.len());
        for client in targets {
            let outcome = self.channel.send(&client, title, text, image).await;
            let (success, message) = match outcome {
                Ok(()) => (true, String::new()),
                Err(e) => {
                    warn!(client = %client.name, error = %e, "Failed to send message");
                    (false, e.to_string())
                }
            };
            results.push(ClientDelivery {
                id: client.id,
                name: client.name,
                success,
                message,
            });
        }
        info!(title, sent = results.iter().filter(|r| r.success).count(), "Custom message sent");
        results
    }

    pub async fn status(&self, kind: &str, config: &serde_json::Value) -> bool {
        self.channel.status(kind, config).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemMessage {
    pub level: String,
    pub title: String,
    pub content: String,
    pub time: String,
}

const CENTER_CAPACITY: usize = 100;

/// Recent system messages shown on the dashboard
#[derive(Default)]
pub struct MessageCenter {
    messages: RwLock<VecDeque<SystemMessage>>,
}

impl MessageCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, level: &str, title: &str, content: &str) {
        self.push(SystemMessage {
            level: level.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            time: now_timestamp(),
        });
    }

    pub fn push(&self, message: SystemMessage) {
        let mut messages = self.messages.write();
        if messages.len() == CENTER_CAPACITY {
            messages.pop_back();
        }
        messages.push_front(message);
    }

    /// Newest first; only messages later than `lst_time` when given
    pub fn list(&self, lst_time: Option<&str>) -> Vec<SystemMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| lst_time.is_none_or(|t| t.is_empty() || m.time.as_str() > t))
            .cloned()
            .collect()
    }
}

static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br/?>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static HASHES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#+").expect("valid regex"));

/// Dashboard list item for a message. Markup in the content is stripped
/// except for line breaks.
pub fn render_message_html(message: &SystemMessage) -> String {
    let level = if message.level == "ERROR" { "bg-red" } else { "" };
    let content = BR_RE.replace_all(&message.content, "####");
    let content = TAG_RE.replace_all(&content, "");
    let content = HASHES_RE.replace_all(&content, "<br>");
    format!(
        r#"<div class="list-group-item"><div class="row align-items-center"><div class="col-auto"><span class="status-dot {} d-block"></span></div><div class="col text-truncate"><span class="text-wrap">{}</span><div class="d-block text-muted text-truncate mt-n1 text-wrap">{}</div><div class="d-block text-muted text-truncate mt-n1 text-wrap">{}</div></div></div></div>"#,
        level, message.title, content, message.time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CreateMessageClient;
    use pretty_assertions::assert_eq;

    fn message(time: &str, title: &str) -> SystemMessage {
        SystemMessage {
            level: "INFO".to_string(),
            title: title.to_string(),
            content: String::new(),
            time: time.to_string(),
        }
    }

    #[test]
    fn test_center_newest_first_and_filtered() {
        let center = MessageCenter::new();
        center.push(message("2024-01-01 10:00:00", "a"));
        center.push(message("2024-01-01 11:00:00", "b"));
        center.push(message("2024-01-01 12:00:00", "c"));

        let titles: Vec<String> = center.list(None).into_iter().map(|m| m.title).collect();
        assert_eq!(titles, vec!["c", "b", "a"]);

        let titles: Vec<String> = center
            .list(Some("2024-01-01 10:30:00"))
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["c", "b"]);
    }

    #[test]
    fn test_render_strips_markup() {
        let mut msg = message("2024-01-01 10:00:00", "Done");
        msg.level = "ERROR".to_string();
        msg.content = "<b>first</b><br/>second".to_string();
        let html = render_message_html(&msg);
        assert!(html.contains("bg-red"));
        assert!(html.contains("first<br>second"));
        assert!(!html.contains("<b>"));
    }

    struct RecordingChannel;

    #[async_trait]
    impl MessageChannel for RecordingChannel {
        async fn send(&self, client: &MessageClientRecord, _t: &str, _x: &str, _i: Option<&str>) -> Result<()> {
            if client.kind == "bark" {
                anyhow::bail!("bark offline");
            }
            Ok(())
        }

        async fn status(&self, kind: &str, _config: &serde_json::Value) -> bool {
            kind == "telegram"
        }
    }

    #[tokio::test]
    async fn test_send_only_to_enabled_clients() {
        let db = Database::connect_in_memory().await.unwrap();
        for (name, kind, enabled) in [("tg", "telegram", true), ("bk", "bark", true), ("off", "wechat", false)] {
            db.message_clients()
                .insert(CreateMessageClient {
                    name: name.to_string(),
                    kind: kind.to_string(),
                    config: serde_json::json!({}),
                    switchs: vec![],
                    interactive: false,
                    enabled,
                    note: None,
                })
                .await
                .unwrap();
        }

        let service = MessageService::new(Arc::new(RecordingChannel));
        assert_eq!(service.reload(&db).await.unwrap(), 3);
        let results = service.send_custom_message(None, "hi", "there", None).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.success).count(), 1);
        assert!(service.status("telegram", &serde_json::json!({})).await);
    }
}
