//! Notification client actions

use super::prelude::*;
use crate::services::message::{CHANNEL_TYPES, INTERACTIVE_TYPES};

#[derive(Debug, Deserialize)]
pub struct MessageClientForm {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub cid: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub name: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "params::opt_string")]
    pub kind: Option<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default, deserialize_with = "params::string_list")]
    pub switchs: Vec<String>,
    #[serde(default, deserialize_with = "params::flag")]
    pub interactive: bool,
    #[serde(default, deserialize_with = "params::flag")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClientIdRequest {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub cid: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckClientRequest {
    #[serde(default)]
    pub flag: String,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub cid: Option<i64>,
    #[serde(default, rename = "type", deserialize_with = "params::opt_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "params::flag")]
    pub checked: bool,
}

#[derive(Debug, Deserialize)]
pub struct TestClientRequest {
    #[serde(default, rename = "type", deserialize_with = "params::opt_string")]
    pub kind: Option<String>,
    #[serde(default)]
    pub config: Value,
}

/// The page posts the config either as an object or as its JSON text
fn parse_client_config(config: Value) -> Result<Value, ActionError> {
    match config {
        Value::String(text) if text.trim().is_empty() => Ok(json!({})),
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        Value::Null => Ok(json!({})),
        other => Ok(other),
    }
}

impl WebActions {
    pub(super) async fn update_message_client(&self, form: MessageClientForm) -> ActionResult {
        let name = form.name.ok_or_else(|| ActionError::failed("client name is required"))?;
        let kind = form.kind.ok_or_else(|| ActionError::failed("client type is required"))?;
        if !CHANNEL_TYPES.contains(&kind.as_str()) {
            return Err(ActionError::failed(format!("unsupported client type {}", kind)));
        }
        let config = parse_client_config(form.config)?;
        let interactive = form.interactive && INTERACTIVE_TYPES.contains(&kind.as_str());

        let repo = self.db.message_clients();
        if let Some(cid) = form.cid {
            repo.delete(cid).await?;
        }
        let id = repo
            .insert(CreateMessageClient {
                name: name.clone(),
                kind,
                config,
                switchs: form.switchs,
                interactive,
                enabled: form.enabled,
                note: None,
            })
            .await?;
        info!(id, name = %name, "Message client saved");
        self.messages.reload(&self.db).await?;
        Ok(ActionReply::ok())
    }

    pub(super) async fn delete_message_client(&self, req: ClientIdRequest) -> ActionResult {
        let deleted = match req.cid {
            Some(cid) => self.db.message_clients().delete(cid).await?,
            None => false,
        };
        if !deleted {
            return Ok(ActionReply::with_code(1));
        }
        self.messages.reload(&self.db).await?;
        Ok(ActionReply::ok())
    }

    pub(super) async fn check_message_client(&self, req: CheckClientRequest) -> ActionResult {
        let cid = req.cid.ok_or_else(|| ActionError::failed("client id is required"))?;
        let repo = self.db.message_clients();
        match req.flag.as_str() {
            "interactive" => {
                // Only one client per type answers commands
                if req.checked
                    && let Some(kind) = req.kind.as_deref()
                {
                    repo.clear_interactive(kind).await?;
                }
                repo.set_interactive(cid, req.checked).await?;
            }
            "enable" => repo.set_enabled(cid, req.checked).await?,
            _ => return Ok(ActionReply::with_code(1)),
        }
        self.messages.reload(&self.db).await?;
        Ok(ActionReply::ok())
    }

    pub(super) fn get_message_client(&self, req: ClientIdRequest) -> ActionResult {
        let detail = req.cid.and_then(|cid| self.messages.client(cid));
        Ok(ActionReply::ok().field("detail", detail))
    }

    pub(super) async fn test_message_client(&self, req: TestClientRequest) -> ActionResult {
        let kind = req.kind.unwrap_or_default();
        let config = parse_client_config(req.config)?;
        if self.messages.status(&kind, &config).await {
            Ok(ActionReply::ok())
        } else {
            debug!(kind = %kind, "Message client test failed");
            Ok(ActionReply::with_code(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_accepts_text() {
        assert_eq!(
            parse_client_config(json!("{\"token\":\"abc\"}")).unwrap(),
            json!({"token": "abc"})
        );
        assert_eq!(parse_client_config(json!("")).unwrap(), json!({}));
        assert_eq!(parse_client_config(json!({"a": 1})).unwrap(), json!({"a": 1}));
        assert!(parse_client_config(json!("{broken")).is_err());
    }
}
