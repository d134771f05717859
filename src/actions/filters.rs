//! Filter rule group actions

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

use super::prelude::*;
use crate::services::filter::{FilterCandidate, builtin_rule_groups};

#[derive(Debug, Deserialize)]
pub struct AddGroupRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "params::flag")]
    pub default: bool,
}

#[derive(Debug, Deserialize)]
pub struct RestoreGroupsRequest {
    #[serde(default, deserialize_with = "params::id_list")]
    pub groupids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FilterRuleForm {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub rule_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub group_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub rule_name: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub rule_pri: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub rule_include: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub rule_exclude: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub rule_sizelimit: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub rule_free: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleDetailRequest {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub ruleid: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub groupid: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ImportGroupRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RuleTestRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub subtitle: Option<String>,
    /// Gigabytes
    #[serde(default, deserialize_with = "params::opt_string")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub rulegroup: Option<i64>,
}

/// Exchange format of `share_filtergroup` / `import_filtergroup`
#[derive(Debug, Serialize, Deserialize)]
struct SharedGroup {
    #[serde(default, deserialize_with = "params::opt_string")]
    name: Option<String>,
    #[serde(default)]
    rules: Vec<SharedRule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SharedRule {
    #[serde(default, deserialize_with = "params::opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pri: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    include: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    exclude: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    size: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    free: Option<String>,
}

impl SharedRule {
    fn into_save(self, group_id: i64) -> SaveFilterRule {
        SaveFilterRule {
            group_id,
            name: self.name.unwrap_or_default(),
            priority: self.pri.unwrap_or_default(),
            include: self.include.unwrap_or_default(),
            exclude: self.exclude.unwrap_or_default(),
            size_limit: self.size.unwrap_or_default(),
            note: self.free.unwrap_or_default(),
        }
    }
}

impl WebActions {
    pub(super) async fn add_filtergroup(&self, req: AddGroupRequest) -> ActionResult {
        let name = req.name.ok_or_else(|| ActionError::invalid("group name is required"))?;
        let id = self.db.filter_rules().add_group(&name, req.default).await?;
        info!(id, name = %name, "Filter group saved");
        self.filter.reload(&self.db).await?;
        Ok(ActionReply::ok())
    }

    /// Recreate the built-in groups with the given ids
    pub(super) async fn restore_filtergroup(&self, req: RestoreGroupsRequest) -> ActionResult {
        let repo = self.db.filter_rules();
        for id in req.groupids {
            if let Err(e) = repo.delete_group(id).await {
                error!(id, error = %e, "Failed to delete filter group");
            }
            let Some(builtin) = builtin_rule_groups().iter().find(|g| g.id == id) else {
                warn!(id, "No built-in filter group with this id");
                continue;
            };
            repo.restore_group(builtin.id, builtin.name, false).await?;
            for rule in builtin.rules {
                repo.save_rule(
                    SaveFilterRule {
                        group_id: builtin.id,
                        name: rule.name.to_string(),
                        priority: rule.pri.to_string(),
                        include: rule.include.join("\n"),
                        exclude: rule.exclude.join("\n"),
                        size_limit: rule.size.to_string(),
                        note: rule.free.to_string(),
                    },
                    None,
                )
                .await?;
            }
            info!(id, name = builtin.name, "Built-in filter group restored");
        }
        self.filter.reload(&self.db).await?;
        Ok(ActionReply::ok())
    }

    pub(super) async fn set_default_filtergroup(&self, req: IdRequest) -> ActionResult {
        let id = req.id.ok_or_else(|| ActionError::invalid("group id is required"))?;
        self.db.filter_rules().set_default_group(id).await?;
        self.filter.reload(&self.db).await?;
        Ok(ActionReply::ok())
    }

    pub(super) async fn del_filtergroup(&self, req: IdRequest) -> ActionResult {
        if let Some(id) = req.id {
            self.db.filter_rules().delete_group(id).await?;
            self.filter.reload(&self.db).await?;
        }
        Ok(ActionReply::ok())
    }

    pub(super) async fn add_filterrule(&self, form: FilterRuleForm) -> ActionResult {
        let group_id = form
            .group_id
            .ok_or_else(|| ActionError::invalid("group id is required"))?;
        let rule = SaveFilterRule {
            group_id,
            name: form.rule_name.unwrap_or_default(),
            priority: form.rule_pri.unwrap_or_default(),
            include: form.rule_include.unwrap_or_default(),
            exclude: form.rule_exclude.unwrap_or_default(),
            size_limit: form.rule_sizelimit.unwrap_or_default(),
            note: form.rule_free.unwrap_or_default(),
        };
        let id = self.db.filter_rules().save_rule(rule, form.rule_id).await?;
        debug!(id, group_id, "Filter rule saved");
        self.filter.reload(&self.db).await?;
        Ok(ActionReply::ok())
    }

    pub(super) async fn del_filterrule(&self, req: IdRequest) -> ActionResult {
        if let Some(id) = req.id {
            self.db.filter_rules().delete_rule(id).await?;
            self.filter.reload(&self.db).await?;
        }
        Ok(ActionReply::ok())
    }

    pub(super) fn filterrule_detail(&self, req: RuleDetailRequest) -> ActionResult {
        let info = match (req.groupid, req.ruleid) {
            (Some(group), Some(rule)) => self.filter.rule_detail(group, rule),
            _ => None,
        };
        let info = info.map(|rule| {
            json!({
                "id": rule.id,
                "group": rule.group,
                "name": rule.name,
                "pri": rule.pri,
                "include": rule.include.join("\n"),
                "exclude": rule.exclude.join("\n"),
                "size": rule.size,
                "free": rule.free,
            })
        });
        Ok(ActionReply::ok().field("info", info))
    }

    pub(super) async fn share_filtergroup(&self, req: IdRequest) -> ActionResult {
        let repo = self.db.filter_rules();
        let group = match req.id {
            Some(id) => repo.get_group(id).await?,
            None => None,
        };
        let group = group.ok_or_else(|| ActionError::failed("group not found"))?;
        let rules = repo.list_rules(Some(group.id)).await?;
        if rules.is_empty() {
            return Err(ActionError::failed("group has no rules"));
        }

        let shared = SharedGroup {
            name: Some(group.name),
            rules: rules
                .into_iter()
                .map(|r| SharedRule {
                    name: Some(r.name),
                    pri: Some(r.priority),
                    include: Some(r.include),
                    exclude: Some(r.exclude),
                    size: Some(r.size_limit),
                    free: Some(r.note),
                })
                .collect(),
        };
        let encoded = BASE64.encode(serde_json::to_string(&shared)?);
        Ok(ActionReply::ok().field("string", encoded))
    }

    pub(super) async fn import_filtergroup(&self, req: ImportGroupRequest) -> ActionResult {
        let decoded = BASE64
            .decode(req.content.trim())
            .map_err(|e| ActionError::failed(format!("invalid data format, {}", e)))?;
        let shared: SharedGroup = serde_json::from_slice(&decoded)
            .map_err(|e| ActionError::failed(format!("invalid data format, {}", e)))?;
        let name = shared
            .name
            .ok_or_else(|| ActionError::failed("invalid data format"))?;

        let repo = self.db.filter_rules();
        let group_id = repo.add_group(&name, false).await?;
        let count = shared.rules.len();
        for rule in shared.rules {
            repo.save_rule(rule.into_save(group_id), None).await?;
        }
        info!(group_id, name = %name, rules = count, "Filter group imported");
        self.filter.reload(&self.db).await?;
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) fn rule_test(&self, req: RuleTestRequest) -> ActionResult {
        let title = req.title.ok_or_else(|| ActionError::invalid("title is required"))?;
        let size_gb: f64 = req
            .size
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0);
        let candidate = FilterCandidate {
            title,
            subtitle: req.subtitle.unwrap_or_default(),
            size_bytes: (size_gb * 1024f64.powi(3)).max(0.0) as u64,
            promotion: None,
        };
        let result = self.filter.check(&candidate, req.rulegroup);
        let order = if result.order != 0 { 100 - result.order } else { 0 };
        Ok(ActionReply::ok()
            .field("flag", result.matched)
            .field("text", if result.matched { "matched" } else { "not matched" })
            .field("order", order))
    }

    pub(super) fn get_filterrules(&self) -> ActionResult {
        let init_rules: Vec<Value> = builtin_rule_groups()
            .iter()
            .map(|g| {
                json!({
                    "id": g.id,
                    "name": g.name,
                    "rules": g.rules.iter().map(|r| json!({
                        "name": r.name,
                        "include": r.include.join("\n"),
                        "exclude": r.exclude.join("\n"),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(ActionReply::ok()
            .field("ruleGroups", self.filter.rule_infos())
            .field("initRules", init_rules))
    }
}
