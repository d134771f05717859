//! Priority-ordered rule groups for scoring candidate releases
//!
//! A group holds rules ordered by priority. The first rule a candidate
//! satisfies decides the match and its order.

use anyhow::Result;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{Database, FilterGroupRecord, FilterRuleRecord};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A release to check against a group
#[derive(Debug, Clone, Default)]
pub struct FilterCandidate {
    pub title: String,
    pub subtitle: String,
    pub size_bytes: u64,
    /// Free/promotion tag of the release, if known
    pub promotion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterMatch {
    pub matched: bool,
    pub order: i64,
    pub message: String,
}

/// `min,max` in GB. A single value is the maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeLimit {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SizeLimit {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return Self::default();
        }
        let number = |s: &str| s.trim().parse::<f64>().ok().filter(|v| *v > 0.0);
        match value.split_once(',') {
            Some((min, max)) => Self {
                min: number(min),
                max: number(max),
            },
            None => Self {
                min: None,
                max: number(value),
            },
        }
    }

    pub fn contains(&self, size_bytes: u64) -> bool {
        let gb = size_bytes as f64 / GB;
        self.min.is_none_or(|min| gb >= min) && self.max.is_none_or(|max| gb <= max)
    }
}

/// Split a stored pattern list on newlines, dropping blanks
pub fn split_patterns(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleInfo {
    pub id: i64,
    pub group: i64,
    pub name: String,
    pub pri: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub size: String,
    pub free: String,
}

impl From<&FilterRuleRecord> for RuleInfo {
    fn from(rule: &FilterRuleRecord) -> Self {
        Self {
            id: rule.id,
            group: rule.group_id.parse().unwrap_or_default(),
            name: rule.name.clone(),
            pri: rule.priority.clone(),
            include: split_patterns(&rule.include),
            exclude: split_patterns(&rule.exclude),
            size: rule.size_limit.clone(),
            free: rule.note.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    pub id: i64,
    pub name: String,
    pub default: String,
    pub rules: Vec<RuleInfo>,
}

struct CompiledRule {
    info: RuleInfo,
    priority: i64,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    size: SizeLimit,
}

impl CompiledRule {
    fn new(record: &FilterRuleRecord) -> Self {
        let info = RuleInfo::from(record);
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(rule_id = record.id, pattern = %p, error = %e, "Ignoring invalid filter pattern");
                        None
                    }
                })
                .collect()
        };
        Self {
            priority: record.priority.trim().parse().unwrap_or_default(),
            include: compile(&info.include),
            exclude: compile(&info.exclude),
            size: SizeLimit::parse(&record.size_limit),
            info,
        }
    }

    fn matches(&self, candidate: &FilterCandidate) -> bool {
        let text = format!("{} {}", candidate.title, candidate.subtitle);
        if !self.include.iter().all(|re| re.is_match(&text)) {
            return false;
        }
        if self.exclude.iter().any(|re| re.is_match(&text)) {
            return false;
        }
        if candidate.size_bytes > 0 && !self.size.contains(candidate.size_bytes) {
            return false;
        }
        match (candidate.promotion.as_deref(), self.info.free.trim()) {
            (Some(promo), free) if !promo.is_empty() && !free.is_empty() => promo.eq_ignore_ascii_case(free),
            _ => true,
        }
    }
}

struct CompiledGroup {
    record: FilterGroupRecord,
    rules: Vec<CompiledRule>,
}

/// Cached filter groups
#[derive(Default)]
pub struct RuleFilter {
    groups: RwLock<Vec<CompiledGroup>>,
}

impl RuleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: Vec<(FilterGroupRecord, Vec<FilterRuleRecord>)>) -> Self {
        let filter = Self::new();
        filter.set_groups(groups);
        filter
    }

    fn set_groups(&self, groups: Vec<(FilterGroupRecord, Vec<FilterRuleRecord>)>) {
        let compiled = groups
            .into_iter()
            .map(|(record, rules)| {
                let mut rules: Vec<CompiledRule> = rules.iter().map(CompiledRule::new).collect();
                rules.sort_by_key(|r| r.priority);
                CompiledGroup { record, rules }
            })
            .collect();
        *self.groups.write() = compiled;
    }

    /// Reload every group and rule from the database
    pub async fn reload(&self, db: &Database) -> Result<()> {
        let repo = db.filter_rules();
        let groups = repo.list_groups().await?;
        let rules = repo.list_rules(None).await?;
        let mut grouped = Vec::with_capacity(groups.len());
        for group in groups {
            let id = group.id.to_string();
            let members = rules.iter().filter(|r| r.group_id == id).cloned().collect();
            grouped.push((group, members));
        }
        debug!(groups = grouped.len(), rules = rules.len(), "Filter rules loaded");
        self.set_groups(grouped);
        Ok(())
    }

    /// Check a candidate against `group`, or the default group
    pub fn check(&self, candidate: &FilterCandidate, group: Option<i64>) -> FilterMatch {
        let groups = self.groups.read();
        let selected = match group {
            Some(id) => groups.iter().find(|g| g.record.id == id),
            None => groups.iter().find(|g| g.record.is_default),
        };
        let Some(selected) = selected else {
            return FilterMatch {
                matched: true,
                order: 0,
                message: String::new(),
            };
        };

        match selected.rules.iter().find(|r| r.matches(candidate)) {
            Some(rule) => FilterMatch {
                matched: true,
                order: rule.priority,
                message: rule.info.name.clone(),
            },
            None => FilterMatch {
                matched: false,
                order: 0,
                message: format!("no rule in {} matched", selected.record.name),
            },
        }
    }

    pub fn rule_detail(&self, group: i64, rule: i64) -> Option<RuleInfo> {
        self.groups
            .read()
            .iter()
            .find(|g| g.record.id == group)?
            .rules
            .iter()
            .find(|r| r.info.id == rule)
            .map(|r| r.info.clone())
    }

    /// All groups with their rules in priority order
    pub fn rule_infos(&self) -> Vec<GroupInfo> {
        self.groups
            .read()
            .iter()
            .map(|g| GroupInfo {
                id: g.record.id,
                name: g.record.name.clone(),
                default: if g.record.is_default { "Y" } else { "N" }.to_string(),
                rules: g.rules.iter().map(|r| r.info.clone()).collect(),
            })
            .collect()
    }
}

/// A rule of a built-in group
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinRule {
    pub name: &'static str,
    pub pri: &'static str,
    pub include: &'static [&'static str],
    pub exclude: &'static [&'static str],
    pub size: &'static str,
    pub free: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuiltinGroup {
    pub id: i64,
    pub name: &'static str,
    pub rules: &'static [BuiltinRule],
}

static BUILTIN_GROUPS: &[BuiltinGroup] = &[
    BuiltinGroup {
        id: 1,
        name: "Everyday",
        rules: &[
            BuiltinRule {
                name: "1080p BluRay",
                pri: "1",
                include: &[r"1080[pi]", r"blu-?ray|remux"],
                exclude: &[r"\b(cam|ts|tc|hdtc)\b", r"[Hh][Ee][Vv][Cc]"],
                size: "2,40",
                free: "",
            },
            BuiltinRule {
                name: "1080p WEB",
                pri: "2",
                include: &[r"1080[pi]", r"web-?(dl|rip)"],
                exclude: &[r"\b(cam|ts|tc|hdtc)\b"],
                size: "1,20",
                free: "",
            },
            BuiltinRule {
                name: "720p",
                pri: "3",
                include: &[r"720p"],
                exclude: &[r"\b(cam|ts|tc|hdtc)\b"],
                size: "0,10",
                free: "",
            },
        ],
    },
    BuiltinGroup {
        id: 2,
        name: "4K",
        rules: &[
            BuiltinRule {
                name: "2160p REMUX",
                pri: "1",
                include: &[r"2160p|4k|uhd", r"remux"],
                exclude: &[],
                size: "20,120",
                free: "",
            },
            BuiltinRule {
                name: "2160p",
                pri: "2",
                include: &[r"2160p|4k|uhd"],
                exclude: &[r"\b(cam|ts|tc|hdtc)\b"],
                size: "5,80",
                free: "",
            },
        ],
    },
    BuiltinGroup {
        id: 3,
        name: "Free only",
        rules: &[BuiltinRule {
            name: "Free",
            pri: "1",
            include: &[],
            exclude: &[],
            size: "",
            free: "FREE",
        }],
    },
];

/// Rule groups that ship with the service
pub fn builtin_rule_groups() -> &'static [BuiltinGroup] {
    BUILTIN_GROUPS
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn group(id: i64, default: bool) -> FilterGroupRecord {
        FilterGroupRecord {
            id,
            name: format!("group{}", id),
            is_default: default,
            note: String::new(),
        }
    }

    fn rule(id: i64, group: i64, pri: &str, include: &str, exclude: &str, size: &str) -> FilterRuleRecord {
        FilterRuleRecord {
            id,
            group_id: group.to_string(),
            name: format!("rule{}", id),
            priority: pri.to_string(),
            include: include.to_string(),
            exclude: exclude.to_string(),
            size_limit: size.to_string(),
            note: String::new(),
        }
    }

    fn candidate(title: &str, gb: f64) -> FilterCandidate {
        FilterCandidate {
            title: title.to_string(),
            size_bytes: (gb * GB) as u64,
            ..Default::default()
        }
    }

    #[test]
    fn test_lowest_priority_rule_wins() {
        let filter = RuleFilter::with_groups(vec![(
            group(1, true),
            vec![rule(1, 1, "10", "1080p", "", ""), rule(2, 1, "2", "1080p\nbluray", "", "")],
        )]);
        let result = filter.check(&candidate("Film.2020.1080p.BluRay.x264", 0.0), None);
        assert_eq!(result.order, 2);
        assert!(result.matched);

        let result = filter.check(&candidate("Film.2020.1080p.WEB-DL", 0.0), None);
        assert_eq!(result.order, 10);
    }

    #[test]
    fn test_exclude_and_size_limit() {
        let filter = RuleFilter::with_groups(vec![(
            group(1, false),
            vec![rule(1, 1, "1", "1080p", "HDTC", "1,10")],
        )]);
        assert!(!filter.check(&candidate("Film 1080p hdtc", 2.0), Some(1)).matched);
        assert!(!filter.check(&candidate("Film 1080p", 12.0), Some(1)).matched);
        assert!(filter.check(&candidate("Film 1080p", 4.0), Some(1)).matched);
        assert!(filter.check(&candidate("Film 1080p", 0.0), Some(1)).matched);
    }

    #[test]
    fn test_missing_group_matches_with_zero_order() {
        let filter = RuleFilter::new();
        let result = filter.check(&candidate("anything", 1.0), None);
        assert_eq!(
            result,
            FilterMatch {
                matched: true,
                order: 0,
                message: String::new()
            }
        );
    }

    #[test]
    fn test_promotion_checked_only_when_known() {
        let mut free = rule(1, 1, "1", "", "", "");
        free.note = "FREE".to_string();
        let filter = RuleFilter::with_groups(vec![(group(1, true), vec![free])]);

        let mut c = candidate("Film", 1.0);
        assert!(filter.check(&c, None).matched);
        c.promotion = Some("free".to_string());
        assert!(filter.check(&c, None).matched);
        c.promotion = Some("2XFREE".to_string());
        assert!(!filter.check(&c, None).matched);
    }

    #[test]
    fn test_size_limit_parse() {
        assert_eq!(SizeLimit::parse("1,10"), SizeLimit { min: Some(1.0), max: Some(10.0) });
        assert_eq!(SizeLimit::parse("8"), SizeLimit { min: None, max: Some(8.0) });
        assert_eq!(SizeLimit::parse("0,5"), SizeLimit { min: None, max: Some(5.0) });
        assert_eq!(SizeLimit::parse(""), SizeLimit::default());
    }

    #[tokio::test]
    async fn test_reload_from_database() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.filter_rules();
        let gid = repo.add_group("Main", true).await.unwrap();
        repo.save_rule(
            crate::db::SaveFilterRule {
                group_id: gid,
                name: "hd".to_string(),
                priority: "5".to_string(),
                include: "720p\n1080p".to_string(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

        let filter = RuleFilter::new();
        filter.reload(&db).await.unwrap();
        let infos = filter.rule_infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].default, "Y");
        assert_eq!(infos[0].rules[0].include, vec!["720p", "1080p"]);
        let rule_id = infos[0].rules[0].id;
        assert_eq!(filter.rule_detail(gid, rule_id).unwrap().name, "hd");
    }

    #[test]
    fn test_builtin_groups_have_unique_ids() {
        let ids: Vec<i64> = builtin_rule_groups().iter().map(|g| g.id).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
    }
}
