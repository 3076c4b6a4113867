use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use rulevet_core::{Rule, RuleKey, RuleStage, VettedRule, MIN_PATTERN_LEN};
use rulevet_engine::categorize_targets_entity;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vetted store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vetted store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vetted store schema version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("match pattern {pattern:?} is shorter than {min} characters")]
    PatternTooShort { pattern: String, min: usize },

    #[error("consolidation group {0:?} has no rules to merge")]
    EmptyGroup(String),
}

#[derive(Serialize)]
struct StoreFileOut<'a> {
    version: u32,
    rules: &'a BTreeMap<RuleKey, VettedRule>,
    tags: &'a BTreeMap<String, Option<String>>,
}

#[derive(Deserialize)]
struct StoreFileIn {
    version: u32,
    #[serde(default)]
    rules: BTreeMap<RuleKey, VettedRule>,
    // Older store files predate tag decisions; absent means empty.
    #[serde(default)]
    tags: BTreeMap<String, Option<String>>,
}

/// Durable, content-addressed store of locally approved rules and tag
/// decisions — the single source of truth for what the user has already
/// decided. Every mutation is write-through: if the file write fails, the
/// in-memory state is rolled back and the error returned, so memory and
/// disk never silently diverge.
pub struct VettedRuleStore {
    path: PathBuf,
    rules: BTreeMap<RuleKey, VettedRule>,
    tags: BTreeMap<String, Option<String>>,
    /// Keys touched since this store instance was constructed. Deliberately
    /// an instance field, not process-global state: two stores in one
    /// process never share a session.
    session_touched: HashSet<RuleKey>,
}

impl VettedRuleStore {
    /// Open the store at `path`, creating an empty one if the file does not
    /// exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (rules, tags) = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: StoreFileIn = serde_json::from_str(&content)?;
            if file.version != STORE_VERSION {
                return Err(StoreError::UnsupportedVersion(file.version));
            }
            (file.rules, file.tags)
        } else {
            (BTreeMap::new(), BTreeMap::new())
        };
        debug!(path = %path.display(), rules = rules.len(), "opened vetted store");
        Ok(VettedRuleStore {
            path,
            rules,
            tags,
            session_touched: HashSet::new(),
        })
    }

    /// Write the current state to disk atomically (temp file + rename), so
    /// an interrupted write can never leave a half-written store behind.
    fn persist(&self) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(
            &mut tmp,
            &StoreFileOut {
                version: STORE_VERSION,
                rules: &self.rules,
                tags: &self.tags,
            },
        )?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn check_pattern(rule: &VettedRule) -> Result<(), StoreError> {
        if rule.stage == RuleStage::Pre
            && rule.match_value.trim().chars().count() < MIN_PATTERN_LEN
        {
            return Err(StoreError::PatternTooShort {
                pattern: rule.match_value.clone(),
                min: MIN_PATTERN_LEN,
            });
        }
        Ok(())
    }

    /// Insert or overwrite by content key and persist immediately. A
    /// re-approval of the same decision is a no-op apart from refreshing
    /// `vetted_at`.
    pub fn approve(&mut self, rule: VettedRule) -> Result<(), StoreError> {
        Self::check_pattern(&rule)?;
        let key = rule.key.clone();
        let prev = self.rules.insert(key.clone(), rule);
        if let Err(e) = self.persist() {
            match prev {
                Some(p) => self.rules.insert(key, p),
                None => self.rules.remove(&key),
            };
            return Err(e);
        }
        self.session_touched.insert(key);
        Ok(())
    }

    /// Delete the entry and persist immediately. Removing a key that is not
    /// present is a no-op.
    pub fn remove(&mut self, key: &RuleKey) -> Result<(), StoreError> {
        let Some(prev) = self.rules.remove(key) else {
            self.session_touched.remove(key);
            return Ok(());
        };
        if let Err(e) = self.persist() {
            self.rules.insert(key.clone(), prev);
            return Err(e);
        }
        self.session_touched.remove(key);
        Ok(())
    }

    /// Remove a batch of rules and approve one replacement as a single
    /// durable step. Used by consolidation so a merge can never be observed
    /// half-applied through this store.
    pub fn replace_rules(
        &mut self,
        remove: &[RuleKey],
        add: VettedRule,
    ) -> Result<(), StoreError> {
        Self::check_pattern(&add)?;
        let snapshot = self.rules.clone();
        for key in remove {
            self.rules.remove(key);
        }
        let added_key = add.key.clone();
        self.rules.insert(added_key.clone(), add);
        if let Err(e) = self.persist() {
            self.rules = snapshot;
            return Err(e);
        }
        for key in remove {
            self.session_touched.remove(key);
        }
        self.session_touched.insert(added_key);
        Ok(())
    }

    pub fn is_vetted(&self, key: &RuleKey) -> bool {
        self.rules.contains_key(key)
    }

    /// First pre-stage rule whose match pattern occurs in `raw`,
    /// case-insensitively. A linear scan by design: the raw string is not
    /// the key, the pattern is a substring of it.
    pub fn find_by_raw_payee(&self, raw: &str) -> Option<&VettedRule> {
        let raw_lower = raw.to_lowercase();
        self.rules
            .values()
            .filter(|r| r.stage == RuleStage::Pre)
            .find(|r| raw_lower.contains(&r.match_value.to_lowercase()))
    }

    /// Categorize-stage rule whose match value equals `name`,
    /// case-insensitively.
    pub fn find_by_clean_name(&self, name: &str) -> Option<&VettedRule> {
        self.rules
            .values()
            .filter(|r| r.stage == RuleStage::Categorize)
            .find(|r| r.match_value.eq_ignore_ascii_case(name))
    }

    /// Record a tag decision for a clean name. `None` is an explicit "no
    /// tag" answer, distinct from never having been asked.
    pub fn set_tag(&mut self, name: &str, tag: Option<String>) -> Result<(), StoreError> {
        let prev = self.tags.insert(name.to_string(), tag);
        if let Err(e) = self.persist() {
            match prev {
                Some(p) => self.tags.insert(name.to_string(), p),
                None => self.tags.remove(name),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Outer `None` = never decided; inner `None` = explicitly "no tag".
    pub fn get_tag(&self, name: &str) -> Option<Option<&str>> {
        self.tags.get(name).map(|t| t.as_deref())
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn remove_tag(&mut self, name: &str) -> Result<(), StoreError> {
        let Some(prev) = self.tags.remove(name) else {
            return Ok(());
        };
        if let Err(e) = self.persist() {
            self.tags.insert(name.to_string(), prev);
            return Err(e);
        }
        Ok(())
    }

    /// Entries touched since this store was constructed, for end-of-session
    /// review.
    pub fn session_rules(&self) -> Vec<&VettedRule> {
        self.rules
            .values()
            .filter(|r| self.session_touched.contains(&r.key))
            .collect()
    }

    /// The full durable set, in key order.
    pub fn all_rules(&self) -> impl Iterator<Item = &VettedRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Drop local entries that have graduated into the external rule set.
    ///
    /// A local pre rule is redundant once an external pre rule encodes the
    /// identical `(op, field, value) → entity` mapping, where the entity
    /// resolves to the same clean name this rule targets. Its companion
    /// categorize rule goes too when an external categorize rule targets
    /// that entity, and the stored tag when that external rule also carries
    /// a notes action. An entity id that cannot be resolved keeps the local
    /// entry: erring toward re-asking beats losing a human decision.
    ///
    /// Run once at session start, before any new classification work.
    /// Returns the removed rule keys.
    pub fn reconcile_against_external(
        &mut self,
        external: &[Rule],
        id_to_name: &HashMap<String, String>,
    ) -> Result<Vec<RuleKey>, StoreError> {
        let mut remove_keys: Vec<RuleKey> = Vec::new();
        let mut remove_tags: Vec<String> = Vec::new();

        for local in self.rules.values().filter(|r| r.stage == RuleStage::Pre) {
            let Some(ext) = external.iter().filter(|r| r.stage == RuleStage::Pre).find(|r| {
                r.conditions.first().is_some_and(|c| {
                    c.op == local.match_op
                        && c.field == local.match_field
                        && c.value.eq_ignore_ascii_case(&local.match_value)
                })
            }) else {
                continue;
            };
            let Some(entity_id) = ext
                .actions
                .iter()
                .find(|a| a.field == "payee" && !a.value.is_empty())
                .map(|a| a.value.as_str())
            else {
                continue;
            };
            let Some(name) = id_to_name.get(entity_id) else {
                continue;
            };
            if !name.eq_ignore_ascii_case(&local.action_value) {
                continue;
            }
            remove_keys.push(local.key.clone());

            let ext_categorize = external
                .iter()
                .filter(|r| r.stage == RuleStage::Categorize)
                .find(|r| categorize_targets_entity(r, entity_id, Some(name)));
            if let Some(ext_cat) = ext_categorize {
                if let Some(local_cat) = self.find_by_clean_name(name) {
                    remove_keys.push(local_cat.key.clone());
                }
                let has_notes_action = ext_cat.actions.iter().any(|a| a.field == "notes");
                if has_notes_action && self.tags.contains_key(name) {
                    remove_tags.push(name.clone());
                }
            }
        }

        if remove_keys.is_empty() && remove_tags.is_empty() {
            return Ok(Vec::new());
        }

        let rules_snapshot = self.rules.clone();
        let tags_snapshot = self.tags.clone();
        for key in &remove_keys {
            self.rules.remove(key);
        }
        for name in &remove_tags {
            self.tags.remove(name);
        }
        if let Err(e) = self.persist() {
            self.rules = rules_snapshot;
            self.tags = tags_snapshot;
            return Err(e);
        }
        for key in &remove_keys {
            self.session_touched.remove(key);
        }
        info!(
            rules = remove_keys.len(),
            tags = remove_tags.len(),
            "removed vetted entries already covered by external rules"
        );
        Ok(remove_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulevet_core::{Action, Combinator, Condition, ConditionField, ConditionOp, ValueKind};
    use tempfile::tempdir;

    fn pre_rule(pattern: &str, clean: &str) -> VettedRule {
        VettedRule::new(
            RuleStage::Pre,
            ConditionField::RawPayee,
            ConditionOp::Contains,
            pattern,
            "payee",
            clean,
        )
    }

    fn categorize_rule(clean: &str, category: &str) -> VettedRule {
        VettedRule::new(
            RuleStage::Categorize,
            ConditionField::CleanPayee,
            ConditionOp::Is,
            clean,
            "category",
            category,
        )
    }

    fn external_pre(pattern: &str, entity_id: &str) -> Rule {
        Rule {
            external_id: Some(format!("ext-{entity_id}")),
            stage: RuleStage::Pre,
            combinator: Combinator::And,
            conditions: vec![Condition {
                op: ConditionOp::Contains,
                field: ConditionField::RawPayee,
                value: pattern.to_string(),
                value_kind: ValueKind::Literal,
            }],
            actions: vec![Action {
                field: "payee".to_string(),
                value: entity_id.to_string(),
            }],
        }
    }

    fn external_categorize(entity_id: &str, category: &str, with_notes: Option<&str>) -> Rule {
        let mut actions = vec![Action {
            field: "category".to_string(),
            value: category.to_string(),
        }];
        if let Some(notes) = with_notes {
            actions.push(Action {
                field: "notes".to_string(),
                value: notes.to_string(),
            });
        }
        Rule {
            external_id: None,
            stage: RuleStage::Categorize,
            combinator: Combinator::And,
            conditions: vec![Condition {
                op: ConditionOp::Is,
                field: ConditionField::CleanPayee,
                value: entity_id.to_string(),
                value_kind: ValueKind::ExternalId,
            }],
            actions,
        }
    }

    #[test]
    fn approve_survives_a_fresh_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        let rule = pre_rule("AMAZON MKTPL", "Amazon");
        let key = rule.key.clone();

        let mut store = VettedRuleStore::open(&path).unwrap();
        store.approve(rule).unwrap();

        let reopened = VettedRuleStore::open(&path).unwrap();
        assert!(reopened.is_vetted(&key));
    }

    #[test]
    fn approve_overwrites_by_key() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();
        store.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn approve_rejects_short_pre_pattern() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        let err = store.approve(pre_rule("GAS", "Gas Station")).unwrap_err();
        assert!(matches!(err, StoreError::PatternTooShort { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        let rule = pre_rule("AMAZON MKTPL", "Amazon");
        let key = rule.key.clone();

        let mut store = VettedRuleStore::open(&path).unwrap();
        store.approve(rule).unwrap();
        store.remove(&key).unwrap();

        let reopened = VettedRuleStore::open(&path).unwrap();
        assert!(!reopened.is_vetted(&key));
    }

    #[test]
    fn failed_write_rolls_back_memory() {
        let dir = tempdir().unwrap();
        let inner = dir.path().join("gone");
        std::fs::create_dir(&inner).unwrap();
        let mut store = VettedRuleStore::open(inner.join("vetted.json")).unwrap();
        std::fs::remove_dir_all(&inner).unwrap();

        let rule = pre_rule("AMAZON MKTPL", "Amazon");
        let key = rule.key.clone();
        assert!(store.approve(rule).is_err());
        // The approve failed, so the store must not claim the rule exists.
        assert!(!store.is_vetted(&key));
        assert!(store.session_rules().is_empty());
    }

    #[test]
    fn find_by_raw_payee_is_substring_case_insensitive() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(pre_rule("amazon mktpl", "Amazon")).unwrap();
        let hit = store.find_by_raw_payee("AMAZON MKTPL*0C2091XO3").unwrap();
        assert_eq!(hit.action_value, "Amazon");
        assert!(store.find_by_raw_payee("COSTCO WHSE").is_none());
    }

    #[test]
    fn find_by_clean_name_is_exact_case_insensitive() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(categorize_rule("Amazon", "Shopping")).unwrap();
        assert!(store.find_by_clean_name("amazon").is_some());
        assert!(store.find_by_clean_name("Amazon Fresh").is_none());
    }

    #[test]
    fn explicit_no_tag_differs_from_never_asked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        let mut store = VettedRuleStore::open(&path).unwrap();
        store.set_tag("Amazon", None).unwrap();
        store.set_tag("Costco", Some("warehouse".to_string())).unwrap();

        let reopened = VettedRuleStore::open(&path).unwrap();
        assert!(reopened.has_tag("Amazon"));
        assert_eq!(reopened.get_tag("Amazon"), Some(None));
        assert_eq!(reopened.get_tag("Costco"), Some(Some("warehouse")));
        assert!(!reopened.has_tag("Starbucks"));
        assert_eq!(reopened.get_tag("Starbucks"), None);
    }

    #[test]
    fn remove_tag_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        let mut store = VettedRuleStore::open(&path).unwrap();
        store.set_tag("Amazon", Some("online".to_string())).unwrap();
        store.remove_tag("Amazon").unwrap();
        assert!(!VettedRuleStore::open(&path).unwrap().has_tag("Amazon"));
    }

    #[test]
    fn loads_legacy_file_without_tags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        std::fs::write(&path, r#"{"version": 1, "rules": {}}"#).unwrap();
        let store = VettedRuleStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert!(!store.has_tag("anything"));
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        std::fs::write(&path, r#"{"version": 2, "rules": {}, "tags": {}}"#).unwrap();
        assert!(matches!(
            VettedRuleStore::open(&path),
            Err(StoreError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn session_rules_track_only_this_instance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        {
            let mut earlier = VettedRuleStore::open(&path).unwrap();
            earlier.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();
        }
        let mut store = VettedRuleStore::open(&path).unwrap();
        store.approve(pre_rule("COSTCO WHSE", "Costco")).unwrap();

        assert_eq!(store.all_rules().count(), 2);
        let session = store.session_rules();
        assert_eq!(session.len(), 1);
        assert_eq!(session[0].action_value, "Costco");
    }

    #[test]
    fn reconcile_removes_only_structurally_identical_rules() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();
        store.approve(pre_rule("COSTCO WHSE", "Costco")).unwrap();

        let external = vec![external_pre("AMAZON MKTPL", "p1")];
        let names = HashMap::from([("p1".to_string(), "Amazon".to_string())]);
        let removed = store.reconcile_against_external(&external, &names).unwrap();

        assert_eq!(removed.len(), 1);
        assert!(store.find_by_raw_payee("AMAZON MKTPL").is_none());
        // No external counterpart: untouched.
        assert!(store.find_by_raw_payee("COSTCO WHSE").is_some());
    }

    #[test]
    fn reconcile_takes_companion_categorize_rule_and_tag() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();
        store.approve(categorize_rule("Amazon", "Shopping")).unwrap();
        store.set_tag("Amazon", Some("online".to_string())).unwrap();

        let external = vec![
            external_pre("AMAZON MKTPL", "p1"),
            external_categorize("p1", "c-shopping", Some("#online")),
        ];
        let names = HashMap::from([("p1".to_string(), "Amazon".to_string())]);
        store.reconcile_against_external(&external, &names).unwrap();

        assert!(store.is_empty());
        assert!(!store.has_tag("Amazon"));
    }

    #[test]
    fn reconcile_keeps_categorize_rule_not_externally_represented() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();
        store.approve(categorize_rule("Amazon", "Shopping")).unwrap();

        let external = vec![external_pre("AMAZON MKTPL", "p1")];
        let names = HashMap::from([("p1".to_string(), "Amazon".to_string())]);
        store.reconcile_against_external(&external, &names).unwrap();

        assert!(store.find_by_raw_payee("AMAZON MKTPL").is_none());
        assert!(store.find_by_clean_name("Amazon").is_some());
    }

    #[test]
    fn reconcile_keeps_rule_when_entity_unresolvable() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();

        let external = vec![external_pre("AMAZON MKTPL", "p1")];
        let removed = store
            .reconcile_against_external(&external, &HashMap::new())
            .unwrap();

        assert!(removed.is_empty());
        assert!(store.find_by_raw_payee("AMAZON MKTPL").is_some());
    }

    #[test]
    fn reconcile_keeps_rule_when_target_name_differs() {
        let dir = tempdir().unwrap();
        let mut store = VettedRuleStore::open(dir.path().join("vetted.json")).unwrap();
        store.approve(pre_rule("AMAZON MKTPL", "Amazon")).unwrap();

        // Same pattern, but the external rule resolves to a different entity.
        let external = vec![external_pre("AMAZON MKTPL", "p2")];
        let names = HashMap::from([("p2".to_string(), "Amazon Fresh".to_string())]);
        let removed = store.reconcile_against_external(&external, &names).unwrap();

        assert!(removed.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replace_rules_is_one_durable_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vetted.json");
        let mut store = VettedRuleStore::open(&path).unwrap();
        let a = pre_rule("CAPITAL ONE CRCARDPMT AB", "Capital One");
        let b = pre_rule("CAPITAL ONE MOBILE PMT", "Capital One");
        let (key_a, key_b) = (a.key.clone(), b.key.clone());
        store.approve(a).unwrap();
        store.approve(b).unwrap();

        let merged = pre_rule("CAPITAL ONE", "Capital One");
        let merged_key = merged.key.clone();
        store
            .replace_rules(&[key_a.clone(), key_b.clone()], merged)
            .unwrap();

        let reopened = VettedRuleStore::open(&path).unwrap();
        assert!(!reopened.is_vetted(&key_a));
        assert!(!reopened.is_vetted(&key_b));
        assert!(reopened.is_vetted(&merged_key));
        assert_eq!(reopened.all_rules().count(), 1);
    }
}
