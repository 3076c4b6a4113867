use std::collections::BTreeMap;

use tracing::info;

use rulevet_core::{ConditionField, ConditionOp, RuleKey, RuleStage, VettedRule};

use crate::store::{StoreError, VettedRuleStore};

/// A set of locally approved pre rules that all resolve to the same clean
/// name through different match patterns — typically because each pattern
/// was derived independently from slightly different raw strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationGroup {
    pub target_name: String,
    pub rules: Vec<GroupedRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedRule {
    pub key: RuleKey,
    pub match_value: String,
}

impl ConsolidationGroup {
    pub fn match_patterns(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.match_value.clone()).collect()
    }
}

/// Find clean names covered by more than one pre-stage match pattern.
/// Groups come back in name order; a group of one is nothing to merge and
/// is not reported.
pub fn candidate_groups(store: &VettedRuleStore) -> Vec<ConsolidationGroup> {
    let mut by_name: BTreeMap<String, ConsolidationGroup> = BTreeMap::new();
    for rule in store.all_rules().filter(|r| r.stage == RuleStage::Pre) {
        by_name
            .entry(rule.action_value.to_lowercase())
            .or_insert_with(|| ConsolidationGroup {
                target_name: rule.action_value.clone(),
                rules: Vec::new(),
            })
            .rules
            .push(GroupedRule {
                key: rule.key.clone(),
                match_value: rule.match_value.clone(),
            });
    }
    by_name
        .into_values()
        .filter(|g| g.rules.len() > 1)
        .collect()
}

/// Merge a group into one rule carrying the shared clean name and the
/// accepted replacement pattern (possibly human-edited from the suggested
/// one). Whether the replacement is a genuine substring of the originals is
/// the caller's check; durably, the merge is all-or-nothing — the grouped
/// rules and their replacement change places in a single store write, so a
/// failure leaves the originals intact rather than stranding the clean name
/// with no covering rule.
pub fn apply(
    store: &mut VettedRuleStore,
    group: &ConsolidationGroup,
    replacement: &str,
) -> Result<VettedRule, StoreError> {
    if group.rules.is_empty() {
        return Err(StoreError::EmptyGroup(group.target_name.clone()));
    }
    let merged = VettedRule::new(
        RuleStage::Pre,
        ConditionField::RawPayee,
        ConditionOp::Contains,
        replacement,
        "payee",
        group.target_name.as_str(),
    );
    let keys: Vec<RuleKey> = group.rules.iter().map(|r| r.key.clone()).collect();
    let result = merged.clone();
    store.replace_rules(&keys, merged)?;
    info!(
        target = %group.target_name,
        merged = keys.len(),
        pattern = replacement,
        "consolidated match patterns"
    );
    Ok(result)
}
