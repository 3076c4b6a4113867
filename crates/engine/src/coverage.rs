use std::collections::HashMap;

use rulevet_core::{ConditionField, Rule, RuleStage, ValueKind};

use crate::matcher::{find_first_match, MatchError, Subject};

/// Disjoint partition of a batch of unique raw payees against the external
/// rule set. `covered` payees need no human input at all; `needs_category`
/// payees resolve to a clean entity that no categorize rule targets yet;
/// `uncovered` payees match no pre rule.
#[derive(Debug, Default, PartialEq)]
pub struct CoverageReport {
    pub covered: Vec<String>,
    pub needs_category: Vec<String>,
    pub uncovered: Vec<String>,
}

/// Partition `payees` using the externally-ordered rule list and the
/// caller-supplied entity id → display name resolver.
///
/// The categorize check is two-level by necessity: rules written by this
/// tool carry id-typed conditions, while rules authored in the external UI
/// carry literal display names. Both spellings must be recognized as
/// targeting the same entity. An entity id that cannot be resolved to a name
/// only weakens the check toward `needs_category` — re-asking the human is
/// always safe, silently claiming coverage is not.
pub fn classify_coverage(
    rules: &[Rule],
    payees: &[String],
    id_to_name: &HashMap<String, String>,
) -> Result<CoverageReport, MatchError> {
    let mut report = CoverageReport::default();

    for payee in payees {
        let hit = find_first_match(rules, Subject::raw_payee(payee), RuleStage::Pre)?;
        let Some(pre_rule) = hit else {
            report.uncovered.push(payee.clone());
            continue;
        };
        let Some(entity_id) = entity_target(pre_rule) else {
            report.uncovered.push(payee.clone());
            continue;
        };

        let display_name = id_to_name.get(entity_id).map(String::as_str);
        let categorized = rules
            .iter()
            .filter(|r| r.stage == RuleStage::Categorize)
            .any(|r| categorize_targets_entity(r, entity_id, display_name));

        if categorized {
            report.covered.push(payee.clone());
        } else {
            report.needs_category.push(payee.clone());
        }
    }

    Ok(report)
}

/// The entity id a pre rule resolves matching payees to, if any.
fn entity_target(rule: &Rule) -> Option<&str> {
    rule.actions
        .iter()
        .find(|a| a.field == "payee" && !a.value.is_empty())
        .map(|a| a.value.as_str())
}

/// Whether a categorize rule targets the given entity, either by id-typed
/// condition or by literal condition equal to the resolved display name.
/// Shared with store reconciliation, which must answer the same identity
/// question about graduated rules.
pub fn categorize_targets_entity(rule: &Rule, entity_id: &str, display_name: Option<&str>) -> bool {
    rule.conditions
        .iter()
        .filter(|c| c.field == ConditionField::CleanPayee)
        .any(|c| match c.value_kind {
            ValueKind::ExternalId => c.value == entity_id,
            ValueKind::Literal => {
                display_name.is_some_and(|name| c.value.eq_ignore_ascii_case(name))
            }
        })
}
