use tracing::{debug, info, warn};

use rulevet_core::{ConditionField, ConditionOp, RuleStage, VettedRule};
use rulevet_store::{candidate_groups, ConsolidationGroup, VettedRuleStore};
use rulevet_suggest::{GroupInput, GroupSuggestion, SuggestionSource};

use crate::row::PayeeRow;
use crate::SessionError;

/// Convert decided rows into durable vetted rules at session end.
///
/// Each touched, unskipped row with a clean name becomes a pre rule
/// (pattern → clean name), plus a categorize rule when a category was
/// decided and a tag entry when a tag was decided. Every approve is
/// write-through; the first persistence failure aborts the commit with the
/// store and disk still in agreement.
pub fn commit_rows(
    rows: &[PayeeRow],
    store: &mut VettedRuleStore,
) -> Result<usize, SessionError> {
    let mut committed = 0;
    for row in rows {
        if !row.touched || row.skipped {
            continue;
        }
        let Some(clean) = &row.clean_payee else {
            debug!(pattern = %row.pattern, "row touched but unnamed, nothing to commit");
            continue;
        };
        store.approve(VettedRule::new(
            RuleStage::Pre,
            ConditionField::RawPayee,
            ConditionOp::Contains,
            row.pattern.as_str(),
            "payee",
            clean.as_str(),
        ))?;
        if let Some(category) = &row.category {
            store.approve(VettedRule::new(
                RuleStage::Categorize,
                ConditionField::CleanPayee,
                ConditionOp::Is,
                clean.as_str(),
                "category",
                category.as_str(),
            ))?;
        }
        if let Some(tag) = &row.tag {
            store.set_tag(clean, tag.clone())?;
        }
        committed += 1;
    }
    info!(rows = committed, "committed session decisions");
    Ok(committed)
}

/// A consolidation group paired with the oracle's structurally-valid
/// suggestion, ready for human review. Acceptance (and the substring check
/// against the original patterns) happens in the presentation layer; an
/// accepted proposal is applied with `rulevet_store::consolidate::apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationProposal {
    pub group: ConsolidationGroup,
    pub suggestion: GroupSuggestion,
}

/// Collect consolidation candidates from the store and ask the suggestion
/// oracle for one replacement pattern per group. A suggestion naming a
/// target with no corresponding group is dropped with a warning; a
/// suggestion missing structural fields fails the whole call.
pub async fn consolidation_proposals(
    store: &VettedRuleStore,
    source: &dyn SuggestionSource,
) -> Result<Vec<ConsolidationProposal>, SessionError> {
    let groups = candidate_groups(store);
    if groups.is_empty() {
        return Ok(Vec::new());
    }
    let inputs: Vec<GroupInput> = groups
        .iter()
        .map(|g| GroupInput {
            target_name: g.target_name.clone(),
            match_patterns: g.match_patterns(),
        })
        .collect();
    let suggestions = source.suggest(&inputs).await?;

    let mut proposals = Vec::new();
    for suggestion in suggestions {
        suggestion.validate()?;
        let Some(group) = groups
            .iter()
            .find(|g| g.target_name.eq_ignore_ascii_case(&suggestion.target_name))
        else {
            warn!(target = %suggestion.target_name, "suggestion names an unknown group");
            continue;
        };
        proposals.push(ConsolidationProposal {
            group: group.clone(),
            suggestion,
        });
    }
    Ok(proposals)
}
