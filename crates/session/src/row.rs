use std::collections::BTreeMap;

use rulevet_engine::Normalizer;
use rulevet_store::VettedRuleStore;

/// One or more raw payees sharing a single match pattern, plus the
/// in-progress human decision for them. Session-scoped and never persisted:
/// rows are built at session start, edited through commands, and converted
/// into vetted rules at session end.
#[derive(Debug, Clone, PartialEq)]
pub struct PayeeRow {
    pub pattern: String,
    pub raw_payees: Vec<String>,
    pub clean_payee: Option<String>,
    pub category: Option<String>,
    /// `None` = undecided, `Some(None)` = explicit "no tag".
    pub tag: Option<Option<String>>,
    /// An existing vetted rule pre-filled this row.
    pub was_vetted: bool,
    /// A human edit landed on this row this session.
    pub touched: bool,
    pub skipped: bool,
}

impl PayeeRow {
    fn empty(pattern: String) -> Self {
        PayeeRow {
            pattern,
            raw_payees: Vec::new(),
            clean_payee: None,
            category: None,
            tag: None,
            was_vetted: false,
            touched: false,
            skipped: false,
        }
    }
}

/// Group unique raw payees into rows keyed by match pattern.
///
/// A payee already recognized by a vetted pre rule adopts that rule's
/// pattern and pre-filled decision; anything else gets a pattern freshly
/// derived by the normalizer. Rows come back in pattern order.
pub fn group_rows(
    raw_payees: &[String],
    store: &VettedRuleStore,
    normalizer: &Normalizer,
) -> Vec<PayeeRow> {
    let mut by_pattern: BTreeMap<String, PayeeRow> = BTreeMap::new();

    for raw in raw_payees {
        let vetted = store.find_by_raw_payee(raw);
        let pattern = match vetted {
            Some(rule) => rule.match_value.clone(),
            None => normalizer.normalize(raw),
        };
        let row = by_pattern
            .entry(pattern.clone())
            .or_insert_with(|| PayeeRow::empty(pattern));
        if let Some(rule) = vetted {
            if !row.was_vetted {
                row.was_vetted = true;
                let clean = rule.action_value.clone();
                row.category = store
                    .find_by_clean_name(&clean)
                    .map(|r| r.action_value.clone());
                row.tag = store
                    .get_tag(&clean)
                    .map(|t| t.map(str::to_string));
                row.clean_payee = Some(clean);
            }
        }
        row.raw_payees.push(raw.clone());
    }

    by_pattern.into_values().collect()
}
