use rulevet_core::{ConditionField, ConditionOp, RuleKey, RuleStage, MIN_PATTERN_LEN};

use crate::row::PayeeRow;
use crate::SessionError;

/// A single human edit to the row set. Commands are applied over the row
/// vector by value and return the new state — nothing mutates shared rows
/// in place, which keeps every edit trivially testable and undoable by
/// dropping the outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum RowCommand {
    Rename { name: String },
    SetCategory { category: String },
    SetTag { tag: Option<String> },
    Skip,
    /// Move one raw payee out of its row into a new row under `new_pattern`.
    Split { raw_payee: String, new_pattern: String },
}

/// The new row state after a command, plus any cleanup obligation it
/// created.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub rows: Vec<PayeeRow>,
    /// Set when a split emptied a previously vetted row: the rule that
    /// covered the emptied pattern is now stale and must be removed from
    /// the store before the session concludes.
    pub stale_rule: Option<RuleKey>,
}

/// A machine-proposed edit, one variant per kind with only the fields that
/// kind needs. Advisory: every variant maps onto ordinary commands (or, for
/// `Flag`, onto nothing but the reviewer's attention).
#[derive(Debug, Clone, PartialEq)]
pub enum Suggestion {
    Split { pattern: String, separate: Vec<String> },
    Rename { name: String },
    Category { category: String },
    Flag { reason: String },
}

impl Suggestion {
    pub fn to_commands(&self) -> Vec<RowCommand> {
        match self {
            Suggestion::Split { pattern, separate } => separate
                .iter()
                .map(|raw| RowCommand::Split {
                    raw_payee: raw.clone(),
                    new_pattern: pattern.clone(),
                })
                .collect(),
            Suggestion::Rename { name } => vec![RowCommand::Rename { name: name.clone() }],
            Suggestion::Category { category } => vec![RowCommand::SetCategory {
                category: category.clone(),
            }],
            Suggestion::Flag { .. } => Vec::new(),
        }
    }
}

/// Apply one command to the row at `index`, returning the new row set.
pub fn apply_command(
    rows: Vec<PayeeRow>,
    index: usize,
    command: RowCommand,
) -> Result<RowOutcome, SessionError> {
    let mut rows = rows;
    if index >= rows.len() {
        return Err(SessionError::RowOutOfRange(index));
    }

    let mut stale_rule = None;
    match command {
        RowCommand::Rename { name } => {
            let row = &mut rows[index];
            row.clean_payee = Some(name);
            row.touched = true;
        }
        RowCommand::SetCategory { category } => {
            let row = &mut rows[index];
            row.category = Some(category);
            row.touched = true;
        }
        RowCommand::SetTag { tag } => {
            let row = &mut rows[index];
            row.tag = Some(tag);
            row.touched = true;
        }
        RowCommand::Skip => {
            rows[index].skipped = true;
        }
        RowCommand::Split {
            raw_payee,
            new_pattern,
        } => {
            if new_pattern.trim().chars().count() < MIN_PATTERN_LEN {
                return Err(SessionError::SplitPatternTooShort {
                    pattern: new_pattern,
                });
            }
            let row = &mut rows[index];
            let Some(pos) = row.raw_payees.iter().position(|p| p == &raw_payee) else {
                return Err(SessionError::PayeeNotInRow {
                    payee: raw_payee,
                    pattern: row.pattern.clone(),
                });
            };
            let moved = row.raw_payees.remove(pos);

            if row.raw_payees.is_empty() {
                // The source row is transiently empty; reconcile it now by
                // dropping it and reporting its covering rule as stale.
                if row.was_vetted {
                    if let Some(clean) = &row.clean_payee {
                        stale_rule = Some(RuleKey::derive(
                            RuleStage::Pre,
                            ConditionField::RawPayee,
                            ConditionOp::Contains,
                            &row.pattern,
                            "payee",
                            clean,
                        ));
                    }
                }
                rows.remove(index);
            }

            rows.push(PayeeRow {
                pattern: new_pattern,
                raw_payees: vec![moved],
                clean_payee: None,
                category: None,
                tag: None,
                was_vetted: false,
                touched: true,
                skipped: false,
            });
        }
    }

    Ok(RowOutcome { rows, stale_rule })
}
