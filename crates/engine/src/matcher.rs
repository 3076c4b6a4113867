use regex::RegexBuilder;
use thiserror::Error;

use rulevet_core::{Combinator, Condition, ConditionField, ConditionOp, RawTransaction, Rule, RuleStage};

#[derive(Debug, Error)]
pub enum MatchError {
    /// A `matches` condition carried an uncompilable pattern. Broken rules
    /// are rejected loudly; treating them as non-matching would silently
    /// misclassify transactions as uncovered.
    #[error("invalid regex {pattern:?} in rule condition: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// What a rule is evaluated against: a full transaction, or a bare string
/// standing in for one field. Fields a subject does not carry simply never
/// match; that is not an error.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    raw_payee: Option<&'a str>,
    clean_payee: Option<&'a str>,
    notes: Option<&'a str>,
    amount: Option<&'a str>,
}

impl<'a> Subject<'a> {
    pub fn transaction(tx: &'a RawTransaction, amount_text: &'a str) -> Self {
        Subject {
            raw_payee: Some(&tx.raw_payee),
            clean_payee: None,
            notes: tx.notes.as_deref(),
            amount: Some(amount_text),
        }
    }

    pub fn raw_payee(raw: &'a str) -> Self {
        Subject {
            raw_payee: Some(raw),
            clean_payee: None,
            notes: None,
            amount: None,
        }
    }

    pub fn clean_name(name: &'a str) -> Self {
        Subject {
            raw_payee: None,
            clean_payee: Some(name),
            notes: None,
            amount: None,
        }
    }

    fn field_text(&self, field: ConditionField) -> Option<&'a str> {
        match field {
            ConditionField::RawPayee => self.raw_payee,
            ConditionField::CleanPayee => self.clean_payee,
            ConditionField::Notes => self.notes,
            ConditionField::Amount => self.amount,
        }
    }
}

/// String comparison per operator, case-insensitive. `Matches` compiles the
/// condition value as a case-insensitive regex against the untransformed
/// subject text.
pub fn condition_matches(cond: &Condition, subject: Subject<'_>) -> Result<bool, MatchError> {
    let Some(text) = subject.field_text(cond.field) else {
        return Ok(false);
    };
    match cond.op {
        ConditionOp::Contains => Ok(text.to_lowercase().contains(&cond.value.to_lowercase())),
        ConditionOp::Is => Ok(text.eq_ignore_ascii_case(&cond.value)),
        ConditionOp::StartsWith => Ok(text
            .to_lowercase()
            .starts_with(&cond.value.to_lowercase())),
        ConditionOp::EndsWith => Ok(text.to_lowercase().ends_with(&cond.value.to_lowercase())),
        ConditionOp::Matches => {
            let re = RegexBuilder::new(&cond.value)
                .case_insensitive(true)
                .build()
                .map_err(|source| MatchError::InvalidPattern {
                    pattern: cond.value.clone(),
                    source,
                })?;
            Ok(re.is_match(text))
        }
    }
}

/// `And` requires every condition true, `Or` at least one. A rule with no
/// conditions matches nothing.
pub fn rule_matches(rule: &Rule, subject: Subject<'_>) -> Result<bool, MatchError> {
    if rule.conditions.is_empty() {
        return Ok(false);
    }
    match rule.combinator {
        Combinator::And => {
            for cond in &rule.conditions {
                if !condition_matches(cond, subject)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Combinator::Or => {
            for cond in &rule.conditions {
                if condition_matches(cond, subject)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// First rule of the requested stage, in input order, that matches the
/// subject. First-match is intentional: the external source's rule order is
/// significant and must be preserved, so callers pass rules as an ordered
/// slice, never a set.
pub fn find_first_match<'a>(
    rules: &'a [Rule],
    subject: Subject<'_>,
    stage: RuleStage,
) -> Result<Option<&'a Rule>, MatchError> {
    for rule in rules.iter().filter(|r| r.stage == stage) {
        if rule_matches(rule, subject)? {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}
