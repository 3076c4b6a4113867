use std::collections::{BTreeMap, HashSet};

use rulevet_core::{AccountId, RawTransaction, TxId};

/// Maximum calendar-day gap between the two legs of a transfer. Bank posting
/// dates for the same movement routinely differ by a business week.
pub const TRANSFER_DATE_TOLERANCE_DAYS: i64 = 5;

/// Two transactions in different accounts representing one real-world
/// movement of money. Derived and ephemeral; persistence of the resulting
/// link is the external system's side effect.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPair {
    pub out_tx: RawTransaction,
    pub in_tx: RawTransaction,
    pub out_account: AccountId,
    pub in_account: AccountId,
}

/// Find cross-account pairs of opposite-signed, equal-magnitude transactions
/// within `tolerance_days` of each other.
///
/// Greedy first-found: transfers are rare and date+amount are highly
/// discriminating, so no backtracking is attempted. Marking both ids used as
/// soon as a pair is found is correctness, not optimization — one outgoing
/// transaction must never pair with two incoming candidates of identical
/// amount and date. Accounts are iterated in `BTreeMap` order so the result
/// is deterministic for a given input.
pub fn find_transfer_pairs(
    by_account: &BTreeMap<AccountId, Vec<RawTransaction>>,
    tolerance_days: i64,
) -> Vec<TransferPair> {
    let mut pairs = Vec::new();
    let mut used: HashSet<(AccountId, TxId)> = HashSet::new();
    let accounts: Vec<&AccountId> = by_account.keys().collect();

    for i in 0..accounts.len() {
        for j in (i + 1)..accounts.len() {
            let (acct_a, acct_b) = (accounts[i], accounts[j]);
            for tx_a in &by_account[acct_a] {
                for tx_b in &by_account[acct_b] {
                    if used.contains(&(acct_a.clone(), tx_a.id.clone()))
                        || used.contains(&(acct_b.clone(), tx_b.id.clone()))
                    {
                        continue;
                    }
                    if !is_candidate_pair(tx_a, tx_b, tolerance_days) {
                        continue;
                    }
                    used.insert((acct_a.clone(), tx_a.id.clone()));
                    used.insert((acct_b.clone(), tx_b.id.clone()));

                    // Outflow is always the negative leg, regardless of
                    // which account was iterated first.
                    let (out_tx, out_account, in_tx, in_account) = if tx_a.amount.is_negative() {
                        (tx_a, acct_a, tx_b, acct_b)
                    } else {
                        (tx_b, acct_b, tx_a, acct_a)
                    };
                    pairs.push(TransferPair {
                        out_tx: out_tx.clone(),
                        in_tx: in_tx.clone(),
                        out_account: out_account.clone(),
                        in_account: in_account.clone(),
                    });
                }
            }
        }
    }

    pairs
}

fn is_candidate_pair(a: &RawTransaction, b: &RawTransaction, tolerance_days: i64) -> bool {
    if a.amount.is_zero() || b.amount.is_zero() {
        return false;
    }
    if a.amount != -b.amount {
        return false;
    }
    (a.date - b.date).num_days().abs() <= tolerance_days
}
