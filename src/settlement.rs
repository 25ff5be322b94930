//! The settlement engine: pure functions that turn an activity's bills (and,
//! in prepaid mode, its recharges) into a per-member paid/should-pay/balance
//! ledger. No I/O, no ambient state; callers fetch current records and pass
//! everything in.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::constants::SPLIT_SCALE;
use crate::models::{Activity, Bill, Member, Recharge};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("at least one participant must have a weight greater than zero")]
    NoPositiveWeight,
}

/// One member's position, derived from source records on every read.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub member: String,
    pub paid: f64,
    pub should_pay: f64,
    /// `paid - should_pay`; positive means the member is owed money.
    pub balance: f64,
}

/// Per-member ledger in roster order. Roster order is what makes the
/// suggestion tie-break deterministic.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Ledger {
    pub entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn get(&self, member: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.member == member)
    }

    pub fn balance_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.balance).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementMode {
    Direct,
    Prepaid { keeper: String },
}

impl SettlementMode {
    pub fn for_activity(activity: &Activity) -> Self {
        match (&activity.keeper, activity.is_prepaid) {
            (Some(keeper), true) => SettlementMode::Prepaid {
                keeper: keeper.clone(),
            },
            _ => SettlementMode::Direct,
        }
    }
}

/// Rounds to the fixed two-decimal storage precision.
pub fn round_share(value: f64) -> f64 {
    (value * SPLIT_SCALE).round() / SPLIT_SCALE
}

// Malformed records coerce to zero instead of failing the whole ledger, but
// they indicate corruption upstream, so they are logged.
fn coerce_amount(value: f64, context: &'static str) -> f64 {
    if value.is_finite() {
        value
    } else {
        tracing::warn!(context, ?value, "coercing malformed number to zero");
        0.0
    }
}

fn coerce_weight(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        tracing::warn!(?value, "coercing malformed participant weight to zero");
        0.0
    }
}

/// Splits `amount` across participants in proportion to their weights.
///
/// Every participant gets an entry: zero-weight members get an explicit 0.0
/// so that re-adding them later sees a defined prior value. Shares are
/// rounded to two decimals and the rounding residual is assigned to the
/// largest share, so the returned values sum to `amount` exactly.
pub fn compute_split(
    amount: f64,
    participants: &BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>, SplitError> {
    let amount = coerce_amount(amount, "bill amount");

    let mut weights: BTreeMap<&str, f64> = BTreeMap::new();
    let mut total_weight = 0.0;
    for (name, weight) in participants {
        let weight = coerce_weight(*weight);
        weights.insert(name.as_str(), weight);
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return Err(SplitError::NoPositiveWeight);
    }

    let mut shares: BTreeMap<String, f64> = BTreeMap::new();
    for (name, weight) in &weights {
        let share = if *weight > 0.0 {
            round_share(amount * weight / total_weight)
        } else {
            0.0
        };
        shares.insert((*name).to_string(), share);
    }

    let assigned: f64 = shares.values().sum();
    let residual = round_share(amount - assigned);
    if residual != 0.0 {
        // Largest positive share absorbs the residual; first in key order on
        // ties so repeated computation stays stable.
        let mut target: Option<(&String, f64)> = None;
        for (name, share) in &shares {
            if *share > 0.0 && target.is_none_or(|(_, best)| *share > best) {
                target = Some((name, *share));
            }
        }
        if let Some((name, share)) = target {
            let name = name.clone();
            shares.insert(name, round_share(share + residual));
        }
    }

    Ok(shares)
}

/// Computes the full ledger for an activity roster.
///
/// Direct mode: a member's `paid` is the sum of bills they paid, their
/// `should_pay` is the sum of their split shares.
///
/// Prepaid mode: the keeper fronts every bill from the pooled fund, so bill
/// amounts count as the keeper's outlay while deposits count as each
/// depositor's outlay. The keeper owes back everything deposited with them
/// plus their own consumption share; every other member owes their shares,
/// same as direct mode. Members absent from the roster are skipped; members
/// with no records get all-zero entries.
pub fn compute_ledger(
    members: &[Member],
    bills: &[Bill],
    recharges: &[Recharge],
    mode: &SettlementMode,
) -> Ledger {
    let mut entries: Vec<LedgerEntry> = members
        .iter()
        .map(|m| LedgerEntry {
            member: m.name.clone(),
            paid: 0.0,
            should_pay: 0.0,
            balance: 0.0,
        })
        .collect();
    let index: BTreeMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();

    for bill in bills {
        let amount = coerce_amount(bill.amount, "bill amount");

        let paid_by = match mode {
            SettlementMode::Direct => bill.payer.as_str(),
            // In prepaid mode the keeper is the one who transacted with the
            // merchant, whatever the record says.
            SettlementMode::Prepaid { keeper } => keeper.as_str(),
        };
        if let Some(&i) = index.get(paid_by) {
            entries[i].paid += amount;
        }

        for (name, share) in &bill.split_detail {
            let Some(&i) = index.get(name.as_str()) else {
                continue;
            };
            let weight = bill.participants.get(name).copied().unwrap_or(0.0);
            if coerce_weight(weight) > 0.0 {
                entries[i].should_pay += coerce_amount(*share, "split share");
            }
        }
    }

    if let SettlementMode::Prepaid { keeper } = mode {
        for recharge in recharges {
            let amount = coerce_amount(recharge.amount, "recharge amount");
            if let Some(&i) = index.get(recharge.payer.as_str()) {
                entries[i].paid += amount;
            }
            if let Some(&i) = index.get(keeper.as_str()) {
                entries[i].should_pay += amount;
            }
        }
    }

    for entry in &mut entries {
        entry.balance = entry.paid - entry.should_pay;
    }

    Ledger { entries }
}

/// The member with the lowest balance should buy next time. Ties go to the
/// earlier roster position; `None` on an empty roster.
pub fn suggest_next_payer(ledger: &Ledger) -> Option<&LedgerEntry> {
    let mut best: Option<&LedgerEntry> = None;
    for entry in &ledger.entries {
        if best.is_none_or(|b| entry.balance < b.balance) {
            best = Some(entry);
        }
    }
    best
}
