use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use weft_core::{Party, PartyId};

use crate::{EntryId, LedgerEntry};

/// Stored snapshot that disagrees with the replayed running balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMismatch {
    pub entry_id: EntryId,
    pub stored: Decimal,
    pub replayed: Decimal,
}

/// Outcome of replaying a party's committed entries from zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub party_id: PartyId,
    pub entry_count: usize,
    pub current_balance: Decimal,
    pub replayed_balance: Decimal,
    pub mismatches: Vec<SnapshotMismatch>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty() && self.current_balance == self.replayed_balance
    }

    /// Difference between the denormalized balance and the replayed one.
    pub fn drift(&self) -> Decimal {
        self.current_balance - self.replayed_balance
    }
}

/// Replay `entries` (already in `(date, id)` order, voided entries removed)
/// starting from `start`, returning the running balance after each entry.
pub fn running_balances(party: &Party, entries: &[LedgerEntry], start: Decimal) -> Vec<Decimal> {
    let mut balance = start;
    entries
        .iter()
        .map(|entry| {
            balance += entry.signed_delta(party.kind);
            balance
        })
        .collect()
}

/// Compare every stored snapshot against a replay from zero.
pub fn verify(party: &Party, entries: &[LedgerEntry]) -> ReplayReport {
    let replayed = running_balances(party, entries, Decimal::ZERO);
    let mismatches = entries
        .iter()
        .zip(&replayed)
        .filter(|(entry, replayed)| entry.balance != **replayed)
        .map(|(entry, replayed)| SnapshotMismatch {
            entry_id: entry.id,
            stored: entry.balance,
            replayed: *replayed,
        })
        .collect();
    ReplayReport {
        party_id: party.id,
        entry_count: entries.len(),
        current_balance: party.current_balance,
        replayed_balance: replayed.last().copied().unwrap_or(Decimal::ZERO),
        mismatches,
    }
}
