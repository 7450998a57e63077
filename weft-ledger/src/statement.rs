use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use weft_core::Party;

use crate::LedgerEntry;

/// Read-only view of a party's ledger over a date range, in replay order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Statement {
    pub party: Party,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Running balance carried in from entries dated before `from`.
    pub opening_balance: Decimal,
    pub entries: Vec<LedgerEntry>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub closing_balance: Decimal,
}

impl Statement {
    /// Build a statement from the party's full committed history, which must
    /// already be ordered by `(transaction_date, id)`.
    pub fn from_history(
        party: Party,
        history: Vec<LedgerEntry>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Self {
        let mut opening_balance = Decimal::ZERO;
        let mut entries = Vec::new();
        for entry in history {
            if from.is_some_and(|from| entry.transaction_date < from) {
                opening_balance = entry.balance;
                continue;
            }
            if to.is_some_and(|to| entry.transaction_date > to) {
                break;
            }
            entries.push(entry);
        }
        let total_debit = entries.iter().map(|entry| entry.debit).sum();
        let total_credit = entries.iter().map(|entry| entry.credit).sum();
        let closing_balance = entries
            .last()
            .map(|entry| entry.balance)
            .unwrap_or(opening_balance);
        Self {
            party,
            from,
            to,
            opening_balance,
            entries,
            total_debit,
            total_credit,
            closing_balance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
