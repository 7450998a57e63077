use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use weft_core::{PartyId, PartyKind};

/// Identifier of a persisted ledger entry. Monotonic per store.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(EntryId)
            .map_err(|err| format!("invalid entry id {s}: {err}"))
    }
}

/// Canonical ledger record describing a single balance-affecting event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub party_id: PartyId,
    pub transaction_type: TransactionType,
    pub transaction_date: NaiveDate,
    pub reference_id: Option<i64>,
    pub reference_no: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Running balance of the party after this entry.
    pub balance: Decimal,
    pub description: String,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed change this entry applies to a party of `kind`.
    pub fn signed_delta(&self, kind: PartyKind) -> Decimal {
        crate::SignConvention::for_party(kind).signed_delta(self.debit, self.credit)
    }

    /// Replay ordering key: `(transaction_date, id)`.
    pub fn position(&self) -> (NaiveDate, EntryId) {
        (self.transaction_date, self.id)
    }

    pub fn is_voided(&self) -> bool {
        self.status == EntryStatus::Voided
    }
}

/// Closed set of balance-affecting event kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Opening,
    Invoice,
    Purchase,
    Payment,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Opening => "opening",
            TransactionType::Invoice => "invoice",
            TransactionType::Purchase => "purchase",
            TransactionType::Payment => "payment",
            TransactionType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opening" => Ok(TransactionType::Opening),
            "invoice" => Ok(TransactionType::Invoice),
            "purchase" => Ok(TransactionType::Purchase),
            "payment" => Ok(TransactionType::Payment),
            "adjustment" => Ok(TransactionType::Adjustment),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Lifecycle of a ledger entry.
///
/// `Pending` only exists before the entry is written. `Voided` is terminal;
/// `Amended` may be amended again or voided.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Committed,
    Amended,
    Voided,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Committed => "committed",
            EntryStatus::Amended => "amended",
            EntryStatus::Voided => "voided",
        }
    }

    pub fn can_transition_to(self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Pending, EntryStatus::Committed)
                | (EntryStatus::Committed, EntryStatus::Amended)
                | (EntryStatus::Amended, EntryStatus::Amended)
                | (EntryStatus::Committed, EntryStatus::Voided)
                | (EntryStatus::Amended, EntryStatus::Voided)
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "committed" => Ok(EntryStatus::Committed),
            "amended" => Ok(EntryStatus::Amended),
            "voided" => Ok(EntryStatus::Voided),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voided_is_terminal() {
        for next in [
            EntryStatus::Pending,
            EntryStatus::Committed,
            EntryStatus::Amended,
            EntryStatus::Voided,
        ] {
            assert!(!EntryStatus::Voided.can_transition_to(next));
        }
    }

    #[test]
    fn amended_entries_can_change_again() {
        assert!(EntryStatus::Amended.can_transition_to(EntryStatus::Amended));
        assert!(EntryStatus::Amended.can_transition_to(EntryStatus::Voided));
        assert!(!EntryStatus::Committed.can_transition_to(EntryStatus::Pending));
    }

    #[test]
    fn unknown_transaction_types_are_rejected() {
        assert_eq!(
            "purchase".parse::<TransactionType>().unwrap(),
            TransactionType::Purchase
        );
        assert!("refund".parse::<TransactionType>().is_err());
    }
}
