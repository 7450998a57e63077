//! Party balance ledger and its storage backends.

mod convention;
pub mod engine;
mod entry;
mod error;
mod memory;
mod query;
pub mod replay;
mod retry;
mod sqlite;
mod statement;
mod store;

pub use convention::{Posting, SignConvention};
pub use engine::{BalanceLedger, LedgerPolicy, RecordRequest};
pub use entry::{EntryId, EntryStatus, LedgerEntry, TransactionType};
pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedgerStore;
pub use query::EntryQuery;
pub use replay::{ReplayReport, SnapshotMismatch};
pub use retry::RetryPolicy;
pub use sqlite::{SqliteLedgerStore, SqliteTx};
pub use statement::Statement;
pub use store::{LedgerStore, LedgerTx};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use weft_core::{Party, PartyId, PartyKind};

    fn sample_entry(id: i64, debit: Decimal, credit: Decimal, balance: Decimal) -> LedgerEntry {
        LedgerEntry {
            id: EntryId(id),
            party_id: PartyId(1),
            transaction_type: TransactionType::Adjustment,
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, id as u32).unwrap(),
            reference_id: None,
            reference_no: None,
            debit,
            credit,
            balance,
            description: String::new(),
            status: EntryStatus::Committed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_party(kind: PartyKind, balance: Decimal) -> Party {
        Party {
            id: PartyId(1),
            kind,
            name: "Sample".into(),
            phone: None,
            email: None,
            address: None,
            tax_id: None,
            current_balance: balance,
            is_active: true,
            version: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn replay_reproduces_customer_snapshots() {
        let entries = vec![
            sample_entry(1, dec!(100), Decimal::ZERO, dec!(100)),
            sample_entry(2, Decimal::ZERO, dec!(30), dec!(70)),
            sample_entry(3, dec!(5), Decimal::ZERO, dec!(75)),
        ];
        let report = replay::verify(&sample_party(PartyKind::Customer, dec!(75)), &entries);
        assert!(report.is_consistent());
        assert_eq!(report.entry_count, 3);
    }

    #[test]
    fn supplier_replay_grows_on_credit() {
        let entries = vec![
            sample_entry(1, Decimal::ZERO, dec!(100), dec!(100)),
            sample_entry(2, dec!(40), Decimal::ZERO, dec!(60)),
        ];
        let report = replay::verify(&sample_party(PartyKind::Supplier, dec!(60)), &entries);
        assert!(report.is_consistent());
    }

    #[test]
    fn replay_reports_drift_and_bad_snapshots() {
        let entries = vec![
            sample_entry(1, dec!(100), Decimal::ZERO, dec!(100)),
            sample_entry(2, dec!(10), Decimal::ZERO, dec!(100)),
        ];
        let report = replay::verify(&sample_party(PartyKind::Customer, dec!(150)), &entries);
        assert!(!report.is_consistent());
        assert_eq!(report.replayed_balance, dec!(110));
        assert_eq!(report.drift(), dec!(40));
        assert_eq!(
            report.mismatches,
            vec![SnapshotMismatch {
                entry_id: EntryId(2),
                stored: dec!(100),
                replayed: dec!(110),
            }]
        );
    }
}
