use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use weft_core::{Party, PartyDraft, PartyId, PartyKind};

use crate::{EntryId, EntryQuery, LedgerEntry, LedgerError, LedgerResult};

/// Operations available inside one storage transaction.
///
/// Everything done through a `LedgerTx` lands together or not at all.
pub trait LedgerTx {
    fn party(&mut self, id: PartyId) -> LedgerResult<Option<Party>>;

    fn parties(&mut self, kind: Option<PartyKind>) -> LedgerResult<Vec<Party>>;

    /// Insert a party with a zero balance. Opening balances are posted separately.
    fn insert_party(&mut self, draft: &PartyDraft, created_at: DateTime<Utc>)
        -> LedgerResult<Party>;

    fn set_party_active(&mut self, id: PartyId, active: bool) -> LedgerResult<()>;

    /// Compare-and-swap the party balance.
    ///
    /// Fails with [`LedgerError::ConcurrencyConflict`] when the stored version
    /// no longer equals `expected_version`. Returns the new version.
    fn update_party_balance(
        &mut self,
        id: PartyId,
        expected_version: u64,
        balance: Decimal,
    ) -> LedgerResult<u64>;

    fn entry(&mut self, id: EntryId) -> LedgerResult<Option<LedgerEntry>>;

    /// Persist a new entry and return its assigned id. The `id` field of the
    /// argument is ignored.
    fn insert_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<EntryId>;

    /// Overwrite the mutable columns (amounts, date, balance, status) of an entry.
    fn update_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<()>;

    fn entries(&mut self, query: &EntryQuery) -> LedgerResult<Vec<LedgerEntry>>;
}

/// Abstraction over durable party/ledger storage engines.
pub trait LedgerStore: Send + Sync {
    /// Run `work` as one atomic unit. An `Err` from `work` rolls back every
    /// write made through the transaction handle.
    fn transact<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>;
}
