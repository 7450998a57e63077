use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use weft_core::{Party, PartyDraft, PartyId, PartyKind};

use crate::{
    EntryId, EntryQuery, LedgerEntry, LedgerError, LedgerResult, LedgerStore, LedgerTx,
};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    parties: BTreeMap<PartyId, Party>,
    entries: BTreeMap<EntryId, LedgerEntry>,
    last_party: i64,
    last_entry: i64,
}

/// Process-local store used by tests and embedded callers.
///
/// A unit of work runs against a copy of the state while holding the lock;
/// the copy replaces the shared state only when the unit succeeds.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn transact<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
    {
        let mut guard = self.state.lock();
        let mut scratch = guard.clone();
        let result = work(&mut MemoryTx {
            state: &mut scratch,
        })?;
        *guard = scratch;
        Ok(result)
    }
}

struct MemoryTx<'a> {
    state: &'a mut MemoryState,
}

impl LedgerTx for MemoryTx<'_> {
    fn party(&mut self, id: PartyId) -> LedgerResult<Option<Party>> {
        Ok(self.state.parties.get(&id).cloned())
    }

    fn parties(&mut self, kind: Option<PartyKind>) -> LedgerResult<Vec<Party>> {
        Ok(self
            .state
            .parties
            .values()
            .filter(|party| kind.map_or(true, |kind| party.kind == kind))
            .cloned()
            .collect())
    }

    fn insert_party(
        &mut self,
        draft: &PartyDraft,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<Party> {
        self.state.last_party += 1;
        let party = Party {
            id: PartyId(self.state.last_party),
            kind: draft.kind,
            name: draft.name.clone(),
            phone: draft.phone.clone(),
            email: draft.email.clone(),
            address: draft.address.clone(),
            tax_id: draft.tax_id.clone(),
            current_balance: Decimal::ZERO,
            is_active: true,
            version: 0,
            created_at,
        };
        self.state.parties.insert(party.id, party.clone());
        Ok(party)
    }

    fn set_party_active(&mut self, id: PartyId, active: bool) -> LedgerResult<()> {
        let party = self
            .state
            .parties
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("party {id}")))?;
        party.is_active = active;
        Ok(())
    }

    fn update_party_balance(
        &mut self,
        id: PartyId,
        expected_version: u64,
        balance: Decimal,
    ) -> LedgerResult<u64> {
        let party = self
            .state
            .parties
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("party {id}")))?;
        if party.version != expected_version {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "party {id} version {} != expected {expected_version}",
                party.version
            )));
        }
        party.current_balance = balance;
        party.version += 1;
        Ok(party.version)
    }

    fn entry(&mut self, id: EntryId) -> LedgerResult<Option<LedgerEntry>> {
        Ok(self.state.entries.get(&id).cloned())
    }

    fn insert_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<EntryId> {
        self.state.last_entry += 1;
        let id = EntryId(self.state.last_entry);
        let mut stored = entry.clone();
        stored.id = id;
        self.state.entries.insert(id, stored);
        Ok(id)
    }

    fn update_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<()> {
        let stored = self
            .state
            .entries
            .get_mut(&entry.id)
            .ok_or_else(|| LedgerError::NotFound(format!("ledger entry {}", entry.id)))?;
        stored.debit = entry.debit;
        stored.credit = entry.credit;
        stored.balance = entry.balance;
        stored.transaction_date = entry.transaction_date;
        stored.status = entry.status;
        stored.updated_at = entry.updated_at;
        Ok(())
    }

    fn entries(&mut self, query: &EntryQuery) -> LedgerResult<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .state
            .entries
            .values()
            .filter(|entry| entry.party_id == query.party_id)
            .filter(|entry| query.include_voided || !entry.is_voided())
            .filter(|entry| query.matches_date(entry.transaction_date))
            .cloned()
            .collect();
        entries.sort_by_key(LedgerEntry::position);
        Ok(entries)
    }
}
