//! Balance ledger engine.
//!
//! Every operation that moves a party balance runs as one unit of work:
//! read the party, compute the signed delta, write the entry, rewrite any
//! later snapshots, then compare-and-swap the party balance. The `*_within`
//! functions run a unit inside a transaction owned by the caller, so
//! recorders can persist their own rows in the same transaction.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use weft_core::{Party, PartyDraft, PartyId, PartyKind};

use crate::replay::{self, ReplayReport};
use crate::{
    EntryId, EntryQuery, EntryStatus, LedgerEntry, LedgerError, LedgerResult, LedgerStore,
    LedgerTx, Posting, RetryPolicy, Statement, TransactionType,
};

/// Knobs that govern how the engine treats parties and write conflicts.
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerPolicy {
    /// Allow new entries against deactivated parties.
    pub allow_inactive_parties: bool,
    pub retry: RetryPolicy,
}

/// A balance-affecting event to append to a party ledger.
#[derive(Clone, Debug)]
pub struct RecordRequest {
    pub party_id: PartyId,
    pub transaction_type: TransactionType,
    /// Positive for invoices, purchases and payments; signed for openings and adjustments.
    pub amount: Decimal,
    pub date: NaiveDate,
    pub reference_id: Option<i64>,
    pub reference_no: Option<String>,
    pub description: String,
}

impl RecordRequest {
    pub fn new(
        party_id: PartyId,
        transaction_type: TransactionType,
        amount: Decimal,
        date: NaiveDate,
    ) -> Self {
        Self {
            party_id,
            transaction_type,
            amount,
            date,
            reference_id: None,
            reference_no: None,
            description: default_description(transaction_type).to_string(),
        }
    }

    pub fn with_reference(mut self, id: Option<i64>, number: Option<String>) -> Self {
        self.reference_id = id;
        self.reference_no = number;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

fn default_description(transaction_type: TransactionType) -> &'static str {
    match transaction_type {
        TransactionType::Opening => "Opening balance",
        TransactionType::Invoice => "Sales invoice",
        TransactionType::Purchase => "Purchase",
        TransactionType::Payment => "Payment",
        TransactionType::Adjustment => "Balance adjustment",
    }
}

/// The single authority that mutates party balances.
#[derive(Debug)]
pub struct BalanceLedger<S> {
    store: S,
    policy: LedgerPolicy,
}

impl<S: LedgerStore> BalanceLedger<S> {
    pub fn new(store: S, policy: LedgerPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    fn unit<T, F>(&self, work: F) -> LedgerResult<T>
    where
        F: Fn(&mut dyn LedgerTx) -> LedgerResult<T>,
    {
        self.policy
            .retry
            .run(|| self.store.transact(|tx| work(tx)), LedgerError::is_conflict)
    }

    /// Create a party and, when the draft carries one, its opening entry.
    pub fn create_party(&self, draft: &PartyDraft) -> LedgerResult<Party> {
        self.unit(|tx| create_party_within(tx, &self.policy, draft))
    }

    pub fn party(&self, id: PartyId) -> LedgerResult<Party> {
        self.unit(|tx| load_party(tx, id))
    }

    pub fn parties(&self, kind: Option<PartyKind>) -> LedgerResult<Vec<Party>> {
        self.unit(|tx| tx.parties(kind))
    }

    pub fn set_party_active(&self, id: PartyId, active: bool) -> LedgerResult<Party> {
        self.unit(|tx| {
            tx.set_party_active(id, active)?;
            info!(party_id = %id, active, "party activity changed");
            load_party(tx, id)
        })
    }

    pub fn entry(&self, id: EntryId) -> LedgerResult<LedgerEntry> {
        self.unit(|tx| load_entry(tx, id))
    }

    pub fn record_transaction(&self, request: &RecordRequest) -> LedgerResult<LedgerEntry> {
        self.unit(|tx| record_within(tx, &self.policy, request))
    }

    /// Amend a free-standing entry. Entries owned by a payment or trade
    /// document only change through their recorder.
    pub fn amend_transaction(
        &self,
        entry_id: EntryId,
        new_amount: Decimal,
        new_date: NaiveDate,
    ) -> LedgerResult<LedgerEntry> {
        self.unit(|tx| {
            ensure_unowned(&load_entry(tx, entry_id)?, "amended")?;
            amend_within(tx, entry_id, new_amount, new_date)
        })
    }

    /// Void a free-standing entry. Same ownership rule as amendments.
    pub fn reverse_transaction(&self, entry_id: EntryId) -> LedgerResult<LedgerEntry> {
        self.unit(|tx| {
            ensure_unowned(&load_entry(tx, entry_id)?, "reversed")?;
            reverse_within(tx, entry_id)
        })
    }

    pub fn reconstruct_statement(
        &self,
        party_id: PartyId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> LedgerResult<Statement> {
        self.unit(|tx| statement_within(tx, party_id, from, to))
    }

    /// Every entry of the party in replay order, voided ones included.
    pub fn history(&self, party_id: PartyId) -> LedgerResult<Vec<LedgerEntry>> {
        self.unit(|tx| {
            load_party(tx, party_id)?;
            tx.entries(&EntryQuery::for_party(party_id).with_voided())
        })
    }

    pub fn verify_party(&self, party_id: PartyId) -> LedgerResult<ReplayReport> {
        self.unit(|tx| verify_within(tx, party_id))
    }

    /// Rewrite every snapshot and the party balance from a replay. Returns the
    /// report describing the state found before the repair.
    pub fn rebuild_party(&self, party_id: PartyId) -> LedgerResult<ReplayReport> {
        self.unit(|tx| rebuild_within(tx, party_id))
    }
}

pub fn load_party<T: LedgerTx + ?Sized>(tx: &mut T, id: PartyId) -> LedgerResult<Party> {
    tx.party(id)?
        .ok_or_else(|| LedgerError::NotFound(format!("party {id}")))
}

pub fn load_entry<T: LedgerTx + ?Sized>(tx: &mut T, id: EntryId) -> LedgerResult<LedgerEntry> {
    tx.entry(id)?
        .ok_or_else(|| LedgerError::NotFound(format!("ledger entry {id}")))
}

fn ensure_unowned(entry: &LedgerEntry, action: &str) -> LedgerResult<()> {
    match entry.reference_id {
        Some(owner) => Err(LedgerError::InvalidState(format!(
            "ledger entry {} belongs to {} and cannot be {action} directly",
            entry.id,
            entry
                .reference_no
                .clone()
                .unwrap_or_else(|| format!("record {owner}"))
        ))),
        None => Ok(()),
    }
}

fn checked_balance(party_id: PartyId, balance: Decimal, delta: Decimal) -> LedgerResult<Decimal> {
    balance.checked_add(delta).ok_or_else(|| {
        LedgerError::Validation(format!("balance of party {party_id} is out of range"))
    })
}

pub fn create_party_within<T: LedgerTx + ?Sized>(
    tx: &mut T,
    policy: &LedgerPolicy,
    draft: &PartyDraft,
) -> LedgerResult<Party> {
    if draft.name.trim().is_empty() {
        return Err(LedgerError::Validation("party name is required".into()));
    }
    let party = tx.insert_party(draft, Utc::now())?;
    info!(party_id = %party.id, kind = %party.kind, name = %party.name, "party created");
    if !draft.opening_balance.is_zero() {
        let request = RecordRequest::new(
            party.id,
            TransactionType::Opening,
            draft.opening_balance,
            draft.opening_date,
        );
        record_within(tx, policy, &request)?;
    }
    load_party(tx, party.id)
}

pub fn record_within<T: LedgerTx + ?Sized>(
    tx: &mut T,
    policy: &LedgerPolicy,
    request: &RecordRequest,
) -> LedgerResult<LedgerEntry> {
    let party = load_party(tx, request.party_id)?;
    if !party.is_active && !policy.allow_inactive_parties {
        return Err(LedgerError::NotFound(format!(
            "party {} is inactive",
            party.id
        )));
    }
    let posting = Posting::for_transaction(party.kind, request.transaction_type, request.amount)?;
    if request.transaction_type == TransactionType::Opening {
        let history = tx.entries(&EntryQuery::for_party(party.id))?;
        if history
            .iter()
            .any(|entry| entry.transaction_type == TransactionType::Opening)
        {
            return Err(LedgerError::Validation(format!(
                "party {} already has an opening balance",
                party.id
            )));
        }
    }

    let delta = posting.signed_delta(party.kind);
    let now = Utc::now();
    let mut entry = LedgerEntry {
        id: EntryId::default(),
        party_id: party.id,
        transaction_type: request.transaction_type,
        transaction_date: request.date,
        reference_id: request.reference_id,
        reference_no: request.reference_no.clone(),
        debit: posting.debit,
        credit: posting.credit,
        balance: checked_balance(party.id, party.current_balance, delta)?,
        description: request.description.clone(),
        status: EntryStatus::Committed,
        created_at: now,
        updated_at: now,
    };
    entry.id = tx.insert_entry(&entry)?;
    debug!(party_id = %party.id, entry_id = %entry.id, delta = %delta, "ledger entry inserted");

    let replayed = resettle(tx, &party, entry.position())?;
    let balance = settle_party(tx, &party, delta, replayed)?;
    let entry = load_entry(tx, entry.id)?;
    info!(
        party_id = %party.id,
        entry_id = %entry.id,
        transaction_type = %entry.transaction_type,
        debit = %entry.debit,
        credit = %entry.credit,
        balance = %balance,
        "ledger entry recorded"
    );
    Ok(entry)
}

pub fn amend_within<T: LedgerTx + ?Sized>(
    tx: &mut T,
    entry_id: EntryId,
    new_amount: Decimal,
    new_date: NaiveDate,
) -> LedgerResult<LedgerEntry> {
    let mut entry = load_entry(tx, entry_id)?;
    if !entry.status.can_transition_to(EntryStatus::Amended) {
        return Err(LedgerError::InvalidState(format!(
            "ledger entry {entry_id} is {} and cannot be amended",
            entry.status
        )));
    }
    let party = load_party(tx, entry.party_id)?;
    let posting = Posting::for_transaction(party.kind, entry.transaction_type, new_amount)?;
    if posting.debit == entry.debit
        && posting.credit == entry.credit
        && new_date == entry.transaction_date
    {
        debug!(entry_id = %entry_id, "amendment is a no-op");
        return Ok(entry);
    }

    let delta = checked_balance(
        party.id,
        posting.signed_delta(party.kind),
        -entry.signed_delta(party.kind),
    )?;
    let anchor = entry.position().min((new_date, entry.id));
    entry.debit = posting.debit;
    entry.credit = posting.credit;
    entry.transaction_date = new_date;
    entry.status = EntryStatus::Amended;
    entry.updated_at = Utc::now();
    tx.update_entry(&entry)?;

    let replayed = resettle(tx, &party, anchor)?;
    let balance = settle_party(tx, &party, delta, replayed)?;
    let entry = load_entry(tx, entry_id)?;
    info!(
        party_id = %party.id,
        entry_id = %entry_id,
        delta = %delta,
        balance = %balance,
        "ledger entry amended"
    );
    Ok(entry)
}

pub fn reverse_within<T: LedgerTx + ?Sized>(
    tx: &mut T,
    entry_id: EntryId,
) -> LedgerResult<LedgerEntry> {
    let mut entry = load_entry(tx, entry_id)?;
    if !entry.status.can_transition_to(EntryStatus::Voided) {
        return Err(LedgerError::InvalidState(format!(
            "ledger entry {entry_id} is {} and cannot be reversed",
            entry.status
        )));
    }
    let party = load_party(tx, entry.party_id)?;
    let delta = -entry.signed_delta(party.kind);
    entry.status = EntryStatus::Voided;
    entry.updated_at = Utc::now();
    tx.update_entry(&entry)?;

    let replayed = resettle(tx, &party, entry.position())?;
    let balance = settle_party(tx, &party, delta, replayed)?;
    info!(
        party_id = %party.id,
        entry_id = %entry_id,
        delta = %delta,
        balance = %balance,
        "ledger entry voided"
    );
    Ok(entry)
}

pub fn statement_within<T: LedgerTx + ?Sized>(
    tx: &mut T,
    party_id: PartyId,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> LedgerResult<Statement> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(LedgerError::Validation(format!(
                "statement range starts after it ends ({from} > {to})"
            )));
        }
    }
    let party = load_party(tx, party_id)?;
    let history = tx.entries(&EntryQuery::for_party(party_id).with_date_range(None, to))?;
    Ok(Statement::from_history(party, history, from, to))
}

pub fn verify_within<T: LedgerTx + ?Sized>(
    tx: &mut T,
    party_id: PartyId,
) -> LedgerResult<ReplayReport> {
    let party = load_party(tx, party_id)?;
    let history = tx.entries(&EntryQuery::for_party(party_id))?;
    Ok(replay::verify(&party, &history))
}

pub fn rebuild_within<T: LedgerTx + ?Sized>(
    tx: &mut T,
    party_id: PartyId,
) -> LedgerResult<ReplayReport> {
    let party = load_party(tx, party_id)?;
    let history = tx.entries(&EntryQuery::for_party(party_id))?;
    let report = replay::verify(&party, &history);
    if report.is_consistent() {
        return Ok(report);
    }
    let balances = replay::running_balances(&party, &history, Decimal::ZERO);
    for (mut entry, balance) in history.into_iter().zip(balances) {
        if entry.balance != balance {
            entry.balance = balance;
            tx.update_entry(&entry)?;
        }
    }
    tx.update_party_balance(party.id, party.version, report.replayed_balance)?;
    warn!(
        party_id = %party.id,
        snapshots_fixed = report.mismatches.len(),
        drift = %report.drift(),
        balance = %report.replayed_balance,
        "party ledger rebuilt from replay"
    );
    Ok(report)
}

/// Rewrite stored snapshots of every committed entry at or after `anchor`
/// and return the running balance after the last entry.
fn resettle<T: LedgerTx + ?Sized>(
    tx: &mut T,
    party: &Party,
    anchor: (NaiveDate, EntryId),
) -> LedgerResult<Decimal> {
    let history = tx.entries(&EntryQuery::for_party(party.id))?;
    let mut balance = Decimal::ZERO;
    let mut rewritten = 0usize;
    for mut entry in history {
        if entry.position() < anchor {
            balance = entry.balance;
            continue;
        }
        balance = checked_balance(party.id, balance, entry.signed_delta(party.kind))?;
        if entry.balance != balance {
            entry.balance = balance;
            tx.update_entry(&entry)?;
            rewritten += 1;
        }
    }
    if rewritten > 1 {
        debug!(party_id = %party.id, rewritten, "downstream snapshots rewritten");
    }
    Ok(balance)
}

/// Apply `delta` to the balance read at the start of the unit and swap it in.
fn settle_party<T: LedgerTx + ?Sized>(
    tx: &mut T,
    party: &Party,
    delta: Decimal,
    replayed: Decimal,
) -> LedgerResult<Decimal> {
    let balance = checked_balance(party.id, party.current_balance, delta)?;
    if balance != replayed {
        warn!(
            party_id = %party.id,
            balance = %balance,
            replayed = %replayed,
            "party balance disagrees with ledger snapshots; run a rebuild"
        );
    }
    tx.update_party_balance(party.id, party.version, balance)?;
    Ok(balance)
}
