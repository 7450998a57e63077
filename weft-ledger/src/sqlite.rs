use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::warn;
use weft_core::{Party, PartyDraft, PartyId, PartyKind};

use crate::{
    EntryId, EntryQuery, EntryStatus, LedgerEntry, LedgerError, LedgerResult, LedgerStore,
    LedgerTx, TransactionType,
};

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS parties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    phone TEXT,
    email TEXT,
    address TEXT,
    tax_id TEXT,
    current_balance TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS parties_idx_kind ON parties(kind);
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    party_id INTEGER NOT NULL REFERENCES parties(id),
    transaction_type TEXT NOT NULL,
    transaction_date TEXT NOT NULL,
    reference_id INTEGER,
    reference_no TEXT,
    debit TEXT NOT NULL,
    credit TEXT NOT NULL,
    balance TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ledger_idx_party_position
    ON ledger_entries(party_id, transaction_date, id);
CREATE INDEX IF NOT EXISTS ledger_idx_reference
    ON ledger_entries(reference_id);
"#;

const ENTRY_COLUMNS: &str = "id, party_id, transaction_type, transaction_date, reference_id, \
     reference_no, debit, credit, balance, description, status, created_at, updated_at";

const PARTY_COLUMNS: &str =
    "id, kind, name, phone, email, address, tax_id, current_balance, is_active, version, created_at";

/// SQLite-backed party ledger.
///
/// Each unit of work opens its own connection and runs inside
/// `BEGIN IMMEDIATE`, so the writer lock is held from the first balance read
/// until commit and concurrent units on the same database serialize.
#[derive(Clone, Debug)]
pub struct SqliteLedgerStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Self::with_busy_timeout(path, Duration::from_secs(5))
    }

    pub fn with_busy_timeout(path: impl Into<PathBuf>, busy_timeout: Duration) -> LedgerResult<Self> {
        let store = Self {
            path: path.into(),
            busy_timeout,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }

    /// Run `work` inside one immediate transaction with access to the raw
    /// connection, so callers can persist their own rows atomically with
    /// ledger writes.
    pub fn transact_sql<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut SqliteTx<'_>) -> Result<T, E>,
    {
        let mut conn = self.connect().map_err(E::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| E::from(LedgerError::from(err)))?;
        let mut handle = SqliteTx { tx };
        match work(&mut handle) {
            Ok(value) => {
                handle
                    .tx
                    .commit()
                    .map_err(|err| E::from(LedgerError::from(err)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = handle.tx.rollback() {
                    warn!(error = %rollback, "failed to roll back ledger transaction");
                }
                Err(err)
            }
        }
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn transact<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
    {
        self.transact_sql(|tx| work(tx))
    }
}

/// Handle to an open SQLite transaction.
pub struct SqliteTx<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> SqliteTx<'conn> {
    /// Raw connection bound to the open transaction.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }
}

impl LedgerTx for SqliteTx<'_> {
    fn party(&mut self, id: PartyId) -> LedgerResult<Option<Party>> {
        let sql = format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = ?1");
        let raw = self
            .tx
            .query_row(&sql, params![id.0], RawParty::from_row)
            .optional()?;
        raw.map(RawParty::into_party).transpose()
    }

    fn parties(&mut self, kind: Option<PartyKind>) -> LedgerResult<Vec<Party>> {
        let sql = format!(
            "SELECT {PARTY_COLUMNS} FROM parties WHERE (?1 IS NULL OR kind = ?1) ORDER BY id ASC"
        );
        let kind = kind
            .map(|kind| Value::from(kind.as_str().to_string()))
            .unwrap_or(Value::Null);
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map(params![kind], RawParty::from_row)?;
        let mut parties = Vec::new();
        for raw in rows {
            parties.push(raw?.into_party()?);
        }
        Ok(parties)
    }

    fn insert_party(
        &mut self,
        draft: &PartyDraft,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<Party> {
        self.tx.execute(
            "INSERT INTO parties (
                kind, name, phone, email, address, tax_id, current_balance, is_active, version, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8)",
            params![
                draft.kind.as_str(),
                draft.name,
                draft.phone,
                draft.email,
                draft.address,
                draft.tax_id,
                Decimal::ZERO.to_string(),
                created_at.to_rfc3339(),
            ],
        )?;
        let id = PartyId(self.tx.last_insert_rowid());
        self.party(id)?
            .ok_or_else(|| LedgerError::InvalidState(format!("party {id} vanished after insert")))
    }

    fn set_party_active(&mut self, id: PartyId, active: bool) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE parties SET is_active = ?1 WHERE id = ?2",
            params![active, id.0],
        )?;
        if changed == 0 {
            return Err(LedgerError::NotFound(format!("party {id}")));
        }
        Ok(())
    }

    fn update_party_balance(
        &mut self,
        id: PartyId,
        expected_version: u64,
        balance: Decimal,
    ) -> LedgerResult<u64> {
        let changed = self.tx.execute(
            "UPDATE parties SET current_balance = ?1, version = version + 1
             WHERE id = ?2 AND version = ?3",
            params![balance.to_string(), id.0, expected_version as i64],
        )?;
        if changed == 0 {
            let exists: Option<i64> = self
                .tx
                .query_row("SELECT version FROM parties WHERE id = ?1", params![id.0], |row| {
                    row.get(0)
                })
                .optional()?;
            return Err(match exists {
                None => LedgerError::NotFound(format!("party {id}")),
                Some(actual) => LedgerError::ConcurrencyConflict(format!(
                    "party {id} version {actual} != expected {expected_version}"
                )),
            });
        }
        Ok(expected_version + 1)
    }

    fn entry(&mut self, id: EntryId) -> LedgerResult<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = ?1");
        let raw = self
            .tx
            .query_row(&sql, params![id.0], RawEntry::from_row)
            .optional()?;
        raw.map(RawEntry::into_entry).transpose()
    }

    fn insert_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<EntryId> {
        self.tx.execute(
            "INSERT INTO ledger_entries (
                party_id, transaction_type, transaction_date, reference_id, reference_no,
                debit, credit, balance, description, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.party_id.0,
                entry.transaction_type.as_str(),
                entry.transaction_date.to_string(),
                entry.reference_id,
                entry.reference_no,
                entry.debit.to_string(),
                entry.credit.to_string(),
                entry.balance.to_string(),
                entry.description,
                entry.status.as_str(),
                entry.created_at.to_rfc3339(),
                entry.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(EntryId(self.tx.last_insert_rowid()))
    }

    fn update_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE ledger_entries
             SET debit = ?1, credit = ?2, balance = ?3, transaction_date = ?4, status = ?5,
                 updated_at = ?6
             WHERE id = ?7",
            params![
                entry.debit.to_string(),
                entry.credit.to_string(),
                entry.balance.to_string(),
                entry.transaction_date.to_string(),
                entry.status.as_str(),
                entry.updated_at.to_rfc3339(),
                entry.id.0,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::NotFound(format!("ledger entry {}", entry.id)));
        }
        Ok(())
    }

    fn entries(&mut self, query: &EntryQuery) -> LedgerResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS}
             FROM ledger_entries
             WHERE party_id = ?1
               AND (?2 IS NULL OR transaction_date >= ?2)
               AND (?3 IS NULL OR transaction_date <= ?3)
               AND (?4 = 1 OR status != 'voided')
             ORDER BY transaction_date ASC, id ASC"
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                query.party_id.0,
                optional_date(query.from),
                optional_date(query.to),
                query.include_voided,
            ],
            RawEntry::from_row,
        )?;
        let mut entries = Vec::new();
        for raw in rows {
            entries.push(raw?.into_entry()?);
        }
        Ok(entries)
    }
}

fn optional_date(value: Option<NaiveDate>) -> Value {
    value
        .map(|date| Value::from(date.to_string()))
        .unwrap_or(Value::Null)
}

struct RawParty {
    id: i64,
    kind: String,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
    tax_id: Option<String>,
    current_balance: String,
    is_active: bool,
    version: i64,
    created_at: String,
}

impl RawParty {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            name: row.get(2)?,
            phone: row.get(3)?,
            email: row.get(4)?,
            address: row.get(5)?,
            tax_id: row.get(6)?,
            current_balance: row.get(7)?,
            is_active: row.get(8)?,
            version: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_party(self) -> LedgerResult<Party> {
        Ok(Party {
            id: PartyId(self.id),
            kind: PartyKind::from_str(&self.kind).map_err(LedgerError::Serialization)?,
            name: self.name,
            phone: self.phone,
            email: self.email,
            address: self.address,
            tax_id: self.tax_id,
            current_balance: parse_decimal(&self.current_balance)?,
            is_active: self.is_active,
            version: self.version as u64,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct RawEntry {
    id: i64,
    party_id: i64,
    transaction_type: String,
    transaction_date: String,
    reference_id: Option<i64>,
    reference_no: Option<String>,
    debit: String,
    credit: String,
    balance: String,
    description: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            party_id: row.get(1)?,
            transaction_type: row.get(2)?,
            transaction_date: row.get(3)?,
            reference_id: row.get(4)?,
            reference_no: row.get(5)?,
            debit: row.get(6)?,
            credit: row.get(7)?,
            balance: row.get(8)?,
            description: row.get(9)?,
            status: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_entry(self) -> LedgerResult<LedgerEntry> {
        Ok(LedgerEntry {
            id: EntryId(self.id),
            party_id: PartyId(self.party_id),
            transaction_type: TransactionType::from_str(&self.transaction_type)
                .map_err(LedgerError::Serialization)?,
            transaction_date: parse_date(&self.transaction_date)?,
            reference_id: self.reference_id,
            reference_no: self.reference_no,
            debit: parse_decimal(&self.debit)?,
            credit: parse_decimal(&self.credit)?,
            balance: parse_decimal(&self.balance)?,
            description: self.description,
            status: EntryStatus::from_str(&self.status).map_err(LedgerError::Serialization)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_decimal(value: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|err| LedgerError::Serialization(format!("invalid decimal {value}: {err}")))
}

fn parse_date(value: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| LedgerError::Serialization(format!("invalid date {value}: {err}")))
}

fn parse_timestamp(value: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {value}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn entries_round_trip_in_replay_order() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();
        let now = Utc::now();
        let entries = store
            .transact(|tx| -> LedgerResult<Vec<LedgerEntry>> {
                let party = tx.insert_party(
                    &PartyDraft::new(PartyKind::Customer, "Noor Fabrics", date(1)),
                    now,
                )?;
                for (day, debit) in [(5, dec!(30)), (2, dec!(10.25))] {
                    tx.insert_entry(&LedgerEntry {
                        id: EntryId::default(),
                        party_id: party.id,
                        transaction_type: TransactionType::Invoice,
                        transaction_date: date(day),
                        reference_id: Some(7),
                        reference_no: Some("INV-000007".into()),
                        debit,
                        credit: Decimal::ZERO,
                        balance: debit,
                        description: "invoice".into(),
                        status: EntryStatus::Committed,
                        created_at: now,
                        updated_at: now,
                    })?;
                }
                tx.entries(&EntryQuery::for_party(party.id))
            })
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].transaction_date, date(2));
        assert_eq!(entries[0].debit, dec!(10.25));
        assert_eq!(entries[1].reference_no.as_deref(), Some("INV-000007"));
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();
        let err = store
            .transact(|tx| -> LedgerResult<u64> {
                let party = tx.insert_party(
                    &PartyDraft::new(PartyKind::Supplier, "Indus Yarn", date(1)),
                    Utc::now(),
                )?;
                tx.update_party_balance(party.id, 0, dec!(10))?;
                tx.update_party_balance(party.id, 0, dec!(20))
            })
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn failed_unit_rolls_back() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();
        let result: LedgerResult<()> = store.transact(|tx| {
            tx.insert_party(
                &PartyDraft::new(PartyKind::Customer, "Rollback Traders", date(1)),
                Utc::now(),
            )?;
            Err(LedgerError::Validation("abort".into()))
        });
        assert!(result.is_err());
        let parties = store
            .transact(|tx| -> LedgerResult<Vec<Party>> { tx.parties(None) })
            .unwrap();
        assert!(parties.is_empty());
    }
}
