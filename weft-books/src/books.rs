use std::path::PathBuf;
use std::time::Duration;

use weft_core::DocumentSeries;
use weft_ledger::{BalanceLedger, LedgerPolicy, SqliteLedgerStore, SqliteTx};

use crate::rows;
use crate::schema::BOOKS_SCHEMA;
use crate::{BooksError, BooksResult};

/// Inventory rules applied by the stock-moving recorders.
#[derive(Clone, Copy, Debug, Default)]
pub struct BooksPolicy {
    pub allow_negative_stock: bool,
}

/// Entry point for every recorder.
///
/// Each operation runs inside one SQLite transaction that covers both the
/// recorder's own rows and the ledger write, and is retried as a whole when
/// the database reports a write conflict.
#[derive(Debug)]
pub struct Books {
    ledger: BalanceLedger<SqliteLedgerStore>,
    policy: BooksPolicy,
}

impl Books {
    pub fn open(
        path: impl Into<PathBuf>,
        ledger_policy: LedgerPolicy,
        policy: BooksPolicy,
    ) -> BooksResult<Self> {
        let store = SqliteLedgerStore::new(path)?;
        Self::from_store(store, ledger_policy, policy)
    }

    pub fn open_with_timeout(
        path: impl Into<PathBuf>,
        busy_timeout: Duration,
        ledger_policy: LedgerPolicy,
        policy: BooksPolicy,
    ) -> BooksResult<Self> {
        let store = SqliteLedgerStore::with_busy_timeout(path, busy_timeout)?;
        Self::from_store(store, ledger_policy, policy)
    }

    pub fn from_store(
        store: SqliteLedgerStore,
        ledger_policy: LedgerPolicy,
        policy: BooksPolicy,
    ) -> BooksResult<Self> {
        store.transact_sql(|tx| -> BooksResult<()> {
            tx.connection().execute_batch(BOOKS_SCHEMA)?;
            Ok(())
        })?;
        Ok(Self {
            ledger: BalanceLedger::new(store, ledger_policy),
            policy,
        })
    }

    pub fn ledger(&self) -> &BalanceLedger<SqliteLedgerStore> {
        &self.ledger
    }

    pub fn policy(&self) -> &BooksPolicy {
        &self.policy
    }

    pub(crate) fn ledger_policy(&self) -> &LedgerPolicy {
        self.ledger.policy()
    }

    pub(crate) fn unit<T, F>(&self, work: F) -> BooksResult<T>
    where
        F: Fn(&mut SqliteTx<'_>) -> BooksResult<T>,
    {
        self.ledger.policy().retry.run(
            || self.ledger.store().transact_sql(|tx| work(tx)),
            BooksError::is_conflict,
        )
    }

    /// Number the next document of `series` would receive.
    pub fn peek_number(&self, series: DocumentSeries) -> BooksResult<String> {
        self.unit(|tx| rows::peek_number(tx.connection(), series))
    }
}
