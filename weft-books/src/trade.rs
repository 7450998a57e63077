//! Sales invoices and purchase orders.
//!
//! A document starts as a draft. Posting it moves stock for every line and
//! records the total against the party ledger; editing a posted document
//! amends that entry, and cancelling it voids the entry and puts the stock
//! back.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use weft_core::{round_money, DocumentSeries, PartyId, PartyKind, ProductId, StockDirection};
use weft_ledger::engine::{amend_within, load_party, record_within, reverse_within};
use weft_ledger::{EntryId, LedgerPolicy, RecordRequest, SqliteTx, TransactionType};

use crate::rows;
use crate::stock::{apply_stock, load_product, StockChange};
use crate::{Books, BooksError, BooksPolicy, BooksResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    SalesInvoice,
    PurchaseOrder,
}

impl TradeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeKind::SalesInvoice => "sales_invoice",
            TradeKind::PurchaseOrder => "purchase_order",
        }
    }

    pub fn party_kind(self) -> PartyKind {
        match self {
            TradeKind::SalesInvoice => PartyKind::Customer,
            TradeKind::PurchaseOrder => PartyKind::Supplier,
        }
    }

    pub fn transaction_type(self) -> TransactionType {
        match self {
            TradeKind::SalesInvoice => TransactionType::Invoice,
            TradeKind::PurchaseOrder => TransactionType::Purchase,
        }
    }

    pub fn stock_direction(self) -> StockDirection {
        match self {
            TradeKind::SalesInvoice => StockDirection::Out,
            TradeKind::PurchaseOrder => StockDirection::In,
        }
    }

    pub fn series(self) -> DocumentSeries {
        match self {
            TradeKind::SalesInvoice => DocumentSeries::SalesInvoice,
            TradeKind::PurchaseOrder => DocumentSeries::PurchaseOrder,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TradeKind::SalesInvoice => "Sales invoice",
            TradeKind::PurchaseOrder => "Purchase order",
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sales_invoice" => Ok(TradeKind::SalesInvoice),
            "purchase_order" => Ok(TradeKind::PurchaseOrder),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Posted,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Posted => "posted",
            DocumentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DocumentStatus::Draft),
            "posted" => Ok(DocumentStatus::Posted),
            "cancelled" => Ok(DocumentStatus::Cancelled),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeLine {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeDocument {
    pub id: i64,
    pub kind: TradeKind,
    pub number: String,
    pub party_id: PartyId,
    pub date: NaiveDate,
    pub lines: Vec<TradeLine>,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: DocumentStatus,
    pub ledger_entry_id: Option<EntryId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeDocument {
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(|line| line.line_total).sum()
    }
}

/// One requested line. Without a unit price the product's list price is used.
#[derive(Clone, Debug)]
pub struct LineDraft {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

impl LineDraft {
    pub fn new(product_id: ProductId, quantity: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: None,
        }
    }

    pub fn at_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

#[derive(Clone, Debug)]
pub struct TradeDraft {
    pub kind: TradeKind,
    pub party_id: PartyId,
    pub date: NaiveDate,
    pub lines: Vec<LineDraft>,
    pub discount: Decimal,
    pub notes: Option<String>,
}

impl TradeDraft {
    pub fn sales_invoice(customer: PartyId, date: NaiveDate) -> Self {
        Self::new(TradeKind::SalesInvoice, customer, date)
    }

    pub fn purchase_order(supplier: PartyId, date: NaiveDate) -> Self {
        Self::new(TradeKind::PurchaseOrder, supplier, date)
    }

    fn new(kind: TradeKind, party_id: PartyId, date: NaiveDate) -> Self {
        Self {
            kind,
            party_id,
            date,
            lines: Vec::new(),
            discount: Decimal::ZERO,
            notes: None,
        }
    }

    pub fn line(mut self, line: LineDraft) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Replacement content for an existing document. `None` keeps the current value.
#[derive(Clone, Debug, Default)]
pub struct TradeRevision {
    pub date: Option<NaiveDate>,
    pub lines: Option<Vec<LineDraft>>,
    pub discount: Option<Decimal>,
}

impl Books {
    /// Create a document. With `add_to_account` it is posted in the same
    /// transaction, otherwise it stays a draft outside the ledger.
    pub fn create_document(
        &self,
        draft: &TradeDraft,
        add_to_account: bool,
    ) -> BooksResult<TradeDocument> {
        let policy = *self.policy();
        self.unit(|tx| {
            let party = load_party(tx, draft.party_id)?;
            if party.kind != draft.kind.party_kind() {
                return Err(BooksError::Validation(format!(
                    "{} requires a {}, party {} is a {}",
                    draft.kind,
                    draft.kind.party_kind(),
                    party.id,
                    party.kind
                )));
            }
            let (lines, total) = price_lines(tx.connection(), &draft.lines, draft.discount)?;
            let number = rows::next_number(tx.connection(), draft.kind.series())?;
            let now = Utc::now().to_rfc3339();
            tx.connection().execute(
                "INSERT INTO trade_documents (kind, number, party_id, document_date, discount, total, status, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    draft.kind.as_str(),
                    number,
                    party.id.0,
                    rows::format_date(draft.date),
                    round_money(draft.discount).to_string(),
                    total.to_string(),
                    DocumentStatus::Draft.as_str(),
                    draft.notes,
                    now,
                ],
            )?;
            let id = tx.connection().last_insert_rowid();
            write_lines(tx.connection(), id, &lines)?;
            info!(document_id = id, number = %number, kind = %draft.kind, total = %total, "document created");

            let document = load_document(tx.connection(), id)?;
            if add_to_account {
                post_within(tx, self.ledger_policy(), &policy, document)
            } else {
                Ok(document)
            }
        })
    }

    /// Post a draft: move stock and record the total against the party.
    pub fn post_document(&self, id: i64) -> BooksResult<TradeDocument> {
        let policy = *self.policy();
        self.unit(|tx| {
            let document = load_document(tx.connection(), id)?;
            if document.status != DocumentStatus::Draft {
                return Err(BooksError::InvalidState(format!(
                    "{} is {} and cannot be posted",
                    document.number, document.status
                )));
            }
            post_within(tx, self.ledger_policy(), &policy, document)
        })
    }

    /// Replace the date, lines or discount. A posted document moves only the
    /// per-product stock difference and has its ledger entry amended to the
    /// new total.
    pub fn revise_document(&self, id: i64, revision: &TradeRevision) -> BooksResult<TradeDocument> {
        let policy = *self.policy();
        self.unit(|tx| {
            let current = load_document(tx.connection(), id)?;
            if current.status == DocumentStatus::Cancelled {
                return Err(BooksError::InvalidState(format!(
                    "{} is cancelled and cannot be edited",
                    current.number
                )));
            }
            let date = revision.date.unwrap_or(current.date);
            let discount = revision.discount.unwrap_or(current.discount);
            let (lines, total) = match &revision.lines {
                Some(drafts) => price_lines(tx.connection(), drafts, discount)?,
                None => {
                    let total = document_total(&current.lines, discount)?;
                    (current.lines.clone(), total)
                }
            };

            if current.status == DocumentStatus::Posted {
                let entry_id = current.ledger_entry_id.ok_or_else(|| {
                    BooksError::InvalidState(format!("{} has no ledger entry", current.number))
                })?;
                move_difference(tx.connection(), &policy, &current, &lines, date)?;
                amend_within(tx, entry_id, total, date)?;
            }

            let conn = tx.connection();
            conn.execute("DELETE FROM trade_lines WHERE document_id = ?1", [id])?;
            write_lines(conn, id, &lines)?;
            conn.execute(
                "UPDATE trade_documents SET document_date = ?1, discount = ?2, total = ?3, updated_at = ?4 WHERE id = ?5",
                params![
                    rows::format_date(date),
                    round_money(discount).to_string(),
                    total.to_string(),
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?;
            info!(document_id = id, number = %current.number, total = %total, "document revised");
            load_document(conn, id)
        })
    }

    /// Cancel a document. A posted one has its entry voided and stock restored.
    pub fn cancel_document(&self, id: i64) -> BooksResult<TradeDocument> {
        let policy = *self.policy();
        self.unit(|tx| {
            let document = load_document(tx.connection(), id)?;
            match document.status {
                DocumentStatus::Cancelled => {
                    return Err(BooksError::InvalidState(format!(
                        "{} is already cancelled",
                        document.number
                    )));
                }
                DocumentStatus::Posted => {
                    if let Some(entry_id) = document.ledger_entry_id {
                        reverse_within(tx, entry_id)?;
                    }
                    let direction = document.kind.stock_direction().inverse();
                    move_lines(tx.connection(), &policy, &document, &document.lines, direction, document.date)?;
                }
                DocumentStatus::Draft => {}
            }
            set_status(tx.connection(), id, DocumentStatus::Cancelled, document.ledger_entry_id)?;
            info!(document_id = id, number = %document.number, "document cancelled");
            load_document(tx.connection(), id)
        })
    }

    pub fn document(&self, id: i64) -> BooksResult<TradeDocument> {
        self.unit(|tx| load_document(tx.connection(), id))
    }

    pub fn documents(
        &self,
        kind: TradeKind,
        party_id: Option<PartyId>,
    ) -> BooksResult<Vec<TradeDocument>> {
        self.unit(|tx| {
            let conn = tx.connection();
            let mut stmt = conn.prepare(
                "SELECT id FROM trade_documents WHERE kind = ?1 AND (?2 IS NULL OR party_id = ?2)
                 ORDER BY document_date, id",
            )?;
            let ids = stmt
                .query_map(params![kind.as_str(), party_id.map(|id| id.0)], |row| {
                    row.get::<_, i64>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids.into_iter().map(|id| load_document(conn, id)).collect()
        })
    }
}

fn post_within(
    tx: &mut SqliteTx<'_>,
    ledger_policy: &LedgerPolicy,
    policy: &BooksPolicy,
    document: TradeDocument,
) -> BooksResult<TradeDocument> {
    move_lines(
        tx.connection(),
        policy,
        &document,
        &document.lines,
        document.kind.stock_direction(),
        document.date,
    )?;
    let request = RecordRequest::new(
        document.party_id,
        document.kind.transaction_type(),
        document.total,
        document.date,
    )
    .with_reference(Some(document.id), Some(document.number.clone()))
    .with_description(format!("{} {}", document.kind.label(), document.number));
    let entry = record_within(tx, ledger_policy, &request)?;
    set_status(tx.connection(), document.id, DocumentStatus::Posted, Some(entry.id))?;
    info!(document_id = document.id, number = %document.number, entry_id = %entry.id, "document posted");
    load_document(tx.connection(), document.id)
}

fn move_lines(
    conn: &Connection,
    policy: &BooksPolicy,
    document: &TradeDocument,
    lines: &[TradeLine],
    direction: StockDirection,
    date: NaiveDate,
) -> BooksResult<()> {
    for line in lines {
        apply_stock(
            conn,
            policy,
            &StockChange {
                product_id: line.product_id,
                direction,
                quantity: line.quantity,
                date,
                reason: Some(document.number.clone()),
                document_id: Some(document.id),
            },
        )?;
    }
    Ok(())
}

/// Apply the net stock change between a posted document's lines and `revised`.
/// Increases go first.
fn move_difference(
    conn: &Connection,
    policy: &BooksPolicy,
    document: &TradeDocument,
    revised: &[TradeLine],
    date: NaiveDate,
) -> BooksResult<()> {
    let direction = document.kind.stock_direction();
    let mut net: BTreeMap<ProductId, Decimal> = BTreeMap::new();
    for line in revised {
        let quantity = net.entry(line.product_id).or_default();
        *quantity = rows::checked_sum(*quantity, line.quantity, "line quantity")?;
    }
    for line in &document.lines {
        let quantity = net.entry(line.product_id).or_default();
        *quantity = rows::checked_sum(*quantity, -line.quantity, "line quantity")?;
    }

    let mut changes: Vec<StockChange> = net
        .into_iter()
        .filter(|(_, quantity)| !quantity.is_zero())
        .map(|(product_id, quantity)| StockChange {
            product_id,
            direction: if quantity > Decimal::ZERO {
                direction
            } else {
                direction.inverse()
            },
            quantity: quantity.abs(),
            date,
            reason: Some(document.number.clone()),
            document_id: Some(document.id),
        })
        .collect();
    changes.sort_by_key(|change| change.direction == StockDirection::Out);
    for change in &changes {
        apply_stock(conn, policy, change)?;
    }
    Ok(())
}

fn price_lines(
    conn: &Connection,
    drafts: &[LineDraft],
    discount: Decimal,
) -> BooksResult<(Vec<TradeLine>, Decimal)> {
    if drafts.is_empty() {
        return Err(BooksError::Validation("a document needs at least one line".into()));
    }
    let mut lines = Vec::with_capacity(drafts.len());
    for draft in drafts {
        if draft.quantity <= Decimal::ZERO {
            return Err(BooksError::Validation(format!(
                "line quantity must be positive, got {}",
                draft.quantity
            )));
        }
        let product = load_product(conn, draft.product_id)?;
        let unit_price = draft.unit_price.unwrap_or(product.unit_price);
        if unit_price < Decimal::ZERO {
            return Err(BooksError::Validation(format!(
                "unit price must not be negative, got {unit_price}"
            )));
        }
        lines.push(TradeLine {
            product_id: product.id,
            quantity: draft.quantity,
            unit_price,
            line_total: round_money(draft.quantity.checked_mul(unit_price).ok_or_else(|| {
                BooksError::Validation(format!(
                    "line total of {} x {unit_price} is out of range",
                    draft.quantity
                ))
            })?),
        });
    }
    let total = document_total(&lines, discount)?;
    Ok((lines, total))
}

fn document_total(lines: &[TradeLine], discount: Decimal) -> BooksResult<Decimal> {
    let subtotal = lines.iter().try_fold(Decimal::ZERO, |subtotal, line| {
        rows::checked_sum(subtotal, line.line_total, "document subtotal")
    })?;
    if discount < Decimal::ZERO || discount > subtotal {
        return Err(BooksError::Validation(format!(
            "discount {discount} must be between 0 and the subtotal {subtotal}"
        )));
    }
    Ok(round_money(subtotal - discount))
}

fn write_lines(conn: &Connection, document_id: i64, lines: &[TradeLine]) -> BooksResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO trade_lines (document_id, product_id, quantity, unit_price, line_total)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for line in lines {
        stmt.execute(params![
            document_id,
            line.product_id.0,
            line.quantity.to_string(),
            line.unit_price.to_string(),
            line.line_total.to_string(),
        ])?;
    }
    Ok(())
}

fn set_status(
    conn: &Connection,
    id: i64,
    status: DocumentStatus,
    entry_id: Option<EntryId>,
) -> BooksResult<()> {
    conn.execute(
        "UPDATE trade_documents SET status = ?1, ledger_entry_id = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            status.as_str(),
            entry_id.map(|id| id.0),
            Utc::now().to_rfc3339(),
            id
        ],
    )?;
    Ok(())
}

fn load_document(conn: &Connection, id: i64) -> BooksResult<TradeDocument> {
    let raw = conn
        .query_row(
            "SELECT id, kind, number, party_id, document_date, discount, total, status, ledger_entry_id, notes, created_at, updated_at
             FROM trade_documents WHERE id = ?1",
            [id],
            |row| {
                Ok(RawDocument {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    number: row.get(2)?,
                    party_id: row.get(3)?,
                    date: row.get(4)?,
                    discount: row.get(5)?,
                    total: row.get(6)?,
                    status: row.get(7)?,
                    ledger_entry_id: row.get(8)?,
                    notes: row.get(9)?,
                    created_at: row.get(10)?,
                    updated_at: row.get(11)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| BooksError::NotFound(format!("document {id}")))?;

    let mut stmt = conn.prepare(
        "SELECT product_id, quantity, unit_price, line_total FROM trade_lines
         WHERE document_id = ?1 ORDER BY id",
    )?;
    let raw_lines = stmt
        .query_map([id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut lines = Vec::with_capacity(raw_lines.len());
    for (product_id, quantity, unit_price, line_total) in raw_lines {
        lines.push(TradeLine {
            product_id: ProductId(product_id),
            quantity: rows::decimal(&quantity)?,
            unit_price: rows::decimal(&unit_price)?,
            line_total: rows::decimal(&line_total)?,
        });
    }

    Ok(TradeDocument {
        id: raw.id,
        kind: rows::enum_value(&raw.kind)?,
        number: raw.number,
        party_id: PartyId(raw.party_id),
        date: rows::date(&raw.date)?,
        lines,
        discount: rows::decimal(&raw.discount)?,
        total: rows::decimal(&raw.total)?,
        status: rows::enum_value(&raw.status)?,
        ledger_entry_id: raw.ledger_entry_id.map(EntryId),
        notes: raw.notes,
        created_at: rows::timestamp(&raw.created_at)?,
        updated_at: rows::timestamp(&raw.updated_at)?,
    })
}

struct RawDocument {
    id: i64,
    kind: String,
    number: String,
    party_id: i64,
    date: String,
    discount: String,
    total: String,
    status: String,
    ledger_entry_id: Option<i64>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}
