//! Payments received from customers and paid to suppliers.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use weft_core::{round_money, DocumentSeries, PartyId, PaymentDirection, PaymentMethod};
use weft_ledger::engine::{amend_within, load_party, record_within, reverse_within};
use weft_ledger::{EntryId, RecordRequest, TransactionType};

use crate::rows;
use crate::{Books, BooksError, BooksResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub direction: PaymentDirection,
    pub party_id: PartyId,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub reference_no: Option<String>,
    pub notes: Option<String>,
    /// RCV-xxxxxx for payments in, PAY-xxxxxx for payments out.
    pub receipt_no: String,
    pub ledger_entry_id: Option<EntryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct PaymentDraft {
    pub direction: PaymentDirection,
    pub party_id: PartyId,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub reference_no: Option<String>,
    pub notes: Option<String>,
}

impl PaymentDraft {
    pub fn received(customer: PartyId, amount: Decimal, date: NaiveDate) -> Self {
        Self::new(PaymentDirection::In, customer, amount, date)
    }

    pub fn paid(supplier: PartyId, amount: Decimal, date: NaiveDate) -> Self {
        Self::new(PaymentDirection::Out, supplier, amount, date)
    }

    fn new(direction: PaymentDirection, party_id: PartyId, amount: Decimal, date: NaiveDate) -> Self {
        Self {
            direction,
            party_id,
            amount,
            date,
            method: PaymentMethod::Cash,
            reference_no: None,
            notes: None,
        }
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_reference(mut self, reference_no: impl Into<String>) -> Self {
        self.reference_no = Some(reference_no.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Fields of a recorded payment that may change. `None` keeps the current
/// value; for the optional text fields `Some(None)` clears it.
#[derive(Clone, Debug, Default)]
pub struct PaymentUpdate {
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub reference_no: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

fn series_for(direction: PaymentDirection) -> DocumentSeries {
    match direction {
        PaymentDirection::In => DocumentSeries::Receipt,
        PaymentDirection::Out => DocumentSeries::PaymentVoucher,
    }
}

impl Books {
    /// Persist a payment and post it to the party ledger in one transaction.
    pub fn record_payment(&self, draft: &PaymentDraft) -> BooksResult<Payment> {
        let amount = round_money(draft.amount);
        self.unit(|tx| {
            let party = load_party(tx, draft.party_id)?;
            let expected = draft.direction.party_kind();
            if party.kind != expected {
                return Err(BooksError::Validation(format!(
                    "payment {} requires a {expected}, party {} is a {}",
                    draft.direction, party.id, party.kind
                )));
            }
            let receipt_no = rows::next_number(tx.connection(), series_for(draft.direction))?;
            let now = Utc::now().to_rfc3339();
            tx.connection().execute(
                "INSERT INTO payments (direction, party_id, amount, payment_date, method, reference_no, notes, receipt_no, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    draft.direction.as_str(),
                    draft.party_id.0,
                    amount.to_string(),
                    rows::format_date(draft.date),
                    draft.method.as_str(),
                    draft.reference_no,
                    draft.notes,
                    receipt_no,
                    now,
                ],
            )?;
            let payment_id = tx.connection().last_insert_rowid();

            let request = RecordRequest::new(party.id, TransactionType::Payment, amount, draft.date)
                .with_reference(Some(payment_id), Some(receipt_no.clone()))
                .with_description(format!("Payment {} {receipt_no} ({})", draft.direction, draft.method));
            let entry = record_within(tx, self.ledger_policy(), &request)?;
            tx.connection().execute(
                "UPDATE payments SET ledger_entry_id = ?1 WHERE id = ?2",
                params![entry.id.0, payment_id],
            )?;
            info!(payment_id, receipt_no = %receipt_no, party_id = %party.id, amount = %amount, "payment recorded");
            load_payment(tx.connection(), payment_id)
        })
    }

    /// Change a recorded payment; amount or date changes amend its ledger entry.
    pub fn update_payment(&self, id: i64, update: &PaymentUpdate) -> BooksResult<Payment> {
        self.unit(|tx| {
            let current = load_payment(tx.connection(), id)?;
            let amount = update.amount.map(round_money).unwrap_or(current.amount);
            let date = update.date.unwrap_or(current.date);
            if amount != current.amount || date != current.date {
                let entry_id = current.ledger_entry_id.ok_or_else(|| {
                    BooksError::InvalidState(format!("payment {id} has no ledger entry"))
                })?;
                amend_within(tx, entry_id, amount, date)?;
            }
            tx.connection().execute(
                "UPDATE payments SET amount = ?1, payment_date = ?2, method = ?3, reference_no = ?4, notes = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    amount.to_string(),
                    rows::format_date(date),
                    update.method.unwrap_or(current.method).as_str(),
                    update.reference_no.clone().unwrap_or(current.reference_no),
                    update.notes.clone().unwrap_or(current.notes),
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?;
            info!(payment_id = id, amount = %amount, date = %date, "payment updated");
            load_payment(tx.connection(), id)
        })
    }

    /// Delete a payment and void its ledger entry.
    pub fn delete_payment(&self, id: i64) -> BooksResult<Payment> {
        self.unit(|tx| {
            let payment = load_payment(tx.connection(), id)?;
            if let Some(entry_id) = payment.ledger_entry_id {
                reverse_within(tx, entry_id)?;
            }
            tx.connection()
                .execute("DELETE FROM payments WHERE id = ?1", [id])?;
            info!(payment_id = id, receipt_no = %payment.receipt_no, "payment deleted");
            Ok(payment)
        })
    }

    pub fn payment(&self, id: i64) -> BooksResult<Payment> {
        self.unit(|tx| load_payment(tx.connection(), id))
    }

    pub fn payments(
        &self,
        direction: Option<PaymentDirection>,
        party_id: Option<PartyId>,
    ) -> BooksResult<Vec<Payment>> {
        self.unit(|tx| {
            let conn = tx.connection();
            let mut stmt = conn.prepare(&format!(
                "{PAYMENT_SELECT}
                 WHERE (?1 IS NULL OR direction = ?1) AND (?2 IS NULL OR party_id = ?2)
                 ORDER BY payment_date, id"
            ))?;
            let raw = stmt
                .query_map(
                    params![direction.map(PaymentDirection::as_str), party_id.map(|id| id.0)],
                    RawPayment::from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw.into_iter().map(RawPayment::into_payment).collect()
        })
    }
}

const PAYMENT_SELECT: &str = "SELECT id, direction, party_id, amount, payment_date, method, reference_no, notes, receipt_no, ledger_entry_id, created_at, updated_at FROM payments";

fn load_payment(conn: &Connection, id: i64) -> BooksResult<Payment> {
    conn.query_row(
        &format!("{PAYMENT_SELECT} WHERE id = ?1"),
        [id],
        RawPayment::from_row,
    )
    .optional()?
    .ok_or_else(|| BooksError::NotFound(format!("payment {id}")))?
    .into_payment()
}

struct RawPayment {
    id: i64,
    direction: String,
    party_id: i64,
    amount: String,
    date: String,
    method: String,
    reference_no: Option<String>,
    notes: Option<String>,
    receipt_no: String,
    ledger_entry_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl RawPayment {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            direction: row.get(1)?,
            party_id: row.get(2)?,
            amount: row.get(3)?,
            date: row.get(4)?,
            method: row.get(5)?,
            reference_no: row.get(6)?,
            notes: row.get(7)?,
            receipt_no: row.get(8)?,
            ledger_entry_id: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_payment(self) -> BooksResult<Payment> {
        Ok(Payment {
            id: self.id,
            direction: rows::enum_value(&self.direction)?,
            party_id: PartyId(self.party_id),
            amount: rows::decimal(&self.amount)?,
            date: rows::date(&self.date)?,
            method: rows::enum_value(&self.method)?,
            reference_no: self.reference_no,
            notes: self.notes,
            receipt_no: self.receipt_no,
            ledger_entry_id: self.ledger_entry_id.map(EntryId),
            created_at: rows::timestamp(&self.created_at)?,
            updated_at: rows::timestamp(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{customer, open_books, supplier};
    use crate::BooksPolicy;
    use rust_decimal_macros::dec;
    use weft_ledger::{EntryStatus, LedgerError};

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    #[test]
    fn payment_in_reduces_customer_balance() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let asha = customer(&books, "Asha Textiles", dec!(1200));

        let payment = books
            .record_payment(
                &PaymentDraft::received(asha.id, dec!(500), day(2))
                    .with_method(PaymentMethod::BankTransfer)
                    .with_reference("UTR-99"),
            )
            .unwrap();
        assert_eq!(payment.receipt_no, "RCV-000001");
        assert_eq!(books.ledger().party(asha.id).unwrap().current_balance, dec!(700));

        let entry = books
            .ledger()
            .entry(payment.ledger_entry_id.unwrap())
            .unwrap();
        assert_eq!(entry.credit, dec!(500));
        assert_eq!(entry.reference_id, Some(payment.id));
        assert_eq!(entry.reference_no.as_deref(), Some("RCV-000001"));
    }

    #[test]
    fn payment_out_reduces_supplier_payable() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let mill = supplier(&books, "Ravi Mills", dec!(900));
        let payment = books
            .record_payment(&PaymentDraft::paid(mill.id, dec!(400), day(3)))
            .unwrap();
        assert_eq!(payment.receipt_no, "PAY-000001");
        assert_eq!(books.ledger().party(mill.id).unwrap().current_balance, dec!(500));
    }

    #[test]
    fn direction_must_match_party_kind() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let mill = supplier(&books, "Ravi Mills", dec!(900));
        let err = books
            .record_payment(&PaymentDraft::received(mill.id, dec!(100), day(3)))
            .unwrap_err();
        assert!(matches!(err, BooksError::Validation(_)));
        assert!(books.payments(None, None).unwrap().is_empty());
    }

    #[test]
    fn failed_ledger_write_leaves_no_payment_row() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let asha = customer(&books, "Asha Textiles", dec!(100));
        let err = books
            .record_payment(&PaymentDraft::received(asha.id, dec!(-5), day(2)))
            .unwrap_err();
        assert!(matches!(err, BooksError::Ledger(LedgerError::Validation(_))));
        assert!(books.payments(None, None).unwrap().is_empty());
        // the rolled-back unit does not consume a receipt number
        assert_eq!(books.peek_number(DocumentSeries::Receipt).unwrap(), "RCV-000001");
    }

    #[test]
    fn update_amends_and_delete_voids() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let asha = customer(&books, "Asha Textiles", dec!(1200));
        let payment = books
            .record_payment(&PaymentDraft::received(asha.id, dec!(500), day(2)))
            .unwrap();

        let updated = books
            .update_payment(
                payment.id,
                &PaymentUpdate {
                    amount: Some(dec!(800)),
                    notes: Some(Some("corrected".into())),
                    ..PaymentUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.amount, dec!(800));
        assert_eq!(updated.notes.as_deref(), Some("corrected"));
        assert_eq!(books.ledger().party(asha.id).unwrap().current_balance, dec!(400));
        let entry_id = updated.ledger_entry_id.unwrap();
        assert_eq!(books.ledger().entry(entry_id).unwrap().status, EntryStatus::Amended);

        books.delete_payment(payment.id).unwrap();
        assert_eq!(books.ledger().party(asha.id).unwrap().current_balance, dec!(1200));
        assert_eq!(books.ledger().entry(entry_id).unwrap().status, EntryStatus::Voided);
        assert!(matches!(
            books.payment(payment.id).unwrap_err(),
            BooksError::NotFound(_)
        ));
    }

    #[test]
    fn update_can_clear_reference_and_notes() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let asha = customer(&books, "Asha Textiles", dec!(600));
        let payment = books
            .record_payment(
                &PaymentDraft::received(asha.id, dec!(100), day(2))
                    .with_reference("CHQ-4411")
                    .with_notes("bounced once"),
            )
            .unwrap();

        let kept = books
            .update_payment(
                payment.id,
                &PaymentUpdate {
                    method: Some(PaymentMethod::Cheque),
                    ..PaymentUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(kept.reference_no.as_deref(), Some("CHQ-4411"));
        assert_eq!(kept.notes.as_deref(), Some("bounced once"));

        let cleared = books
            .update_payment(
                payment.id,
                &PaymentUpdate {
                    reference_no: Some(None),
                    notes: Some(None),
                    ..PaymentUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.reference_no, None);
        assert_eq!(cleared.notes, None);
        assert_eq!(cleared.method, PaymentMethod::Cheque);
        assert_eq!(books.ledger().party(asha.id).unwrap().current_balance, dec!(500));
    }

    #[test]
    fn payment_entry_only_changes_through_the_payment() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let asha = customer(&books, "Asha Textiles", dec!(1000));
        let payment = books
            .record_payment(&PaymentDraft::received(asha.id, dec!(300), day(2)))
            .unwrap();
        let entry_id = payment.ledger_entry_id.unwrap();

        let err = books.ledger().reverse_transaction(entry_id).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
        let err = books
            .ledger()
            .amend_transaction(entry_id, dec!(900), day(2))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
        assert_eq!(books.ledger().party(asha.id).unwrap().current_balance, dec!(700));
        assert_eq!(books.payment(payment.id).unwrap().amount, dec!(300));

        books.delete_payment(payment.id).unwrap();
        assert_eq!(books.ledger().party(asha.id).unwrap().current_balance, dec!(1000));
    }
}
