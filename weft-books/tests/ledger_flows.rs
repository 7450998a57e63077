use std::thread;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::tempdir;
use weft_books::{
    Books, BooksError, BooksPolicy, LineDraft, PaymentDraft, PaymentUpdate, StockRequest,
    TradeDraft,
};
use weft_core::{PartyDraft, PartyKind, ProductDraft};
use weft_ledger::{EntryStatus, LedgerError, LedgerPolicy, TransactionType};

fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

#[test]
fn customer_account_lifecycle_ends_settled() {
    let dir = tempdir().unwrap();
    let books = Books::open(
        dir.path().join("weft.db"),
        LedgerPolicy::default(),
        BooksPolicy::default(),
    )
    .unwrap();

    let customer = books
        .ledger()
        .create_party(
            &PartyDraft::new(PartyKind::Customer, "Meera Garments", day(1, 1))
                .with_opening_balance(dec!(-200)),
        )
        .unwrap();
    assert_eq!(customer.current_balance, dec!(-200));

    let chiffon = books
        .add_product(&ProductDraft::new("Chiffon", "m", dec!(6)))
        .unwrap();
    books
        .stock_in(&StockRequest::new(chiffon.id, dec!(100), day(1, 2)))
        .unwrap();

    let invoice = books
        .create_document(
            &TradeDraft::sales_invoice(customer.id, day(1, 5))
                .line(LineDraft::new(chiffon.id, dec!(50))),
            true,
        )
        .unwrap();
    assert_eq!(invoice.total, dec!(300));
    assert_eq!(
        books.ledger().party(customer.id).unwrap().current_balance,
        dec!(100)
    );

    let payment = books
        .record_payment(&PaymentDraft::received(customer.id, dec!(50), day(1, 9)))
        .unwrap();
    books
        .update_payment(
            payment.id,
            &PaymentUpdate {
                amount: Some(dec!(100)),
                ..PaymentUpdate::default()
            },
        )
        .unwrap();

    let statement = books
        .ledger()
        .reconstruct_statement(customer.id, None, None)
        .unwrap();
    let kinds: Vec<_> = statement
        .entries
        .iter()
        .map(|entry| entry.transaction_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TransactionType::Opening,
            TransactionType::Invoice,
            TransactionType::Payment
        ]
    );
    let balances: Vec<_> = statement.entries.iter().map(|entry| entry.balance).collect();
    assert_eq!(balances, vec![dec!(-200), dec!(100), Decimal::ZERO]);
    assert_eq!(statement.closing_balance, Decimal::ZERO);
    assert_eq!(
        books.ledger().party(customer.id).unwrap().current_balance,
        Decimal::ZERO
    );
    assert!(books.ledger().verify_party(customer.id).unwrap().is_consistent());
}

#[test]
fn cancelled_purchase_drops_out_of_statement() {
    let dir = tempdir().unwrap();
    let books = Books::open(
        dir.path().join("weft.db"),
        LedgerPolicy::default(),
        BooksPolicy::default(),
    )
    .unwrap();
    let mill = books
        .ledger()
        .create_party(&PartyDraft::new(PartyKind::Supplier, "Ravi Mills", day(2, 1)))
        .unwrap();
    let yarn = books
        .add_product(&ProductDraft::new("Yarn", "kg", dec!(3)))
        .unwrap();

    let first = books
        .create_document(
            &TradeDraft::purchase_order(mill.id, day(2, 3)).line(LineDraft::new(yarn.id, dec!(100))),
            true,
        )
        .unwrap();
    let second = books
        .create_document(
            &TradeDraft::purchase_order(mill.id, day(2, 8)).line(LineDraft::new(yarn.id, dec!(40))),
            true,
        )
        .unwrap();
    books
        .record_payment(&PaymentDraft::paid(mill.id, dec!(200), day(2, 10)))
        .unwrap();
    assert_eq!(books.ledger().party(mill.id).unwrap().current_balance, dec!(220));

    books.cancel_document(first.id).unwrap();
    assert_eq!(books.ledger().party(mill.id).unwrap().current_balance, dec!(-80));
    assert_eq!(books.product(yarn.id).unwrap().current_stock, dec!(40));

    let statement = books
        .ledger()
        .reconstruct_statement(mill.id, None, None)
        .unwrap();
    assert_eq!(statement.entries.len(), 2);
    assert_eq!(statement.entries[0].reference_no, Some(second.number.clone()));
    assert_eq!(statement.entries[0].balance, dec!(120));
    assert_eq!(statement.entries[1].balance, dec!(-80));
    assert!(statement
        .entries
        .iter()
        .all(|entry| entry.status != EntryStatus::Voided));
}

#[test]
fn concurrent_payments_from_separate_handles_all_land() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weft.db");
    let books = Books::open(&path, LedgerPolicy::default(), BooksPolicy::default()).unwrap();
    let customer = books
        .ledger()
        .create_party(
            &PartyDraft::new(PartyKind::Customer, "Kiran Fabrics", day(3, 1))
                .with_opening_balance(dec!(1000)),
        )
        .unwrap();

    let customer_id = customer.id;
    thread::scope(|scope| {
        for worker in 0..4 {
            let path = path.clone();
            scope.spawn(move || {
                let books =
                    Books::open(&path, LedgerPolicy::default(), BooksPolicy::default()).unwrap();
                for n in 0..5 {
                    books
                        .record_payment(&PaymentDraft::received(
                            customer_id,
                            dec!(10),
                            day(3, 2 + worker + n),
                        ))
                        .unwrap();
                }
            });
        }
    });

    let party = books.ledger().party(customer.id).unwrap();
    assert_eq!(party.current_balance, dec!(800));
    let payments = books.payments(None, Some(customer.id)).unwrap();
    assert_eq!(payments.len(), 20);
    let mut numbers: Vec<_> = payments.iter().map(|p| p.receipt_no.clone()).collect();
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 20);
    assert!(books.ledger().verify_party(customer.id).unwrap().is_consistent());
}

#[test]
fn inactive_party_rejects_new_documents_but_allows_reversal() {
    let dir = tempdir().unwrap();
    let books = Books::open(
        dir.path().join("weft.db"),
        LedgerPolicy::default(),
        BooksPolicy::default(),
    )
    .unwrap();
    let customer = books
        .ledger()
        .create_party(&PartyDraft::new(PartyKind::Customer, "Old Account", day(4, 1)))
        .unwrap();
    let payment = books
        .record_payment(&PaymentDraft::received(customer.id, dec!(75), day(4, 2)))
        .unwrap();
    books.ledger().set_party_active(customer.id, false).unwrap();

    let err = books
        .record_payment(&PaymentDraft::received(customer.id, dec!(10), day(4, 3)))
        .unwrap_err();
    assert!(matches!(err, BooksError::Ledger(LedgerError::NotFound(_))));

    books.delete_payment(payment.id).unwrap();
    assert_eq!(
        books.ledger().party(customer.id).unwrap().current_balance,
        Decimal::ZERO
    );
}
