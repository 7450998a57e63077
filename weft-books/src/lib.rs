//! Transaction recorders for Weft.
//!
//! Payments, sales invoices, purchase orders and stock movements persist
//! their own rows and post to the party ledger inside one SQLite
//! transaction, so a failed ledger write leaves no trace of the document.

mod books;
mod error;
mod payments;
mod rows;
mod schema;
mod stock;
mod trade;

pub use books::{Books, BooksPolicy};
pub use error::{BooksError, BooksResult};
pub use payments::{Payment, PaymentDraft, PaymentUpdate};
pub use stock::{StockMovement, StockRequest};
pub use trade::{
    DocumentStatus, LineDraft, TradeDocument, TradeDraft, TradeKind, TradeLine, TradeRevision,
};

#[cfg(test)]
mod testing {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::TempDir;
    use weft_core::{Party, PartyDraft, PartyKind, Product, ProductDraft};
    use weft_ledger::LedgerPolicy;

    use crate::{Books, BooksPolicy, StockRequest};

    pub fn open_books(policy: BooksPolicy) -> (TempDir, Books) {
        let dir = tempfile::tempdir().unwrap();
        let books = Books::open(dir.path().join("books.db"), LedgerPolicy::default(), policy).unwrap();
        (dir, books)
    }

    fn opening_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    pub fn customer(books: &Books, name: &str, opening: Decimal) -> Party {
        let draft = PartyDraft::new(PartyKind::Customer, name, opening_date())
            .with_opening_balance(opening);
        books.ledger().create_party(&draft).unwrap()
    }

    pub fn supplier(books: &Books, name: &str, opening: Decimal) -> Party {
        let draft = PartyDraft::new(PartyKind::Supplier, name, opening_date())
            .with_opening_balance(opening);
        books.ledger().create_party(&draft).unwrap()
    }

    pub fn stocked_product(books: &Books, name: &str, price: Decimal, stock: Decimal) -> Product {
        let product = books
            .add_product(&ProductDraft::new(name, "m", price))
            .unwrap();
        if stock > Decimal::ZERO {
            books
                .stock_in(&StockRequest::new(product.id, stock, opening_date()))
                .unwrap();
        }
        books.product(product.id).unwrap()
    }
}
