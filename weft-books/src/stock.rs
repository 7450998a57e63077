//! Products and stock movements.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use weft_core::{round_money, Product, ProductDraft, ProductId, StockDirection};

use crate::rows;
use crate::{Books, BooksError, BooksPolicy, BooksResult};

/// A manual stock adjustment.
#[derive(Clone, Debug)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub date: NaiveDate,
    pub reason: Option<String>,
}

impl StockRequest {
    pub fn new(product_id: ProductId, quantity: Decimal, date: NaiveDate) -> Self {
        Self {
            product_id,
            quantity,
            date,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: ProductId,
    pub direction: StockDirection,
    pub quantity: Decimal,
    pub date: NaiveDate,
    pub reason: Option<String>,
    /// Trade document that caused the movement, if any.
    pub document_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Books {
    pub fn add_product(&self, draft: &ProductDraft) -> BooksResult<Product> {
        if draft.name.trim().is_empty() {
            return Err(BooksError::Validation("product name is required".into()));
        }
        if draft.unit.trim().is_empty() {
            return Err(BooksError::Validation("product unit is required".into()));
        }
        if draft.unit_price.is_sign_negative() {
            return Err(BooksError::Validation(format!(
                "unit price must not be negative, got {}",
                draft.unit_price
            )));
        }
        self.unit(|tx| {
            let conn = tx.connection();
            conn.execute(
                "INSERT INTO products (name, sku, category, unit, unit_price, current_stock, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                params![
                    draft.name.trim(),
                    draft.sku,
                    draft.category,
                    draft.unit,
                    round_money(draft.unit_price).to_string(),
                    Decimal::ZERO.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            let product = load_product(conn, ProductId(conn.last_insert_rowid()))?;
            info!(product_id = %product.id, name = %product.name, "product added");
            Ok(product)
        })
    }

    pub fn product(&self, id: ProductId) -> BooksResult<Product> {
        self.unit(|tx| load_product(tx.connection(), id))
    }

    pub fn products(&self) -> BooksResult<Vec<Product>> {
        self.unit(|tx| {
            let conn = tx.connection();
            let mut stmt = conn.prepare(&format!("{PRODUCT_SELECT} ORDER BY name, id"))?;
            let raw = stmt
                .query_map([], RawProduct::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw.into_iter().map(RawProduct::into_product).collect()
        })
    }

    pub fn stock_in(&self, request: &StockRequest) -> BooksResult<Product> {
        self.move_stock(StockDirection::In, request)
    }

    pub fn stock_out(&self, request: &StockRequest) -> BooksResult<Product> {
        self.move_stock(StockDirection::Out, request)
    }

    fn move_stock(&self, direction: StockDirection, request: &StockRequest) -> BooksResult<Product> {
        let policy = *self.policy();
        self.unit(|tx| {
            apply_stock(
                tx.connection(),
                &policy,
                &StockChange {
                    product_id: request.product_id,
                    direction,
                    quantity: request.quantity,
                    date: request.date,
                    reason: request.reason.clone(),
                    document_id: None,
                },
            )
        })
    }

    pub fn stock_movements(&self, product_id: ProductId) -> BooksResult<Vec<StockMovement>> {
        self.unit(|tx| {
            let conn = tx.connection();
            load_product(conn, product_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, product_id, direction, quantity, movement_date, reason, document_id, created_at
                 FROM stock_movements WHERE product_id = ?1 ORDER BY movement_date, id",
            )?;
            let raw = stmt
                .query_map([product_id.0], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw.into_iter()
                .map(
                    |(id, product_id, direction, quantity, date, reason, document_id, created_at)|
                     -> BooksResult<StockMovement> {
                        Ok(StockMovement {
                            id,
                            product_id: ProductId(product_id),
                            direction: rows::enum_value(&direction)?,
                            quantity: rows::decimal(&quantity)?,
                            date: rows::date(&date)?,
                            reason,
                            document_id,
                            created_at: rows::timestamp(&created_at)?,
                        })
                    },
                )
                .collect()
        })
    }
}

pub(crate) struct StockChange {
    pub product_id: ProductId,
    pub direction: StockDirection,
    pub quantity: Decimal,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub document_id: Option<i64>,
}

/// Move stock for one product and log the movement. Fails without writing
/// when the quantity is not positive or the move would leave negative stock
/// and the policy forbids it.
pub(crate) fn apply_stock(
    conn: &Connection,
    policy: &BooksPolicy,
    change: &StockChange,
) -> BooksResult<Product> {
    if change.quantity <= Decimal::ZERO {
        return Err(BooksError::Validation(format!(
            "stock quantity must be positive, got {}",
            change.quantity
        )));
    }
    let product = load_product(conn, change.product_id)?;
    let stock = rows::checked_sum(
        product.current_stock,
        change.direction.signed(change.quantity),
        "stock level",
    )?;
    if stock < Decimal::ZERO && !policy.allow_negative_stock {
        return Err(BooksError::Validation(format!(
            "insufficient stock for {}: {} on hand, {} requested",
            product.name, product.current_stock, change.quantity
        )));
    }
    conn.execute(
        "UPDATE products SET current_stock = ?1 WHERE id = ?2",
        params![stock.to_string(), product.id.0],
    )?;
    conn.execute(
        "INSERT INTO stock_movements (product_id, direction, quantity, movement_date, reason, document_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            product.id.0,
            change.direction.as_str(),
            change.quantity.to_string(),
            rows::format_date(change.date),
            change.reason,
            change.document_id,
            Utc::now().to_rfc3339(),
        ],
    )?;
    info!(
        product_id = %product.id,
        direction = %change.direction,
        quantity = %change.quantity,
        stock = %stock,
        "stock moved"
    );
    Ok(Product {
        current_stock: stock,
        ..product
    })
}

const PRODUCT_SELECT: &str = "SELECT id, name, sku, category, unit, unit_price, current_stock, is_active, created_at FROM products";

pub(crate) fn load_product(conn: &Connection, id: ProductId) -> BooksResult<Product> {
    conn.query_row(
        &format!("{PRODUCT_SELECT} WHERE id = ?1"),
        [id.0],
        RawProduct::from_row,
    )
    .optional()?
    .ok_or_else(|| BooksError::NotFound(format!("product {id}")))?
    .into_product()
}

struct RawProduct {
    id: i64,
    name: String,
    sku: Option<String>,
    category: Option<String>,
    unit: String,
    unit_price: String,
    current_stock: String,
    is_active: bool,
    created_at: String,
}

impl RawProduct {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            sku: row.get(2)?,
            category: row.get(3)?,
            unit: row.get(4)?,
            unit_price: row.get(5)?,
            current_stock: row.get(6)?,
            is_active: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_product(self) -> BooksResult<Product> {
        Ok(Product {
            id: ProductId(self.id),
            name: self.name,
            sku: self.sku,
            category: self.category,
            unit: self.unit,
            unit_price: rows::decimal(&self.unit_price)?,
            current_stock: rows::decimal(&self.current_stock)?,
            is_active: self.is_active,
            created_at: rows::timestamp(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::open_books;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn stock_in_and_out_update_current_stock() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let cotton = books
            .add_product(&ProductDraft::new("Cotton lawn", "m", dec!(4.50)).with_sku("CL-01"))
            .unwrap();
        assert_eq!(cotton.current_stock, Decimal::ZERO);

        books
            .stock_in(&StockRequest::new(cotton.id, dec!(120), date()))
            .unwrap();
        let after = books
            .stock_out(&StockRequest::new(cotton.id, dec!(20.5), date()).with_reason("sample cut"))
            .unwrap();
        assert_eq!(after.current_stock, dec!(99.5));
        assert_eq!(books.product(cotton.id).unwrap().current_stock, dec!(99.5));

        let movements = books.stock_movements(cotton.id).unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[1].direction, StockDirection::Out);
        assert_eq!(movements[1].reason.as_deref(), Some("sample cut"));
    }

    #[test]
    fn stock_out_beyond_stock_is_rejected() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let silk = books
            .add_product(&ProductDraft::new("Silk", "m", dec!(12)))
            .unwrap();
        books
            .stock_in(&StockRequest::new(silk.id, dec!(5), date()))
            .unwrap();
        let err = books
            .stock_out(&StockRequest::new(silk.id, dec!(6), date()))
            .unwrap_err();
        assert!(matches!(err, BooksError::Validation(_)));
        assert_eq!(books.product(silk.id).unwrap().current_stock, dec!(5));
        assert_eq!(books.stock_movements(silk.id).unwrap().len(), 1);
    }

    #[test]
    fn negative_stock_allowed_by_policy() {
        let (_dir, books) = open_books(BooksPolicy {
            allow_negative_stock: true,
        });
        let linen = books
            .add_product(&ProductDraft::new("Linen", "m", dec!(9)))
            .unwrap();
        let after = books
            .stock_out(&StockRequest::new(linen.id, dec!(3), date()))
            .unwrap();
        assert_eq!(after.current_stock, dec!(-3));
    }

    #[test]
    fn quantity_must_be_positive() {
        let (_dir, books) = open_books(BooksPolicy::default());
        let wool = books
            .add_product(&ProductDraft::new("Wool", "kg", dec!(20)))
            .unwrap();
        let err = books
            .stock_in(&StockRequest::new(wool.id, Decimal::ZERO, date()))
            .unwrap_err();
        assert!(matches!(err, BooksError::Validation(_)));
        let err = books
            .stock_in(&StockRequest::new(ProductId(404), dec!(1), date()))
            .unwrap_err();
        assert!(matches!(err, BooksError::NotFound(_)));
    }
}
