use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(ProductId)
            .map_err(|err| format!("invalid product id {s}: {err}"))
    }
}

/// Stocked article (fabric roll, yarn lot, garment) with its on-hand quantity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    /// Unit of measure, e.g. `meter`, `kg`, `piece`.
    pub unit: String,
    pub unit_price: Decimal,
    pub current_stock: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit: String,
    pub unit_price: Decimal,
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            name: name.into(),
            sku: None,
            category: None,
            unit: unit.into(),
            unit_price,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockDirection {
    In,
    Out,
}

impl StockDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            StockDirection::In => "in",
            StockDirection::Out => "out",
        }
    }

    pub fn inverse(self) -> Self {
        match self {
            StockDirection::In => StockDirection::Out,
            StockDirection::Out => StockDirection::In,
        }
    }

    /// Signed change applied to on-hand stock for `quantity`.
    pub fn signed(self, quantity: Decimal) -> Decimal {
        match self {
            StockDirection::In => quantity,
            StockDirection::Out => -quantity,
        }
    }
}

impl fmt::Display for StockDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(StockDirection::In),
            "out" => Ok(StockDirection::Out),
            other => Err(format!("unknown stock direction: {other}")),
        }
    }
}
