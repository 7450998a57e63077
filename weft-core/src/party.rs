use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable identifier of a customer or supplier.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub i64);

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(PartyId)
            .map_err(|err| format!("invalid party id {s}: {err}"))
    }
}

impl From<i64> for PartyId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Which side of the business a party sits on.
///
/// A customer balance is a receivable (positive means the customer owes the
/// business). A supplier balance is a payable (positive means the business
/// owes the supplier).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl PartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyKind::Customer => "customer",
            PartyKind::Supplier => "supplier",
        }
    }
}

impl fmt::Display for PartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(PartyKind::Customer),
            "supplier" => Ok(PartyKind::Supplier),
            other => Err(format!("unknown party kind: {other}")),
        }
    }
}

/// Customer or supplier master record with its denormalized running balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub current_balance: Decimal,
    pub is_active: bool,
    /// Incremented on every balance write; used for compare-and-swap updates.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

/// Input for the "new party" flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartyDraft {
    pub kind: PartyKind,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub opening_balance: Decimal,
    pub opening_date: NaiveDate,
}

impl PartyDraft {
    pub fn new(kind: PartyKind, name: impl Into<String>, opening_date: NaiveDate) -> Self {
        Self {
            kind,
            name: name.into(),
            phone: None,
            email: None,
            address: None,
            tax_id: None,
            opening_balance: Decimal::ZERO,
            opening_date,
        }
    }

    pub fn with_opening_balance(mut self, amount: Decimal) -> Self {
        self.opening_balance = amount;
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [PartyKind::Customer, PartyKind::Supplier] {
            assert_eq!(kind.as_str().parse::<PartyKind>().unwrap(), kind);
        }
        assert!("vendor".parse::<PartyKind>().is_err());
    }

    #[test]
    fn party_id_serializes_as_number() {
        let json = serde_json::to_string(&PartyId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
