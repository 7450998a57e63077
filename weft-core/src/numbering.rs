use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numbered document series issued by the books.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSeries {
    Receipt,
    PaymentVoucher,
    SalesInvoice,
    PurchaseOrder,
}

impl DocumentSeries {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentSeries::Receipt => "receipt",
            DocumentSeries::PaymentVoucher => "payment_voucher",
            DocumentSeries::SalesInvoice => "sales_invoice",
            DocumentSeries::PurchaseOrder => "purchase_order",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            DocumentSeries::Receipt => "RCV",
            DocumentSeries::PaymentVoucher => "PAY",
            DocumentSeries::SalesInvoice => "INV",
            DocumentSeries::PurchaseOrder => "PO",
        }
    }

    /// Render the human facing number, e.g. `INV-000042`.
    pub fn format(self, sequence: u64) -> String {
        format!("{}-{sequence:06}", self.prefix())
    }
}

impl fmt::Display for DocumentSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentSeries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(DocumentSeries::Receipt),
            "payment_voucher" => Ok(DocumentSeries::PaymentVoucher),
            "sales_invoice" => Ok(DocumentSeries::SalesInvoice),
            "purchase_order" => Ok(DocumentSeries::PurchaseOrder),
            other => Err(format!("unknown document series: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded_numbers() {
        assert_eq!(DocumentSeries::SalesInvoice.format(42), "INV-000042");
        assert_eq!(DocumentSeries::PurchaseOrder.format(1), "PO-000001");
    }
}
