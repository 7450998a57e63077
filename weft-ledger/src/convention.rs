use rust_decimal::Decimal;
use weft_core::PartyKind;

use crate::{LedgerError, LedgerResult, TransactionType};

/// Which ledger column grows a party's balance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignConvention {
    /// Receivables: debits increase the balance, credits decrease it.
    DebitIncreases,
    /// Payables: credits increase the balance, debits decrease it.
    CreditIncreases,
}

impl SignConvention {
    pub fn for_party(kind: PartyKind) -> Self {
        match kind {
            PartyKind::Customer => SignConvention::DebitIncreases,
            PartyKind::Supplier => SignConvention::CreditIncreases,
        }
    }

    /// Net change applied to the running balance by a debit/credit pair.
    pub fn signed_delta(self, debit: Decimal, credit: Decimal) -> Decimal {
        match self {
            SignConvention::DebitIncreases => debit - credit,
            SignConvention::CreditIncreases => credit - debit,
        }
    }

    /// Split a signed balance change into its debit/credit columns.
    pub fn split(self, signed: Decimal) -> Posting {
        let magnitude = signed.abs();
        let increases = signed.is_sign_positive();
        match (self, increases) {
            (SignConvention::DebitIncreases, true) | (SignConvention::CreditIncreases, false) => {
                Posting::debit(magnitude)
            }
            (SignConvention::DebitIncreases, false) | (SignConvention::CreditIncreases, true) => {
                Posting::credit(magnitude)
            }
        }
    }
}

/// Debit/credit columns of a simple entry. At most one side is nonzero.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Posting {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl Posting {
    pub fn debit(amount: Decimal) -> Self {
        Self {
            debit: amount,
            credit: Decimal::ZERO,
        }
    }

    pub fn credit(amount: Decimal) -> Self {
        Self {
            debit: Decimal::ZERO,
            credit: amount,
        }
    }

    /// Derive the posting for `amount` of `transaction_type` against a party of `kind`.
    ///
    /// Invoices, purchases and payments take a strictly positive amount and the
    /// direction comes from the type. Opening balances and adjustments take a
    /// nonzero signed amount: positive grows the balance, negative shrinks it.
    pub fn for_transaction(
        kind: PartyKind,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> LedgerResult<Self> {
        let signed = match (kind, transaction_type) {
            (_, TransactionType::Opening) | (_, TransactionType::Adjustment) => {
                if amount.is_zero() {
                    return Err(LedgerError::Validation(format!(
                        "{transaction_type} amount must be nonzero"
                    )));
                }
                amount
            }
            (PartyKind::Customer, TransactionType::Invoice)
            | (PartyKind::Supplier, TransactionType::Purchase) => {
                require_positive(transaction_type, amount)?
            }
            (_, TransactionType::Payment) => -require_positive(transaction_type, amount)?,
            (PartyKind::Customer, TransactionType::Purchase)
            | (PartyKind::Supplier, TransactionType::Invoice) => {
                return Err(LedgerError::Validation(format!(
                    "{transaction_type} entries cannot be posted to a {kind}"
                )));
            }
        };
        Ok(SignConvention::for_party(kind).split(signed))
    }

    pub fn signed_delta(&self, kind: PartyKind) -> Decimal {
        SignConvention::for_party(kind).signed_delta(self.debit, self.credit)
    }
}

fn require_positive(transaction_type: TransactionType, amount: Decimal) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "{transaction_type} amount must be positive, got {amount}"
        )));
    }
    Ok(amount)
}
