use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits kept for currency amounts.
pub const MONEY_SCALE: u32 = 2;

/// Parse a user supplied amount, rejecting anything that is not a finite decimal.
pub fn parse_amount(input: &str) -> Result<Decimal, String> {
    let trimmed = input.trim().replace(',', "");
    if trimmed.is_empty() {
        return Err("amount is required".to_string());
    }
    Decimal::from_str(&trimmed)
        .or_else(|_| Decimal::from_scientific(&trimmed))
        .map_err(|_| format!("invalid amount: {input}"))
}

/// Round to the currency scale, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grouped_amounts() {
        assert_eq!(parse_amount("1,250.50").unwrap(), Decimal::new(125050, 2));
        assert_eq!(parse_amount(" -5 ").unwrap(), Decimal::new(-5, 0));
    }

    #[test]
    fn rejects_non_numeric_input() {
        assert!(parse_amount("NaN").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("12abc").is_err());
    }

    #[test]
    fn rejects_non_finite_spellings() {
        assert!(parse_amount("inf").is_err());
        assert!(parse_amount("-infinity").is_err());
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(10005, 3)), Decimal::new(1001, 2));
        assert_eq!(round_money(Decimal::new(-10005, 3)), Decimal::new(-1001, 2));
    }
}
