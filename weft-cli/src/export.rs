//! Statement rendering for the terminal and CSV export.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use weft_config::CompanySettings;
use weft_ledger::Statement;

const COLUMNS: [&str; 7] = [
    "date",
    "type",
    "reference",
    "description",
    "debit",
    "credit",
    "balance",
];

/// Write `statement` as CSV: a letterhead block, a blank line, then one row
/// per entry followed by a totals row.
pub fn write_statement_csv(
    path: &Path,
    company: &CompanySettings,
    statement: &Statement,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_statement_records(&mut writer, company, statement)?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn write_statement_records<W: Write>(
    writer: &mut csv::Writer<W>,
    company: &CompanySettings,
    statement: &Statement,
) -> Result<()> {
    writer.write_record(["company", company.name.as_str()])?;
    if let Some(address) = &company.address {
        writer.write_record(["address", address.as_str()])?;
    }
    if let Some(phone) = &company.phone {
        writer.write_record(["phone", phone.as_str()])?;
    }
    writer.write_record(["party", statement.party.name.as_str()])?;
    writer.write_record(["party_kind", statement.party.kind.as_str()])?;
    writer.write_record(["from", optional_date(statement.from).as_str()])?;
    writer.write_record(["to", optional_date(statement.to).as_str()])?;
    writer.write_record(["currency", company.currency_symbol.as_str()])?;
    writer.write_record(["opening_balance", statement.opening_balance.to_string().as_str()])?;
    writer.write_record([""])?;

    writer.write_record(COLUMNS)?;
    for entry in &statement.entries {
        writer.write_record([
            entry.transaction_date.to_string(),
            entry.transaction_type.to_string(),
            entry.reference_no.clone().unwrap_or_default(),
            entry.description.clone(),
            amount_cell(entry.debit),
            amount_cell(entry.credit),
            entry.balance.to_string(),
        ])?;
    }
    writer.write_record([
        String::new(),
        "total".to_string(),
        String::new(),
        String::new(),
        statement.total_debit.to_string(),
        statement.total_credit.to_string(),
        statement.closing_balance.to_string(),
    ])?;
    Ok(())
}

/// Render `statement` as a fixed-width table for the terminal.
pub fn render_statement(company: &CompanySettings, statement: &Statement) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", company.name));
    if let Some(address) = &company.address {
        out.push_str(&format!("{address}\n"));
    }
    out.push_str(&format!(
        "Statement for {} ({}) {} to {}\n",
        statement.party.name,
        statement.party.kind,
        date_or(statement.from, "start"),
        date_or(statement.to, "today"),
    ));
    out.push_str(&format!(
        "{:<10}  {:<10}  {:<12}  {:<32}  {:>12}  {:>12}  {:>12}\n",
        "Date", "Type", "Reference", "Description", "Debit", "Credit", "Balance"
    ));
    out.push_str(&format!(
        "{:<10}  {:<10}  {:<12}  {:<32}  {:>12}  {:>12}  {:>12}\n",
        "", "opening", "", "", "", "", statement.opening_balance
    ));
    if statement.is_empty() {
        out.push_str("  no entries in this period\n");
    }
    for entry in &statement.entries {
        out.push_str(&format!(
            "{:<10}  {:<10}  {:<12}  {:<32}  {:>12}  {:>12}  {:>12}\n",
            entry.transaction_date,
            entry.transaction_type.as_str(),
            entry.reference_no.as_deref().unwrap_or("-"),
            truncate(&entry.description, 32),
            amount_cell(entry.debit),
            amount_cell(entry.credit),
            entry.balance
        ));
    }
    out.push_str(&format!(
        "{:<10}  {:<10}  {:<12}  {:<32}  {:>12}  {:>12}  {:>12}\n",
        "",
        "closing",
        "",
        "",
        statement.total_debit,
        statement.total_credit,
        format!("{}{}", company.currency_symbol, statement.closing_balance)
    ));
    out
}

fn amount_cell(value: Decimal) -> String {
    if value.is_zero() {
        String::new()
    } else {
        value.to_string()
    }
}

fn optional_date(date: Option<chrono::NaiveDate>) -> String {
    date.map(|date| date.to_string()).unwrap_or_default()
}

fn date_or(date: Option<chrono::NaiveDate>, fallback: &str) -> String {
    date.map(|date| date.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use weft_core::{Party, PartyId, PartyKind};
    use weft_ledger::{EntryId, EntryStatus, LedgerEntry, TransactionType};

    fn statement() -> Statement {
        let party = Party {
            id: PartyId(1),
            kind: PartyKind::Customer,
            name: "Asha Textiles".into(),
            phone: None,
            email: None,
            address: None,
            tax_id: None,
            current_balance: dec!(700),
            is_active: true,
            version: 2,
            created_at: Utc::now(),
        };
        let entry = |id: i64, debit: Decimal, credit: Decimal, balance: Decimal| LedgerEntry {
            id: EntryId(id),
            party_id: PartyId(1),
            transaction_type: if debit > Decimal::ZERO {
                TransactionType::Invoice
            } else {
                TransactionType::Payment
            },
            transaction_date: NaiveDate::from_ymd_opt(2024, 7, id as u32).unwrap(),
            reference_no: Some(format!("REF-{id}")),
            reference_id: None,
            debit,
            credit,
            balance,
            description: "entry".into(),
            status: EntryStatus::Committed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        Statement::from_history(
            party,
            vec![
                entry(1, dec!(1200), Decimal::ZERO, dec!(1200)),
                entry(2, Decimal::ZERO, dec!(500), dec!(700)),
            ],
            None,
            None,
        )
    }

    #[test]
    fn csv_carries_letterhead_rows_and_totals() {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(vec![]);
        let company = CompanySettings {
            phone: Some("+91 22 5550 1234".into()),
            ..CompanySettings::default()
        };
        write_statement_records(&mut writer, &company, &statement()).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "company,Weft Textiles");
        assert_eq!(lines[1], "phone,+91 22 5550 1234");
        assert!(lines.contains(&"date,type,reference,description,debit,credit,balance"));
        assert!(lines.contains(&"2024-07-02,payment,REF-2,entry,,500,700"));
        assert_eq!(lines.last().copied(), Some(",total,,,1200,500,700"));
    }

    #[test]
    fn table_shows_closing_balance_with_currency() {
        let rendered = render_statement(&CompanySettings::default(), &statement());
        assert!(rendered.starts_with("Weft Textiles\n"));
        assert!(rendered.contains("Rs.700"));
        assert!(rendered.contains("REF-1"));
        assert!(!rendered.contains("no entries"));

        let mut quiet = statement();
        quiet.entries.clear();
        let rendered = render_statement(&CompanySettings::default(), &quiet);
        assert!(rendered.contains("no entries in this period"));
    }

    #[test]
    fn long_descriptions_are_cut() {
        assert_eq!(truncate("abcdef", 4), "abc~");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
