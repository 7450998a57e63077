use std::fs;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use anyhow::Result;
use assert_cmd::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tempfile::tempdir;

fn weft(workdir: &Path) -> Command {
    let binary = assert_cmd::cargo::cargo_bin!("weft");
    let mut cmd = Command::new(binary);
    cmd.current_dir(workdir)
        .env_remove("RUST_LOG")
        .args(["--db", "books.db", "--json"]);
    cmd
}

fn run_json(workdir: &Path, args: &[&str]) -> Result<Value> {
    let output = weft(workdir).args(args).assert().success().get_output().clone();
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal encoded as string")).unwrap()
}

#[test]
fn payment_reduces_customer_balance() -> Result<()> {
    let temp = tempdir()?;
    let party = run_json(
        temp.path(),
        &[
            "party", "add", "--kind", "customer", "--name", "Asha Textiles", "--opening",
            "1200", "--date", "2024-05-01",
        ],
    )?;
    let id = party["id"].as_i64().unwrap().to_string();
    assert_eq!(decimal(&party["current_balance"]), dec!(1200));

    let payment = run_json(
        temp.path(),
        &[
            "payment", "in", "--party", &id, "--amount", "500", "--date", "2024-05-02",
            "--method", "bank_transfer",
        ],
    )?;
    assert_eq!(payment["receipt_no"], "RCV-000001");

    let party = run_json(temp.path(), &["party", "show", &id])?;
    assert_eq!(decimal(&party["current_balance"]), dec!(700));
    Ok(())
}

#[test]
fn rejected_payment_reports_rollback() -> Result<()> {
    let temp = tempdir()?;
    let party = run_json(
        temp.path(),
        &["party", "add", "--kind", "customer", "--name", "Meera Garments"],
    )?;
    let id = party["id"].as_i64().unwrap().to_string();

    let output = weft(temp.path())
        .args(["payment", "in", "--party", &id, "--amount", "-5"])
        .output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("transaction failed, no changes were made"));

    let payments = run_json(temp.path(), &["payment", "list"])?;
    assert_eq!(payments.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn payment_entry_cannot_be_reversed_from_the_ledger() -> Result<()> {
    let temp = tempdir()?;
    let party = run_json(
        temp.path(),
        &["party", "add", "--kind", "customer", "--name", "Noor Silks", "--opening", "1000"],
    )?;
    let id = party["id"].as_i64().unwrap().to_string();
    let payment = run_json(
        temp.path(),
        &["payment", "in", "--party", &id, "--amount", "300", "--reference", "UTR-7"],
    )?;
    let entry = payment["ledger_entry_id"].as_i64().unwrap().to_string();

    let output = weft(temp.path()).args(["ledger", "reverse", &entry]).output()?;
    assert!(!output.status.success());
    let party = run_json(temp.path(), &["party", "show", &id])?;
    assert_eq!(decimal(&party["current_balance"]), dec!(700));

    let payment_id = payment["id"].as_i64().unwrap().to_string();
    let edited = run_json(
        temp.path(),
        &["payment", "edit", &payment_id, "--clear-reference"],
    )?;
    assert!(edited["reference_no"].is_null());

    run_json(temp.path(), &["payment", "delete", &payment_id])?;
    let history = run_json(temp.path(), &["ledger", "history", "--party", &id])?;
    assert_eq!(history.as_array().map(Vec::len), Some(2));
    assert_eq!(history[1]["status"], "voided");
    Ok(())
}

#[test]
fn invoice_statement_exports_csv() -> Result<()> {
    let temp = tempdir()?;
    let party = run_json(
        temp.path(),
        &["party", "add", "--kind", "customer", "--name", "Kiran Fabrics"],
    )?;
    let party_id = party["id"].as_i64().unwrap().to_string();
    let product = run_json(
        temp.path(),
        &["product", "add", "--name", "Georgette", "--price", "8"],
    )?;
    let product_id = product["id"].as_i64().unwrap().to_string();
    run_json(
        temp.path(),
        &["stock", "in", "--product", &product_id, "--qty", "25", "--date", "2024-06-01"],
    )?;

    let line = format!("{product_id}:10");
    let invoice = run_json(
        temp.path(),
        &[
            "invoice", "create", "--party", &party_id, "--line", &line, "--date", "2024-06-03",
        ],
    )?;
    assert_eq!(invoice["number"], "INV-000001");
    assert_eq!(invoice["status"], "posted");
    assert_eq!(decimal(&invoice["total"]), dec!(80));

    let csv_path = temp.path().join("statement.csv");
    let statement = run_json(
        temp.path(),
        &[
            "ledger",
            "statement",
            "--party",
            &party_id,
            "--csv",
            csv_path.to_str().unwrap(),
        ],
    )?;
    assert_eq!(decimal(&statement["closing_balance"]), dec!(80));

    let csv = fs::read_to_string(&csv_path)?;
    assert!(csv.starts_with("company,Weft Textiles"));
    assert!(csv.contains("2024-06-03,invoice,INV-000001"));

    let product = run_json(temp.path(), &["product", "list"])?;
    assert_eq!(decimal(&product[0]["current_stock"]), dec!(15));
    Ok(())
}

#[test]
fn verify_and_rebuild_report_consistent_ledgers() -> Result<()> {
    let temp = tempdir()?;
    let party = run_json(
        temp.path(),
        &[
            "party", "add", "--kind", "supplier", "--name", "Ravi Mills", "--opening", "900",
        ],
    )?;
    let id = party["id"].as_i64().unwrap().to_string();
    run_json(
        temp.path(),
        &["ledger", "adjust", "--party", &id, "--amount", "-100"],
    )?;

    let reports = run_json(temp.path(), &["ledger", "verify"])?;
    assert_eq!(reports.as_array().map(Vec::len), Some(1));
    assert_eq!(decimal(&reports[0]["replayed_balance"]), dec!(800));
    assert_eq!(reports[0]["mismatches"].as_array().map(Vec::len), Some(0));

    let reports = run_json(temp.path(), &["ledger", "rebuild", "--party", &id])?;
    assert_eq!(decimal(&reports[0]["current_balance"]), dec!(800));
    Ok(())
}

#[test]
fn config_init_writes_loadable_defaults() -> Result<()> {
    let temp = tempdir()?;
    weft(temp.path())
        .args(["config", "init"])
        .assert()
        .success();
    let written = fs::read_to_string(temp.path().join("config/default.toml"))?;
    assert!(written.contains("[ledger]"));

    weft(temp.path())
        .args(["config", "init"])
        .assert()
        .failure();

    let shown = run_json(temp.path(), &["config", "show"])?;
    assert_eq!(shown["ledger"]["max_retries"], 5);
    assert_eq!(shown["database"]["path"], "books.db");
    Ok(())
}
