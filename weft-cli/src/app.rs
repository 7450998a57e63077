use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use weft_books::{
    Books, BooksPolicy, LineDraft, Payment, PaymentDraft, PaymentUpdate, StockMovement,
    StockRequest, TradeDocument, TradeDraft, TradeKind, TradeRevision,
};
use weft_config::{load_from, Settings};
use weft_core::{
    parse_amount, Party, PartyDraft, PartyId, PartyKind, PaymentDirection, PaymentMethod,
    Product, ProductDraft, ProductId,
};
use weft_ledger::{
    EntryId, LedgerEntry, LedgerPolicy, RecordRequest, ReplayReport, RetryPolicy,
    TransactionType,
};

use crate::export;
use crate::telemetry;

const TX_FAILED: &str = "transaction failed, no changes were made";

#[derive(Parser)]
#[command(author, version, about = "Weft textile books and party ledger")]
pub struct Cli {
    /// Extra configuration file layered over config/{env}.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Configuration environment to load from ./config
    #[arg(long, default_value = "default", global = true)]
    env: String,
    /// Database file, overriding database.path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or create configuration files
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Customers and suppliers
    #[command(subcommand)]
    Party(PartyCommand),
    /// Product catalogue
    #[command(subcommand)]
    Product(ProductCommand),
    /// Manual stock movements
    #[command(subcommand)]
    Stock(StockCommand),
    /// Payments received and paid
    #[command(subcommand)]
    Payment(PaymentCommand),
    /// Sales invoices
    #[command(subcommand)]
    Invoice(DocumentCommand),
    /// Purchase orders
    #[command(subcommand)]
    Purchase(DocumentCommand),
    /// Party ledger maintenance and statements
    #[command(subcommand)]
    Ledger(LedgerCommand),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write a configuration file with every default filled in
    Init {
        #[arg(long, default_value = "config/default.toml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
pub enum PartyCommand {
    Add(PartyAddArgs),
    List {
        #[arg(long)]
        kind: Option<PartyKind>,
    },
    Show {
        id: PartyId,
    },
    Activate {
        id: PartyId,
    },
    Deactivate {
        id: PartyId,
    },
}

#[derive(Args)]
pub struct PartyAddArgs {
    /// customer or supplier
    #[arg(long)]
    kind: PartyKind,
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    tax_id: Option<String>,
    /// Signed opening balance; negative means an advance
    #[arg(long, value_parser = parse_amount, allow_hyphen_values = true, default_value = "0")]
    opening: Decimal,
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Subcommand)]
pub enum ProductCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "m")]
        unit: String,
        #[arg(long, value_parser = parse_amount)]
        price: Decimal,
        #[arg(long)]
        sku: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    List,
    /// Stock movement history of one product
    Movements {
        id: ProductId,
    },
}

#[derive(Subcommand)]
pub enum StockCommand {
    In(StockArgs),
    Out(StockArgs),
}

#[derive(Args)]
pub struct StockArgs {
    #[arg(long)]
    product: ProductId,
    #[arg(long, value_parser = parse_amount, allow_hyphen_values = true)]
    qty: Decimal,
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    reason: Option<String>,
}

#[derive(Subcommand)]
pub enum PaymentCommand {
    /// Record a payment received from a customer
    In(PaymentArgs),
    /// Record a payment made to a supplier
    Out(PaymentArgs),
    Edit {
        id: i64,
        #[arg(long, value_parser = parse_amount, allow_hyphen_values = true)]
        amount: Option<Decimal>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        method: Option<PaymentMethod>,
        #[arg(long, conflicts_with = "clear_reference")]
        reference: Option<String>,
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        /// Remove the stored reference number
        #[arg(long)]
        clear_reference: bool,
        /// Remove the stored notes
        #[arg(long)]
        clear_notes: bool,
    },
    Delete {
        id: i64,
    },
    List {
        #[arg(long)]
        party: Option<PartyId>,
    },
}

#[derive(Args)]
pub struct PaymentArgs {
    #[arg(long)]
    party: PartyId,
    #[arg(long, value_parser = parse_amount, allow_hyphen_values = true)]
    amount: Decimal,
    #[arg(long)]
    date: Option<NaiveDate>,
    /// cash, bank_transfer, cheque, card or other
    #[arg(long, default_value = "cash")]
    method: PaymentMethod,
    #[arg(long)]
    reference: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Subcommand)]
pub enum DocumentCommand {
    Create {
        #[arg(long)]
        party: PartyId,
        /// PRODUCT:QTY or PRODUCT:QTY:PRICE, repeatable
        #[arg(long = "line", required = true, value_parser = parse_line)]
        lines: Vec<LineDraft>,
        #[arg(long, value_parser = parse_amount, default_value = "0")]
        discount: Decimal,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
        /// Keep the document as a draft instead of posting it to the account
        #[arg(long)]
        draft: bool,
    },
    Post {
        id: i64,
    },
    Edit {
        id: i64,
        #[arg(long = "line", value_parser = parse_line)]
        lines: Vec<LineDraft>,
        #[arg(long, value_parser = parse_amount)]
        discount: Option<Decimal>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Cancel {
        id: i64,
    },
    Show {
        id: i64,
    },
    List {
        #[arg(long)]
        party: Option<PartyId>,
    },
    /// Number the next document will receive
    Next,
}

#[derive(Subcommand)]
pub enum LedgerCommand {
    /// Post a signed balance adjustment
    Adjust {
        #[arg(long)]
        party: PartyId,
        #[arg(long, value_parser = parse_amount, allow_hyphen_values = true)]
        amount: Decimal,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Change the amount or date of an opening or adjustment entry
    Amend {
        entry: EntryId,
        #[arg(long, value_parser = parse_amount, allow_hyphen_values = true)]
        amount: Decimal,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Void an opening or adjustment entry
    Reverse {
        entry: EntryId,
    },
    /// Every entry of a party, voided ones included
    History {
        #[arg(long)]
        party: PartyId,
    },
    Statement {
        #[arg(long)]
        party: PartyId,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Also export the statement to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Replay ledgers and compare with stored balances
    Verify {
        #[arg(long)]
        party: Option<PartyId>,
    },
    /// Rewrite snapshots and balances from a replay
    Rebuild {
        #[arg(long)]
        party: Option<PartyId>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_from(Path::new("config"), Some(&cli.env), cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        settings.database.path = db.clone();
    }
    let _guard = telemetry::init_tracing(&settings.logging, cli.verbose)?;
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Config(cmd) => run_config(cmd, &settings, &out),
        command => {
            let books = open_books(&settings)?;
            let ctx = AppContext {
                books,
                settings,
                out,
            };
            match command {
                Commands::Party(cmd) => ctx.party(cmd),
                Commands::Product(cmd) => ctx.product(cmd),
                Commands::Stock(cmd) => ctx.stock(cmd),
                Commands::Payment(cmd) => ctx.payment(cmd),
                Commands::Invoice(cmd) => ctx.document(TradeKind::SalesInvoice, cmd),
                Commands::Purchase(cmd) => ctx.document(TradeKind::PurchaseOrder, cmd),
                Commands::Ledger(cmd) => ctx.ledger(cmd),
                Commands::Config(_) => unreachable!("handled above"),
            }
        }
    }
}

fn run_config(cmd: ConfigCommand, settings: &Settings, out: &Output) -> Result<()> {
    match cmd {
        ConfigCommand::Init { path, force } => {
            Settings::default().write_to(&path, force)?;
            println!("wrote {}", path.display());
        }
        ConfigCommand::Show => {
            if out.json {
                println!("{}", serde_json::to_string_pretty(settings)?);
            } else {
                print!("{}", settings.to_toml()?);
            }
        }
    }
    Ok(())
}

fn open_books(settings: &Settings) -> Result<Books> {
    let ledger = LedgerPolicy {
        allow_inactive_parties: settings.ledger.allow_inactive_parties,
        retry: RetryPolicy::new(
            settings.ledger.max_retries,
            settings.ledger.retry_base_delay(),
        ),
    };
    let policy = BooksPolicy {
        allow_negative_stock: settings.inventory.allow_negative_stock,
    };
    let path = &settings.database.path;
    let books = Books::open_with_timeout(path, settings.ledger.busy_timeout(), ledger, policy)
        .with_context(|| format!("failed to open books at {}", path.display()))?;
    info!(path = %path.display(), "books opened");
    Ok(books)
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize + ?Sized>(&self, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human(value));
        }
        Ok(())
    }
}

struct AppContext {
    books: Books,
    settings: Settings,
    out: Output,
}

impl AppContext {
    fn party(&self, cmd: PartyCommand) -> Result<()> {
        let ledger = self.books.ledger();
        match cmd {
            PartyCommand::Add(args) => {
                let mut draft = PartyDraft::new(args.kind, args.name, args.date.unwrap_or_else(today))
                    .with_opening_balance(args.opening);
                draft.phone = args.phone;
                draft.email = args.email;
                draft.address = args.address;
                draft.tax_id = args.tax_id;
                let party = ledger.create_party(&draft).context(TX_FAILED)?;
                self.out.emit(&party, party_line)
            }
            PartyCommand::List { kind } => {
                let parties = ledger.parties(kind)?;
                self.out.emit(parties.as_slice(), |parties| lines(parties, party_line))
            }
            PartyCommand::Show { id } => {
                let party = ledger.party(id)?;
                self.out.emit(&party, party_line)
            }
            PartyCommand::Activate { id } => {
                let party = ledger.set_party_active(id, true).context(TX_FAILED)?;
                self.out.emit(&party, party_line)
            }
            PartyCommand::Deactivate { id } => {
                let party = ledger.set_party_active(id, false).context(TX_FAILED)?;
                self.out.emit(&party, party_line)
            }
        }
    }

    fn product(&self, cmd: ProductCommand) -> Result<()> {
        match cmd {
            ProductCommand::Add {
                name,
                unit,
                price,
                sku,
                category,
            } => {
                let mut draft = ProductDraft::new(name, unit, price);
                draft.sku = sku;
                draft.category = category;
                let product = self.books.add_product(&draft).context(TX_FAILED)?;
                self.out.emit(&product, product_line)
            }
            ProductCommand::List => {
                let products = self.books.products()?;
                self.out.emit(products.as_slice(), |products| lines(products, product_line))
            }
            ProductCommand::Movements { id } => {
                let movements = self.books.stock_movements(id)?;
                self.out
                    .emit(movements.as_slice(), |movements| lines(movements, movement_line))
            }
        }
    }

    fn stock(&self, cmd: StockCommand) -> Result<()> {
        let (inbound, args) = match cmd {
            StockCommand::In(args) => (true, args),
            StockCommand::Out(args) => (false, args),
        };
        let mut request = StockRequest::new(args.product, args.qty, args.date.unwrap_or_else(today));
        request.reason = args.reason;
        let product = if inbound {
            self.books.stock_in(&request)
        } else {
            self.books.stock_out(&request)
        }
        .context(TX_FAILED)?;
        self.out.emit(&product, product_line)
    }

    fn payment(&self, cmd: PaymentCommand) -> Result<()> {
        match cmd {
            PaymentCommand::In(args) => self.record_payment(PaymentDirection::In, args),
            PaymentCommand::Out(args) => self.record_payment(PaymentDirection::Out, args),
            PaymentCommand::Edit {
                id,
                amount,
                date,
                method,
                reference,
                notes,
                clear_reference,
                clear_notes,
            } => {
                let update = PaymentUpdate {
                    amount,
                    date,
                    method,
                    reference_no: text_update(reference, clear_reference),
                    notes: text_update(notes, clear_notes),
                };
                let payment = self.books.update_payment(id, &update).context(TX_FAILED)?;
                self.out.emit(&payment, payment_line)
            }
            PaymentCommand::Delete { id } => {
                let payment = self.books.delete_payment(id).context(TX_FAILED)?;
                self.out
                    .emit(&payment, |payment| format!("deleted {}", payment_line(payment)))
            }
            PaymentCommand::List { party } => {
                let payments = self.books.payments(None, party)?;
                self.out.emit(payments.as_slice(), |payments| lines(payments, payment_line))
            }
        }
    }

    fn record_payment(&self, direction: PaymentDirection, args: PaymentArgs) -> Result<()> {
        let date = args.date.unwrap_or_else(today);
        let mut draft = match direction {
            PaymentDirection::In => PaymentDraft::received(args.party, args.amount, date),
            PaymentDirection::Out => PaymentDraft::paid(args.party, args.amount, date),
        }
        .with_method(args.method);
        draft.reference_no = args.reference;
        draft.notes = args.notes;
        let payment = self.books.record_payment(&draft).context(TX_FAILED)?;
        self.out.emit(&payment, payment_line)
    }

    fn document(&self, kind: TradeKind, cmd: DocumentCommand) -> Result<()> {
        match cmd {
            DocumentCommand::Create {
                party,
                lines: drafts,
                discount,
                date,
                notes,
                draft,
            } => {
                let date = date.unwrap_or_else(today);
                let mut request = match kind {
                    TradeKind::SalesInvoice => TradeDraft::sales_invoice(party, date),
                    TradeKind::PurchaseOrder => TradeDraft::purchase_order(party, date),
                }
                .with_discount(discount);
                request.lines = drafts;
                request.notes = notes;
                let document = self
                    .books
                    .create_document(&request, !draft)
                    .context(TX_FAILED)?;
                self.out.emit(&document, document_line)
            }
            DocumentCommand::Post { id } => {
                self.expect_kind(id, kind)?;
                let document = self.books.post_document(id).context(TX_FAILED)?;
                self.out.emit(&document, document_line)
            }
            DocumentCommand::Edit {
                id,
                lines: drafts,
                discount,
                date,
            } => {
                self.expect_kind(id, kind)?;
                let revision = TradeRevision {
                    date,
                    lines: (!drafts.is_empty()).then_some(drafts),
                    discount,
                };
                let document = self
                    .books
                    .revise_document(id, &revision)
                    .context(TX_FAILED)?;
                self.out.emit(&document, document_line)
            }
            DocumentCommand::Cancel { id } => {
                self.expect_kind(id, kind)?;
                let document = self.books.cancel_document(id).context(TX_FAILED)?;
                self.out.emit(&document, document_line)
            }
            DocumentCommand::Show { id } => {
                let document = self.expect_kind(id, kind)?;
                self.out.emit(&document, document_detail)
            }
            DocumentCommand::List { party } => {
                let documents = self.books.documents(kind, party)?;
                self.out
                    .emit(documents.as_slice(), |documents| lines(documents, document_line))
            }
            DocumentCommand::Next => {
                let number = self.books.peek_number(kind.series())?;
                self.out.emit(&number, Clone::clone)
            }
        }
    }

    fn expect_kind(&self, id: i64, kind: TradeKind) -> Result<TradeDocument> {
        let document = self.books.document(id)?;
        if document.kind != kind {
            bail!("document {id} is a {}, not a {kind}", document.kind);
        }
        Ok(document)
    }

    fn ledger(&self, cmd: LedgerCommand) -> Result<()> {
        let ledger = self.books.ledger();
        match cmd {
            LedgerCommand::Adjust {
                party,
                amount,
                date,
                description,
            } => {
                let mut request = RecordRequest::new(
                    party,
                    TransactionType::Adjustment,
                    amount,
                    date.unwrap_or_else(today),
                );
                if let Some(description) = description {
                    request = request.with_description(description);
                }
                let entry = ledger.record_transaction(&request).context(TX_FAILED)?;
                self.out.emit(&entry, entry_line)
            }
            LedgerCommand::Amend {
                entry,
                amount,
                date,
            } => {
                let current = ledger.entry(entry)?;
                let entry = ledger
                    .amend_transaction(entry, amount, date.unwrap_or(current.transaction_date))
                    .context(TX_FAILED)?;
                self.out.emit(&entry, entry_line)
            }
            LedgerCommand::Reverse { entry } => {
                let entry = ledger.reverse_transaction(entry).context(TX_FAILED)?;
                self.out.emit(&entry, entry_line)
            }
            LedgerCommand::History { party } => {
                let entries = ledger.history(party)?;
                self.out.emit(entries.as_slice(), |entries| lines(entries, entry_line))
            }
            LedgerCommand::Statement {
                party,
                from,
                to,
                csv,
            } => {
                let statement = ledger.reconstruct_statement(party, from, to)?;
                if let Some(path) = &csv {
                    export::write_statement_csv(path, &self.settings.company, &statement)?;
                    info!(path = %path.display(), entries = statement.entries.len(), "statement exported");
                }
                self.out.emit(&statement, |statement| {
                    export::render_statement(&self.settings.company, statement)
                })
            }
            LedgerCommand::Verify { party } => {
                let reports = self.each_party(party, |id| ledger.verify_party(id))?;
                self.out.emit(reports.as_slice(), |reports| lines(reports, report_line))?;
                if reports.iter().any(|report| !report.is_consistent()) {
                    bail!("ledger drift detected; run `weft ledger rebuild`");
                }
                Ok(())
            }
            LedgerCommand::Rebuild { party } => {
                let reports = self
                    .each_party(party, |id| ledger.rebuild_party(id))
                    .context(TX_FAILED)?;
                self.out.emit(reports.as_slice(), |reports| {
                    lines(reports, |report| {
                        if report.is_consistent() {
                            format!("party {} already consistent", report.party_id)
                        } else {
                            format!("party {} repaired: {}", report.party_id, report_line(report))
                        }
                    })
                })
            }
        }
    }

    fn each_party<F>(&self, party: Option<PartyId>, mut op: F) -> Result<Vec<ReplayReport>>
    where
        F: FnMut(PartyId) -> weft_ledger::LedgerResult<ReplayReport>,
    {
        let ids = match party {
            Some(id) => vec![id],
            None => self
                .books
                .ledger()
                .parties(None)?
                .into_iter()
                .map(|party| party.id)
                .collect(),
        };
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            reports.push(op(id)?);
        }
        Ok(reports)
    }
}

/// `Some(None)` clears the stored value, `None` keeps it.
fn text_update(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse `PRODUCT:QTY[:PRICE]`.
fn parse_line(input: &str) -> Result<LineDraft, String> {
    let mut parts = input.split(':');
    let product = parts
        .next()
        .filter(|part| !part.is_empty())
        .ok_or_else(|| format!("missing product in line {input}"))?
        .parse::<ProductId>()?;
    let quantity = parts
        .next()
        .ok_or_else(|| format!("missing quantity in line {input}"))
        .and_then(parse_amount)?;
    let mut line = LineDraft::new(product, quantity);
    if let Some(price) = parts.next() {
        line = line.at_price(parse_amount(price)?);
    }
    if parts.next().is_some() {
        return Err(format!("too many fields in line {input}"));
    }
    Ok(line)
}

fn lines<T>(items: &[T], render: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items.iter().map(render).collect::<Vec<_>>().join("\n")
}

fn party_line(party: &Party) -> String {
    format!(
        "#{} {} [{}{}] balance {}",
        party.id,
        party.name,
        party.kind,
        if party.is_active { "" } else { ", inactive" },
        party.current_balance
    )
}

fn product_line(product: &Product) -> String {
    format!(
        "#{} {}{} @ {} per {}, stock {}",
        product.id,
        product.name,
        product
            .sku
            .as_deref()
            .map(|sku| format!(" ({sku})"))
            .unwrap_or_default(),
        product.unit_price,
        product.unit,
        product.current_stock
    )
}

fn movement_line(movement: &StockMovement) -> String {
    format!(
        "{} {} {}{}",
        movement.date,
        movement.direction,
        movement.quantity,
        movement
            .reason
            .as_deref()
            .map(|reason| format!(" ({reason})"))
            .unwrap_or_default()
    )
}

fn payment_line(payment: &Payment) -> String {
    format!(
        "#{} {} {} party {} amount {} via {} on {}",
        payment.id,
        payment.receipt_no,
        payment.direction,
        payment.party_id,
        payment.amount,
        payment.method,
        payment.date
    )
}

fn document_line(document: &TradeDocument) -> String {
    format!(
        "#{} {} party {} total {} [{}] on {}",
        document.id,
        document.number,
        document.party_id,
        document.total,
        document.status,
        document.date
    )
}

fn document_detail(document: &TradeDocument) -> String {
    let mut out = document_line(document);
    for line in &document.lines {
        out.push_str(&format!(
            "\n  product {} x {} @ {} = {}",
            line.product_id, line.quantity, line.unit_price, line.line_total
        ));
    }
    out.push_str(&format!(
        "\n  subtotal {} discount {} total {}",
        document.subtotal(),
        document.discount,
        document.total
    ));
    out
}

fn entry_line(entry: &LedgerEntry) -> String {
    format!(
        "entry {} party {} {} dr {} cr {} balance {} [{}] on {}",
        entry.id,
        entry.party_id,
        entry.transaction_type,
        entry.debit,
        entry.credit,
        entry.balance,
        entry.status,
        entry.transaction_date
    )
}

fn report_line(report: &ReplayReport) -> String {
    if report.is_consistent() {
        format!(
            "party {} ok: {} entries, balance {}",
            report.party_id, report.entry_count, report.current_balance
        )
    } else {
        format!(
            "party {} drift {}: stored {}, replayed {}, {} bad snapshots",
            report.party_id,
            report.drift(),
            report.current_balance,
            report.replayed_balance,
            report.mismatches.len()
        )
    }
}
