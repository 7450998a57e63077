pub(crate) const BOOKS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS document_sequences (
    series TEXT PRIMARY KEY,
    last_value INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    sku TEXT UNIQUE,
    category TEXT,
    unit TEXT NOT NULL,
    unit_price TEXT NOT NULL,
    current_stock TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS stock_movements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES products(id),
    direction TEXT NOT NULL,
    quantity TEXT NOT NULL,
    movement_date TEXT NOT NULL,
    reason TEXT,
    document_id INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS stock_movements_idx_product
    ON stock_movements(product_id, movement_date, id);
CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    direction TEXT NOT NULL,
    party_id INTEGER NOT NULL REFERENCES parties(id),
    amount TEXT NOT NULL,
    payment_date TEXT NOT NULL,
    method TEXT NOT NULL,
    reference_no TEXT,
    notes TEXT,
    receipt_no TEXT NOT NULL UNIQUE,
    ledger_entry_id INTEGER REFERENCES ledger_entries(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS payments_idx_party ON payments(party_id, payment_date);
CREATE TABLE IF NOT EXISTS trade_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    number TEXT NOT NULL UNIQUE,
    party_id INTEGER NOT NULL REFERENCES parties(id),
    document_date TEXT NOT NULL,
    discount TEXT NOT NULL,
    total TEXT NOT NULL,
    status TEXT NOT NULL,
    ledger_entry_id INTEGER REFERENCES ledger_entries(id),
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS trade_documents_idx_party ON trade_documents(kind, party_id);
CREATE TABLE IF NOT EXISTS trade_lines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES trade_documents(id),
    product_id INTEGER NOT NULL REFERENCES products(id),
    quantity TEXT NOT NULL,
    unit_price TEXT NOT NULL,
    line_total TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS trade_lines_idx_document ON trade_lines(document_id);
"#;
