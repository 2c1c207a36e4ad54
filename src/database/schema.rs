pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    hashed_password TEXT NOT NULL,
    is_admin BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY,
    tax_id TEXT NOT NULL UNIQUE,
    requester_name TEXT NOT NULL,
    phone TEXT NOT NULL,
    email TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS staff (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    email TEXT
);

CREATE TABLE IF NOT EXISTS proposals (
    id INTEGER PRIMARY KEY,
    client_id INTEGER NOT NULL,
    environmental_authority TEXT NOT NULL,
    process_type TEXT NOT NULL,
    renewal BOOLEAN NOT NULL DEFAULT FALSE,
    document_number TEXT,
    validity DATE NOT NULL,
    monthly BOOLEAN NOT NULL DEFAULT FALSE,
    responsible_id INTEGER,
    work_type TEXT,
    meeting_at TIMESTAMP,
    delivery_deadline TIMESTAMP,
    notes TEXT,
    FOREIGN KEY (client_id) REFERENCES clients (id),
    FOREIGN KEY (responsible_id) REFERENCES staff (id)
);
"#;
