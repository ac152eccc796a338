//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawl database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Worker configuration used by each crawl
CREATE TABLE IF NOT EXISTS workers (
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    worker_id INTEGER NOT NULL,
    display_mode TEXT NOT NULL,
    http_instrument INTEGER NOT NULL,
    cookie_instrument INTEGER NOT NULL,
    navigation_instrument INTEGER NOT NULL,
    js_instrument INTEGER NOT NULL,
    dns_instrument INTEGER NOT NULL,
    user_agent TEXT NOT NULL,
    PRIMARY KEY (crawl_id, worker_id)
);

-- One row per finished command sequence
CREATE TABLE IF NOT EXISTS site_visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    site_rank INTEGER NOT NULL,
    site_url TEXT NOT NULL,
    domain TEXT,
    -- NULL when no worker was left to take the site
    worker_id INTEGER,
    success INTEGER NOT NULL,
    error TEXT,
    final_url TEXT,
    status_code INTEGER,
    title TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_site_visits_crawl ON site_visits(crawl_id);
CREATE INDEX IF NOT EXISTS idx_site_visits_rank ON site_visits(site_rank);

CREATE TABLE IF NOT EXISTS http_exchanges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES site_visits(id),
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    content_type TEXT,
    header_count INTEGER NOT NULL,
    redirect_to TEXT,
    observed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_http_exchanges_visit ON http_exchanges(visit_id);

CREATE TABLE IF NOT EXISTS cookies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES site_visits(id),
    origin_url TEXT NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    domain TEXT,
    path TEXT,
    expires TEXT,
    max_age INTEGER,
    secure INTEGER NOT NULL,
    http_only INTEGER NOT NULL,
    same_site TEXT
);

CREATE INDEX IF NOT EXISTS idx_cookies_visit ON cookies(visit_id);

CREATE TABLE IF NOT EXISTS navigations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES site_visits(id),
    hop INTEGER NOT NULL,
    from_url TEXT,
    to_url TEXT NOT NULL,
    status_code INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dns_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES site_visits(id),
    hostname TEXT NOT NULL,
    addresses TEXT NOT NULL,
    error TEXT
);

CREATE TABLE IF NOT EXISTS scripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES site_visits(id),
    page_url TEXT NOT NULL,
    src TEXT,
    inline_length INTEGER,
    digest TEXT
);

CREATE INDEX IF NOT EXISTS idx_scripts_visit ON scripts(visit_id);
"#;

/// Tables holding instrumentation rows, in the order they are reported
pub const INSTRUMENT_TABLES: &[&str] = &[
    "http_exchanges",
    "cookies",
    "navigations",
    "dns_responses",
    "scripts",
];

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
