/// Schema for all local persistence.
pub const SCHEMA: &str = r#"
-- Whole-value text storage (mirror collections, freshness marker)
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named response cache buckets
CREATE TABLE IF NOT EXISTS cache_names (
    cache_name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses keyed by request URL
CREATE TABLE IF NOT EXISTS response_cache (
    cache_name TEXT NOT NULL,
    request_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_url),
    FOREIGN KEY (cache_name) REFERENCES cache_names(cache_name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_response_cache_name ON response_cache(cache_name);
"#;
