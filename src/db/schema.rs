//! Database schema and migrations for feedrelay.
//!
//! Migrations are applied in order; the schema_version table records which
//! ones have run. Timestamps are fixed-width RFC 3339 text (see `datetime`).

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Feeds, their delivery connections and cadence overrides
    r#"
CREATE TABLE feeds (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    title                 TEXT NOT NULL,
    url                   TEXT NOT NULL,
    owner_id              TEXT NOT NULL,
    health_status         TEXT NOT NULL DEFAULT 'ok',   -- 'ok', 'failed'
    disabled_code         TEXT,                         -- 'bad-format', 'failed-requests', 'manual'
    passing_comparisons   TEXT NOT NULL DEFAULT '[]',   -- JSON array of field names
    blocking_comparisons  TEXT NOT NULL DEFAULT '[]',   -- JSON array of field names
    created_at            TEXT NOT NULL
);

CREATE INDEX idx_feeds_url ON feeds(url);
CREATE INDEX idx_feeds_owner_id ON feeds(owner_id);

CREATE TABLE feed_connections (
    id             TEXT PRIMARY KEY,                    -- UUID
    feed_id        INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    name           TEXT NOT NULL,
    details        TEXT NOT NULL,                       -- JSON: target and message templates
    filters        TEXT,                                -- JSON filter expression
    disabled_code  TEXT,                                -- 'bad-format', 'manual'
    created_at     TEXT NOT NULL
);

CREATE INDEX idx_feed_connections_feed_id ON feed_connections(feed_id);

CREATE TABLE feed_schedules (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    name                  TEXT NOT NULL UNIQUE,
    keywords              TEXT NOT NULL DEFAULT '[]',   -- JSON array
    feed_ids              TEXT NOT NULL DEFAULT '[]',   -- JSON array
    refresh_rate_minutes  INTEGER NOT NULL
);
"#,
    // v2: Fetch history and per-URL failure streaks
    r#"
CREATE TABLE fetch_requests (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    url            TEXT NOT NULL,
    status         TEXT NOT NULL,                       -- 'ok', 'failed', 'fetch-error', 'parse-error'
    error_message  TEXT,
    created_at     TEXT NOT NULL
);

CREATE INDEX idx_fetch_requests_url_created ON fetch_requests(url, created_at);

CREATE TABLE fetch_responses (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id     INTEGER NOT NULL UNIQUE REFERENCES fetch_requests(id),
    status_code    INTEGER NOT NULL,
    body           TEXT,
    is_anti_block  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE url_failure_streaks (
    url                TEXT PRIMARY KEY,
    streak_started_at  TEXT,
    breached           INTEGER NOT NULL DEFAULT 0
);
"#,
    // v3: Article history (hashed keys and comparison values)
    r#"
CREATE TABLE article_keys (
    feed_id     INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    id_type     TEXT NOT NULL,
    key_hash    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (feed_id, id_type, key_hash)
);

CREATE TABLE article_field_values (
    feed_id     INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    field_name  TEXT NOT NULL,
    value_hash  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (feed_id, field_name, value_hash)
);
"#,
    // v4: Delivery ledger (no foreign key, records outlive their feed)
    r#"
CREATE TABLE delivery_records (
    id                TEXT PRIMARY KEY,                 -- UUID
    feed_id           INTEGER NOT NULL,
    medium_id         TEXT NOT NULL,
    article_id        TEXT,
    status            TEXT NOT NULL,                    -- 'sent', 'failed', 'rejected', 'filtered-out', 'rate-limited'
    error_code        TEXT,
    internal_message  TEXT,
    created_at        TEXT NOT NULL
);

CREATE INDEX idx_delivery_records_feed_created ON delivery_records(feed_id, created_at);
"#,
];
