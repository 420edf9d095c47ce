//! SQL migration definitions for the catalog database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: apis keyed by identity key, secondary indexes",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per identity key (sha256 of lowercased url|name)
CREATE TABLE IF NOT EXISTS apis (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    url         TEXT NOT NULL,
    source      TEXT NOT NULL DEFAULT '',
    category    TEXT NOT NULL DEFAULT '',
    auth        TEXT NOT NULL DEFAULT '',
    region      TEXT NOT NULL DEFAULT '',
    layer       INTEGER NOT NULL CHECK (layer BETWEEN 1 AND 12),
    metadata    TEXT NOT NULL DEFAULT '{}',
    fingerprint TEXT NOT NULL DEFAULT '',
    written_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_apis_url ON apis(url);
CREATE INDEX IF NOT EXISTS idx_apis_source ON apis(source);
CREATE INDEX IF NOT EXISTS idx_apis_category ON apis(category);
CREATE INDEX IF NOT EXISTS idx_apis_layer ON apis(layer);
CREATE INDEX IF NOT EXISTS idx_apis_written_at ON apis(written_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
