//! SQL migration definitions for the DocSmith status database.
//!
//! Migrations are applied in order on database open. Each one records its
//! version in `schema_migrations` as its final statement.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: docsets",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Last known status per package identity
CREATE TABLE IF NOT EXISTS docsets (
    name          TEXT NOT NULL,
    version       TEXT NOT NULL,
    status        TEXT NOT NULL,
    artifact_path TEXT,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (name, version)
);

CREATE INDEX IF NOT EXISTS idx_docsets_status ON docsets(status);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Record the last failure message per docset",
            sql: r#"
ALTER TABLE docsets ADD COLUMN last_error TEXT;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
