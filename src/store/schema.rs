//! Postgres schema for the watched tables.
//!
//! Every table gets a statement-level trigger that raises `pg_notify` on the
//! relay channel, so any writer (this process or not) wakes the relay.
//! Postgres folds identical notifications raised in one transaction into a
//! single delivery.

use super::errors::{StoreError, StoreResult};

/// Tables that raise a change signal when written.
const WATCHED_TABLES: [&str; 3] = ["users", "objects", "object_users"];

/// Channel names are spliced into `LISTEN` and trigger DDL, which cannot take
/// bind parameters, so only plain lowercase identifiers are accepted.
pub fn validate_channel_name(channel: &str) -> StoreResult<()> {
    let mut chars = channel.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_start || !valid_rest || channel.len() > 63 {
        return Err(StoreError::InvalidConfig(format!(
            "notify channel '{}' must be a lowercase SQL identifier",
            channel
        )));
    }
    Ok(())
}

/// DDL creating the tables and notify triggers for `channel`.
///
/// Idempotent: safe to run against an already migrated database.
pub fn migration_sql(channel: &str) -> StoreResult<String> {
    validate_channel_name(channel)?;

    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    email TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS objects (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    image TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS object_users (
    object_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (object_id, user_id)
);
",
    );

    sql.push_str(&format!(
        "CREATE OR REPLACE FUNCTION relay_notify_{channel}() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify('{channel}', '');
    RETURN NULL;
END;
$$ LANGUAGE plpgsql;
"
    ));

    for table in WATCHED_TABLES {
        sql.push_str(&format!(
            "DROP TRIGGER IF EXISTS {table}_{channel} ON {table};
CREATE TRIGGER {table}_{channel}
    AFTER INSERT OR UPDATE OR DELETE OR TRUNCATE ON {table}
    FOR EACH STATEMENT EXECUTE FUNCTION relay_notify_{channel}();
"
        ));
    }

    Ok(sql)
}
