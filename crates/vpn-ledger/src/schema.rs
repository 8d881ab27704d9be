//! Idempotent schema definition.
//!
//! Column types are chosen so the `Any` driver decodes every column as `i64`
//! or `String` on both databases. Only the surrogate key declaration differs.

use crate::backend::DatabaseType;

const TABLES: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS tariffs (
    id {id},
    name TEXT NOT NULL CONSTRAINT tariffs_name_key UNIQUE,
    price_cents BIGINT NOT NULL DEFAULT 0,
    traffic_limit BIGINT NOT NULL DEFAULT 0 CHECK (traffic_limit >= 0)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS users (
    id {id},
    username TEXT NOT NULL CONSTRAINT users_username_key UNIQUE,
    email TEXT NOT NULL CONSTRAINT users_email_key UNIQUE,
    password_hash TEXT NOT NULL,
    external_id TEXT CONSTRAINT users_external_id_key UNIQUE,
    tariff_id BIGINT NOT NULL REFERENCES tariffs(id),
    used_traffic BIGINT NOT NULL DEFAULT 0 CHECK (used_traffic >= 0),
    subscription_start BIGINT,
    subscription_end BIGINT,
    created_at BIGINT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS payments (
    id {id},
    user_id BIGINT NOT NULL REFERENCES users(id),
    amount_cents BIGINT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'settled', 'failed')),
    created_at BIGINT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    id {id},
    user_id BIGINT NOT NULL REFERENCES users(id),
    start_time BIGINT NOT NULL,
    end_time BIGINT,
    data_usage BIGINT NOT NULL DEFAULT 0 CHECK (data_usage >= 0)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS endpoint_bindings (
    user_id BIGINT NOT NULL REFERENCES users(id),
    backend TEXT NOT NULL,
    credential TEXT NOT NULL,
    leased_address TEXT,
    created_at BIGINT NOT NULL,
    PRIMARY KEY (user_id, backend)
)"#,
];

const INDEXES: &[&str] = &[
    // At most one open session per user.
    "CREATE UNIQUE INDEX IF NOT EXISTS sessions_one_open_per_user \
     ON sessions (user_id) WHERE end_time IS NULL",
    "CREATE INDEX IF NOT EXISTS sessions_user_idx ON sessions (user_id)",
    "CREATE INDEX IF NOT EXISTS payments_user_idx ON payments (user_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS endpoint_bindings_credential_key \
     ON endpoint_bindings (backend, credential)",
    // NULL leases (proxy bindings) never collide.
    "CREATE UNIQUE INDEX IF NOT EXISTS endpoint_bindings_leased_address_key \
     ON endpoint_bindings (leased_address)",
];

fn id_column(db_type: DatabaseType) -> &'static str {
    match db_type {
        DatabaseType::PostgreSQL => "BIGSERIAL PRIMARY KEY",
        DatabaseType::SQLite => "INTEGER PRIMARY KEY AUTOINCREMENT",
    }
}

/// DDL statements in execution order.
pub fn statements(db_type: DatabaseType) -> Vec<String> {
    let id = id_column(db_type);
    TABLES
        .iter()
        .map(|t| t.replace("{id}", id))
        .chain(INDEXES.iter().map(|s| (*s).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surrogate_keys_per_database() {
        let pg = statements(DatabaseType::PostgreSQL);
        let lite = statements(DatabaseType::SQLite);
        assert_eq!(pg.len(), lite.len());
        assert!(pg[0].contains("BIGSERIAL PRIMARY KEY"));
        assert!(lite[0].contains("INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(pg.iter().all(|s| !s.contains("{id}")));
    }

    #[test]
    fn test_open_session_index_is_partial() {
        let stmts = statements(DatabaseType::SQLite);
        assert!(
            stmts
                .iter()
                .any(|s| s.contains("sessions_one_open_per_user") && s.contains("WHERE end_time IS NULL"))
        );
    }
}
