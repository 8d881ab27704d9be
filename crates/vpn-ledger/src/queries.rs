//! SQL statements shared by PostgreSQL and SQLite.
//!
//! Both drivers accept `$N` positional parameters and `RETURNING`, so one
//! statement serves both databases.

// ---------------------------------------------------------------------------
// tariffs
// ---------------------------------------------------------------------------

pub const TARIFF_INSERT: &str = r#"
INSERT INTO tariffs (name, price_cents, traffic_limit)
VALUES ($1, $2, $3)
RETURNING id, name, price_cents, traffic_limit
"#;

/// Seed row; an existing tariff with the same name is left untouched.
pub const TARIFF_SEED: &str = r#"
INSERT INTO tariffs (name, price_cents, traffic_limit)
VALUES ($1, 0, $2)
ON CONFLICT (name) DO NOTHING
"#;

pub const TARIFF_BY_ID: &str = r#"
SELECT id, name, price_cents, traffic_limit FROM tariffs WHERE id = $1
"#;

pub const TARIFF_BY_NAME: &str = r#"
SELECT id, name, price_cents, traffic_limit FROM tariffs WHERE name = $1
"#;

pub const TARIFF_LIST: &str = r#"
SELECT id, name, price_cents, traffic_limit FROM tariffs ORDER BY price_cents, id
"#;

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

pub const USER_INSERT: &str = r#"
INSERT INTO users (username, email, password_hash, tariff_id, used_traffic, created_at)
VALUES ($1, $2, $3, $4, 0, $5)
RETURNING id, username, email, password_hash, external_id, tariff_id, used_traffic,
          subscription_start, subscription_end, created_at
"#;

pub const USER_BY_ID: &str = r#"
SELECT id, username, email, password_hash, external_id, tariff_id, used_traffic,
       subscription_start, subscription_end, created_at
FROM users WHERE id = $1
"#;

pub const USER_BY_USERNAME: &str = r#"
SELECT id, username, email, password_hash, external_id, tariff_id, used_traffic,
       subscription_start, subscription_end, created_at
FROM users WHERE username = $1
"#;

pub const USER_BY_EMAIL: &str = r#"
SELECT id, username, email, password_hash, external_id, tariff_id, used_traffic,
       subscription_start, subscription_end, created_at
FROM users WHERE email = $1
"#;

/// Login lookup: the identifier may be a username or an email.
pub const USER_BY_LOGIN: &str = r#"
SELECT id, username, email, password_hash, external_id, tariff_id, used_traffic,
       subscription_start, subscription_end, created_at
FROM users WHERE username = $1 OR email = $1
ORDER BY id
LIMIT 1
"#;

pub const USER_BY_EXTERNAL_ID: &str = r#"
SELECT id, username, email, password_hash, external_id, tariff_id, used_traffic,
       subscription_start, subscription_end, created_at
FROM users WHERE external_id = $1
"#;

pub const USER_LIST: &str = r#"
SELECT id, username, email, password_hash, external_id, tariff_id, used_traffic,
       subscription_start, subscription_end, created_at
FROM users ORDER BY id
LIMIT $1 OFFSET $2
"#;

pub const USER_LINK_EXTERNAL_ID: &str = r#"
UPDATE users SET external_id = $2
WHERE id = $1
RETURNING id, username, email, password_hash, external_id, tariff_id, used_traffic,
          subscription_start, subscription_end, created_at
"#;

pub const USER_ADD_TRAFFIC: &str = r#"
UPDATE users SET used_traffic = used_traffic + $2
WHERE id = $1
RETURNING id, username, email, password_hash, external_id, tariff_id, used_traffic,
          subscription_start, subscription_end, created_at
"#;

/// Extend the subscription window by `$3` seconds.
///
/// The extension is added to the existing end date, even one already in the
/// past; only a user without a window starts at `$2` (now).
pub const USER_RENEW: &str = r#"
UPDATE users
SET subscription_start = COALESCE(subscription_start, $2),
    subscription_end = COALESCE(subscription_end, $2) + $3
WHERE id = $1
RETURNING id, username, email, password_hash, external_id, tariff_id, used_traffic,
          subscription_start, subscription_end, created_at
"#;

pub const USER_SET_PASSWORD_BY_EMAIL: &str = r#"
UPDATE users SET password_hash = $2 WHERE email = $1
"#;

// ---------------------------------------------------------------------------
// payments
// ---------------------------------------------------------------------------

pub const PAYMENT_INSERT: &str = r#"
INSERT INTO payments (user_id, amount_cents, status, created_at)
VALUES ($1, $2, $3, $4)
RETURNING id, user_id, amount_cents, status, created_at
"#;

pub const PAYMENT_LIST_FOR_USER: &str = r#"
SELECT id, user_id, amount_cents, status, created_at
FROM payments WHERE user_id = $1
ORDER BY id
"#;

// ---------------------------------------------------------------------------
// sessions
// ---------------------------------------------------------------------------

pub const SESSION_INSERT_OPEN: &str = r#"
INSERT INTO sessions (user_id, start_time, end_time, data_usage)
VALUES ($1, $2, NULL, 0)
RETURNING id, user_id, start_time, end_time, data_usage
"#;

pub const SESSION_BY_ID: &str = r#"
SELECT id, user_id, start_time, end_time, data_usage FROM sessions WHERE id = $1
"#;

pub const SESSION_OPEN_FOR_USER: &str = r#"
SELECT id, user_id, start_time, end_time, data_usage
FROM sessions WHERE user_id = $1 AND end_time IS NULL
"#;

pub const SESSION_LIST_OPEN: &str = r#"
SELECT id, user_id, start_time, end_time, data_usage
FROM sessions WHERE end_time IS NULL
ORDER BY id
"#;

pub const SESSION_LIST_FOR_USER: &str = r#"
SELECT id, user_id, start_time, end_time, data_usage
FROM sessions WHERE user_id = $1
ORDER BY id DESC
LIMIT $2
"#;

/// Close an open session and add the final usage delta.
///
/// Matches no row when the session is already closed.
pub const SESSION_CLOSE: &str = r#"
UPDATE sessions SET end_time = $2, data_usage = data_usage + $3
WHERE id = $1 AND end_time IS NULL
RETURNING id, user_id, start_time, end_time, data_usage
"#;

pub const SESSION_ADD_USAGE: &str = r#"
UPDATE sessions SET data_usage = data_usage + $2
WHERE id = $1 AND end_time IS NULL
RETURNING id, user_id, start_time, end_time, data_usage
"#;

// ---------------------------------------------------------------------------
// endpoint_bindings
// ---------------------------------------------------------------------------

pub const BINDING_INSERT: &str = r#"
INSERT INTO endpoint_bindings (user_id, backend, credential, leased_address, created_at)
VALUES ($1, $2, $3, $4, $5)
RETURNING user_id, backend, credential, leased_address, created_at
"#;

pub const BINDING_GET: &str = r#"
SELECT user_id, backend, credential, leased_address, created_at
FROM endpoint_bindings WHERE user_id = $1 AND backend = $2
"#;

pub const BINDING_LIST_BY_BACKEND: &str = r#"
SELECT user_id, backend, credential, leased_address, created_at
FROM endpoint_bindings WHERE backend = $1
ORDER BY user_id
"#;

pub const BINDING_LIST_FOR_USER: &str = r#"
SELECT user_id, backend, credential, leased_address, created_at
FROM endpoint_bindings WHERE user_id = $1
ORDER BY backend
"#;

pub const BINDING_DELETE: &str = r#"
DELETE FROM endpoint_bindings WHERE user_id = $1 AND backend = $2
RETURNING user_id, backend, credential, leased_address, created_at
"#;

pub const BINDING_LEASED_ADDRESSES: &str = r#"
SELECT leased_address FROM endpoint_bindings
WHERE backend = $1 AND leased_address IS NOT NULL
"#;
