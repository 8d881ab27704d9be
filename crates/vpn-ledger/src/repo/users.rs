use sqlx::{Any, Executor};
use vpn_core::UserId;

use super::db_counter;
use crate::error::LedgerError;
use crate::queries;
use crate::records::{NewUser, User};

pub async fn insert<'e, E>(exec: E, new: &NewUser<'_>, now: i64) -> Result<User, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_INSERT)
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.tariff_id.get())
        .bind(now)
        .fetch_one(exec)
        .await?)
}

pub async fn by_id<'e, E>(exec: E, id: UserId) -> Result<Option<User>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_BY_ID)
        .bind(id.get())
        .fetch_optional(exec)
        .await?)
}

pub async fn by_username<'e, E>(exec: E, username: &str) -> Result<Option<User>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_BY_USERNAME)
        .bind(username)
        .fetch_optional(exec)
        .await?)
}

pub async fn by_email<'e, E>(exec: E, email: &str) -> Result<Option<User>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_BY_EMAIL)
        .bind(email)
        .fetch_optional(exec)
        .await?)
}

/// Look a user up by username or email.
pub async fn by_login<'e, E>(exec: E, identifier: &str) -> Result<Option<User>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_BY_LOGIN)
        .bind(identifier)
        .fetch_optional(exec)
        .await?)
}

pub async fn by_external_id<'e, E>(exec: E, external_id: &str) -> Result<Option<User>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_BY_EXTERNAL_ID)
        .bind(external_id)
        .fetch_optional(exec)
        .await?)
}

pub async fn list<'e, E>(exec: E, limit: i64, offset: i64) -> Result<Vec<User>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_LIST)
        .bind(limit)
        .bind(offset)
        .fetch_all(exec)
        .await?)
}

/// Set the external identity. A value owned by another user is a `Conflict`.
pub async fn link_external_id<'e, E>(
    exec: E,
    id: UserId,
    external_id: &str,
) -> Result<User, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_LINK_EXTERNAL_ID)
        .bind(id.get())
        .bind(external_id)
        .fetch_one(exec)
        .await?)
}

/// Add `bytes` to the cumulative traffic counter.
pub async fn add_traffic<'e, E>(exec: E, id: UserId, bytes: u64) -> Result<User, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_ADD_TRAFFIC)
        .bind(id.get())
        .bind(db_counter(bytes))
        .fetch_one(exec)
        .await?)
}

/// Extend the subscription window by `period_secs` in one statement.
pub async fn renew<'e, E>(
    exec: E,
    id: UserId,
    period_secs: i64,
    now: i64,
) -> Result<User, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, User>(queries::USER_RENEW)
        .bind(id.get())
        .bind(now)
        .bind(period_secs)
        .fetch_one(exec)
        .await?)
}

/// Replace the password hash of the account with `email`. Returns whether a row matched.
pub async fn set_password_by_email<'e, E>(
    exec: E,
    email: &str,
    password_hash: &str,
) -> Result<bool, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    let done = sqlx::query(queries::USER_SET_PASSWORD_BY_EMAIL)
        .bind(email)
        .bind(password_hash)
        .execute(exec)
        .await?;
    Ok(done.rows_affected() > 0)
}
