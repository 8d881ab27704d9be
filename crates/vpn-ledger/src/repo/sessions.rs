use sqlx::{Any, Executor};
use vpn_core::{SessionId, UserId};

use super::db_counter;
use crate::error::LedgerError;
use crate::queries;
use crate::records::Session;

/// Insert an open session. A second open session for the user is a `Conflict`.
pub async fn insert_open<'e, E>(exec: E, user_id: UserId, now: i64) -> Result<Session, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Session>(queries::SESSION_INSERT_OPEN)
        .bind(user_id.get())
        .bind(now)
        .fetch_one(exec)
        .await?)
}

pub async fn by_id<'e, E>(exec: E, id: SessionId) -> Result<Option<Session>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Session>(queries::SESSION_BY_ID)
        .bind(id.get())
        .fetch_optional(exec)
        .await?)
}

pub async fn open_for_user<'e, E>(exec: E, user_id: UserId) -> Result<Option<Session>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Session>(queries::SESSION_OPEN_FOR_USER)
        .bind(user_id.get())
        .fetch_optional(exec)
        .await?)
}

pub async fn list_open<'e, E>(exec: E) -> Result<Vec<Session>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Session>(queries::SESSION_LIST_OPEN)
        .fetch_all(exec)
        .await?)
}

/// Most recent sessions of a user, newest first.
pub async fn list_for_user<'e, E>(
    exec: E,
    user_id: UserId,
    limit: i64,
) -> Result<Vec<Session>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Session>(queries::SESSION_LIST_FOR_USER)
        .bind(user_id.get())
        .bind(limit)
        .fetch_all(exec)
        .await?)
}

/// Close an open session, adding `final_usage` bytes.
///
/// Returns `None` when the session does not exist or is already closed.
pub async fn close<'e, E>(
    exec: E,
    id: SessionId,
    final_usage: u64,
    now: i64,
) -> Result<Option<Session>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Session>(queries::SESSION_CLOSE)
        .bind(id.get())
        .bind(now)
        .bind(db_counter(final_usage))
        .fetch_optional(exec)
        .await?)
}

/// Add interim usage to an open session. `None` when not open.
pub async fn add_usage<'e, E>(exec: E, id: SessionId, bytes: u64) -> Result<Option<Session>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Session>(queries::SESSION_ADD_USAGE)
        .bind(id.get())
        .bind(db_counter(bytes))
        .fetch_optional(exec)
        .await?)
}
