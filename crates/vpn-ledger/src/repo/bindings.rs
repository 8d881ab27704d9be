use sqlx::{Any, Executor, Row};
use vpn_core::{BackendKind, UserId};

use crate::error::LedgerError;
use crate::queries;
use crate::records::Binding;

/// Insert a binding. A taken credential or lease is a `Conflict`.
pub async fn insert<'e, E>(
    exec: E,
    user_id: UserId,
    backend: BackendKind,
    credential: &str,
    leased_address: Option<&str>,
    now: i64,
) -> Result<Binding, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Binding>(queries::BINDING_INSERT)
        .bind(user_id.get())
        .bind(backend.as_str())
        .bind(credential)
        .bind(leased_address)
        .bind(now)
        .fetch_one(exec)
        .await?)
}

pub async fn get<'e, E>(
    exec: E,
    user_id: UserId,
    backend: BackendKind,
) -> Result<Option<Binding>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Binding>(queries::BINDING_GET)
        .bind(user_id.get())
        .bind(backend.as_str())
        .fetch_optional(exec)
        .await?)
}

pub async fn list_by_backend<'e, E>(exec: E, backend: BackendKind) -> Result<Vec<Binding>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Binding>(queries::BINDING_LIST_BY_BACKEND)
        .bind(backend.as_str())
        .fetch_all(exec)
        .await?)
}

pub async fn list_for_user<'e, E>(exec: E, user_id: UserId) -> Result<Vec<Binding>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Binding>(queries::BINDING_LIST_FOR_USER)
        .bind(user_id.get())
        .fetch_all(exec)
        .await?)
}

/// Delete a binding, returning it if it existed.
pub async fn delete<'e, E>(
    exec: E,
    user_id: UserId,
    backend: BackendKind,
) -> Result<Option<Binding>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Binding>(queries::BINDING_DELETE)
        .bind(user_id.get())
        .bind(backend.as_str())
        .fetch_optional(exec)
        .await?)
}

/// Addresses currently leased on `backend`.
pub async fn leased_addresses<'e, E>(exec: E, backend: BackendKind) -> Result<Vec<String>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    let rows = sqlx::query(queries::BINDING_LEASED_ADDRESSES)
        .bind(backend.as_str())
        .fetch_all(exec)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("leased_address").map_err(LedgerError::from))
        .collect()
}
