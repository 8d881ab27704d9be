use sqlx::{Any, Executor};
use vpn_core::TariffId;

use super::db_counter;
use crate::error::LedgerError;
use crate::queries;
use crate::records::Tariff;

pub async fn insert<'e, E>(
    exec: E,
    name: &str,
    price_cents: i64,
    traffic_limit: u64,
) -> Result<Tariff, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Tariff>(queries::TARIFF_INSERT)
        .bind(name)
        .bind(price_cents)
        .bind(db_counter(traffic_limit))
        .fetch_one(exec)
        .await?)
}

pub async fn by_id<'e, E>(exec: E, id: TariffId) -> Result<Option<Tariff>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Tariff>(queries::TARIFF_BY_ID)
        .bind(id.get())
        .fetch_optional(exec)
        .await?)
}

pub async fn by_name<'e, E>(exec: E, name: &str) -> Result<Option<Tariff>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Tariff>(queries::TARIFF_BY_NAME)
        .bind(name)
        .fetch_optional(exec)
        .await?)
}

pub async fn list<'e, E>(exec: E) -> Result<Vec<Tariff>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Tariff>(queries::TARIFF_LIST)
        .fetch_all(exec)
        .await?)
}
