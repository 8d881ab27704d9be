use sqlx::{Any, Executor};
use vpn_core::UserId;

use crate::error::LedgerError;
use crate::queries;
use crate::records::{Payment, PaymentStatus};

pub async fn insert<'e, E>(
    exec: E,
    user_id: UserId,
    amount_cents: i64,
    status: PaymentStatus,
    now: i64,
) -> Result<Payment, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Payment>(queries::PAYMENT_INSERT)
        .bind(user_id.get())
        .bind(amount_cents)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(exec)
        .await?)
}

pub async fn list_for_user<'e, E>(exec: E, user_id: UserId) -> Result<Vec<Payment>, LedgerError>
where
    E: Executor<'e, Database = Any>,
{
    Ok(sqlx::query_as::<_, Payment>(queries::PAYMENT_LIST_FOR_USER)
        .bind(user_id.get())
        .fetch_all(exec)
        .await?)
}
