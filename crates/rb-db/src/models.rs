use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

// ── User ────────────────────────────────────────────────────────────

/// A chat user and their prepaid balance. Keyed by the Telegram user id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub telegram_id: i64,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fetch the user, creating a zero-balance row on first contact.
    pub async fn ensure(pool: &PgPool, telegram_id: i64) -> sqlx::Result<Self> {
        sqlx::query("INSERT INTO users (telegram_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(telegram_id)
            .execute(pool)
            .await?;

        sqlx::query_as("SELECT * FROM users WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_one(pool)
            .await
    }

    /// Deduct `amount` only if the balance covers it.
    ///
    /// The check and the write are one conditional UPDATE, so two concurrent
    /// purchases cannot both pass against the same balance. Returns the new
    /// balance, or `None` when funds are insufficient.
    pub async fn deduct_if_sufficient(
        pool: &PgPool,
        telegram_id: i64,
        amount: i64,
        note: &str,
    ) -> sqlx::Result<Option<i64>> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO users (telegram_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(telegram_id)
            .execute(&mut *tx)
            .await?;

        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE users
               SET balance = balance - $2, updated_at = now()
               WHERE telegram_id = $1 AND balance >= $2
               RETURNING balance"#,
        )
        .bind(telegram_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((balance,)) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        LedgerEntry::insert(&mut *tx, telegram_id, -amount, LedgerKind::Install, Some(note)).await?;
        tx.commit().await?;
        Ok(Some(balance))
    }

    /// Add `amount` to the balance and record why. Returns the new balance.
    pub async fn credit(
        pool: &PgPool,
        telegram_id: i64,
        amount: i64,
        kind: LedgerKind,
        note: Option<&str>,
    ) -> sqlx::Result<i64> {
        let mut tx = pool.begin().await?;

        let (balance,): (i64,) = sqlx::query_as(
            r#"INSERT INTO users (telegram_id, balance) VALUES ($1, $2)
               ON CONFLICT (telegram_id)
               DO UPDATE SET balance = users.balance + EXCLUDED.balance, updated_at = now()
               RETURNING balance"#,
        )
        .bind(telegram_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        LedgerEntry::insert(&mut *tx, telegram_id, amount, kind, note).await?;
        tx.commit().await?;
        Ok(balance)
    }
}

// ── LedgerEntry ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "ledger_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Deposit,
    Install,
    Refund,
    Adjustment,
}

/// Append-only record of every balance movement.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: i64,
    pub amount: i64,
    pub kind: LedgerKind,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    async fn insert(
        conn: &mut sqlx::PgConnection,
        user_id: i64,
        amount: i64,
        kind: LedgerKind,
        note: Option<&str>,
    ) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO ledger_entries (user_id, amount, kind, note) VALUES ($1, $2, $3, $4)")
            .bind(user_id)
            .bind(amount)
            .bind(kind)
            .bind(note)
            .execute(conn)
            .await?;
        Ok(())
    }
}

// ── DepositRequest ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "deposit_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A top-up the user asked for. Collecting the payment happens elsewhere;
/// an admin confirms it by crediting the balance.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: Uuid,
    pub user_id: i64,
    pub amount: i64,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DepositRequest {
    /// Record a pending request, cancelling any older pending one for the user.
    pub async fn open(pool: &PgPool, user_id: i64, amount: i64) -> sqlx::Result<Self> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO users (telegram_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE deposit_requests SET status = 'cancelled', updated_at = now() WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let request = sqlx::query_as(
            "INSERT INTO deposit_requests (user_id, amount) VALUES ($1, $2) RETURNING *",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// The user's open request, if any.
    pub async fn pending(pool: &PgPool, user_id: i64) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM deposit_requests WHERE user_id = $1 AND status = 'pending'")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
