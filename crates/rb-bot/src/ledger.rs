use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rb_db::models::{DepositRequest, LedgerKind, User};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::session::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    Unlimited,
    Amount(i64),
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("Unlimited"),
            Self::Amount(amount) => write!(f, "{amount}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deduction {
    Charged { balance: i64 },
    /// Admins install for free.
    Exempt,
    Insufficient,
}

/// What `/status` shows about a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub balance: Balance,
    pub joined: DateTime<Utc>,
    /// Amount of the open top-up request, if any.
    pub pending_deposit: Option<i64>,
}

#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// Deduct `amount` only if the balance covers it, atomically.
    async fn deduct_if_sufficient(&self, user: UserId, amount: i64, note: &str) -> Result<Deduction>;

    async fn refund(&self, user: UserId, amount: i64, note: &str) -> Result<i64>;

    async fn credit(&self, user: UserId, amount: i64, note: &str) -> Result<i64>;

    async fn balance(&self, user: UserId) -> Result<Balance>;

    async fn account(&self, user: UserId) -> Result<Account>;

    /// Record a pending top-up and return its id.
    async fn request_deposit(&self, user: UserId, amount: i64) -> Result<Uuid>;
}

/// Ledger backed by the `users` and `ledger_entries` tables.
pub struct PgLedger {
    pool: PgPool,
    admins: Arc<HashSet<UserId>>,
}

impl PgLedger {
    pub fn new(pool: PgPool, admins: Arc<HashSet<UserId>>) -> Self {
        Self { pool, admins }
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn deduct_if_sufficient(&self, user: UserId, amount: i64, note: &str) -> Result<Deduction> {
        if self.is_admin(user) {
            return Ok(Deduction::Exempt);
        }
        let deduction = match User::deduct_if_sufficient(&self.pool, user, amount, note).await? {
            Some(balance) => Deduction::Charged { balance },
            None => Deduction::Insufficient,
        };
        Ok(deduction)
    }

    async fn refund(&self, user: UserId, amount: i64, note: &str) -> Result<i64> {
        Ok(User::credit(&self.pool, user, amount, LedgerKind::Refund, Some(note)).await?)
    }

    async fn credit(&self, user: UserId, amount: i64, note: &str) -> Result<i64> {
        Ok(User::credit(&self.pool, user, amount, LedgerKind::Deposit, Some(note)).await?)
    }

    async fn balance(&self, user: UserId) -> Result<Balance> {
        if self.is_admin(user) {
            return Ok(Balance::Unlimited);
        }
        let user = User::ensure(&self.pool, user).await?;
        Ok(Balance::Amount(user.balance))
    }

    async fn account(&self, user: UserId) -> Result<Account> {
        let row = User::ensure(&self.pool, user).await?;
        let pending = DepositRequest::pending(&self.pool, user).await?;
        let balance = if self.is_admin(user) {
            Balance::Unlimited
        } else {
            Balance::Amount(row.balance)
        };
        Ok(Account {
            balance,
            joined: row.created_at,
            pending_deposit: pending.map(|r| r.amount),
        })
    }

    async fn request_deposit(&self, user: UserId, amount: i64) -> Result<Uuid> {
        let request = DepositRequest::open(&self.pool, user, amount).await?;
        tracing::info!(user_id = user, amount, request_id = %request.id, "deposit requested");
        Ok(request.id)
    }
}
