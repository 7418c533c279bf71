//! PostgreSQL 订单存储
//!
//! 状态迁移统一使用 `FOR UPDATE SKIP LOCKED`：多个 Worker 或多个实例同时
//! 处理同一订单时，只有拿到行锁的一方写入，其余直接跳过而不是排队等待。

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};

use super::traits::{OrderStore, validate_credit_amount, validate_withdrawal_amount};
use crate::error::{Result, StoreError};
use crate::models::{Balance, Order, OrderStatus, OrderSubmission, TransitionOutcome, User, Withdrawal};

/// 本服务的数据库迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const ORDER_COLUMNS: &str = "number, status, accrual, uploaded_at, user_id";

/// PostgreSQL 订单存储
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 未拿到行锁时区分三种情况：订单不存在、已是终态、被他人锁定
    async fn classify_unlocked(&self, number: &str) -> Result<TransitionOutcome> {
        let status: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM orders WHERE number = $1")
                .bind(number)
                .fetch_optional(&self.pool)
                .await?;

        match status {
            None => Err(StoreError::order_not_found(number)),
            Some(status) if status.is_terminal() => Ok(TransitionOutcome::AlreadyTerminal),
            Some(_) => Ok(TransitionOutcome::Contended),
        }
    }

    /// 在事务中给用户入账
    async fn credit_in_tx(conn: &mut PgConnection, user_id: i64, amount: f64) -> Result<()> {
        let result = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
            .bind(amount)
            .bind(user_id)
            .execute(conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::user_not_found(user_id));
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn register_user(&self, name: &str, password_hash: &str) -> Result<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, password_hash)
            VALUES ($1, $2)
            RETURNING id, name, password_hash, balance, created_at
            "#,
        )
        .bind(name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(StoreError::UserAlreadyExists {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, password_hash, balance, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, password_hash, balance, created_at FROM users WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn create_new_order(&self, number: &str, user_id: i64) -> Result<OrderSubmission> {
        // ON CONFLICT 保证并发上传同一订单号时只有一方插入成功
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (number, status, user_id)
            VALUES ($1, 'NEW', $2)
            ON CONFLICT (number) DO NOTHING
            "#,
        )
        .bind(number)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(OrderSubmission::Accepted);
        }

        let owner: i64 = sqlx::query_scalar("SELECT user_id FROM orders WHERE number = $1")
            .bind(number)
            .fetch_one(&self.pool)
            .await?;

        if owner == user_id {
            Ok(OrderSubmission::AlreadySubmitted)
        } else {
            Err(StoreError::OwnedByAnotherUser {
                number: number.to_string(),
            })
        }
    }

    async fn get_order(&self, number: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn list_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY uploaded_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn get_orders_awaiting_verdict(&self) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY uploaded_at ASC, number ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn update_order_status(
        &self,
        number: &str,
        status: OrderStatus,
    ) -> Result<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $1
            WHERE number IN (
                SELECT number FROM orders
                WHERE number = $2 AND status IN ('NEW', 'PROCESSING')
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(status)
        .bind(number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(TransitionOutcome::Applied);
        }
        self.classify_unlocked(number).await
    }

    #[instrument(skip(self))]
    async fn set_order_processed_and_credit_balance(
        &self,
        number: &str,
        amount: f64,
    ) -> Result<TransitionOutcome> {
        validate_credit_amount(amount)?;

        let mut tx = self.pool.begin().await?;

        let locked: Option<(OrderStatus, i64)> = sqlx::query_as(
            r#"
            SELECT status, user_id FROM orders
            WHERE number = $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, user_id)) = locked else {
            tx.rollback().await?;
            return self.classify_unlocked(number).await;
        };

        if status.is_terminal() {
            tx.rollback().await?;
            debug!(number, %status, "订单已是终态，跳过入账");
            return Ok(TransitionOutcome::AlreadyTerminal);
        }

        sqlx::query("UPDATE orders SET status = 'PROCESSED', accrual = $1 WHERE number = $2")
            .bind(amount)
            .bind(number)
            .execute(&mut *tx)
            .await?;

        Self::credit_in_tx(&mut *tx, user_id, amount).await?;

        tx.commit().await?;
        Ok(TransitionOutcome::Applied)
    }

    #[instrument(skip(self))]
    async fn create_withdrawal(
        &self,
        user_id: i64,
        order_number: &str,
        amount: f64,
    ) -> Result<Withdrawal> {
        validate_withdrawal_amount(amount)?;

        let mut tx = self.pool.begin().await?;

        // 扣减必须串行，这里等待行锁而不是跳过
        let balance: Option<f64> =
            sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(available) = balance else {
            return Err(StoreError::user_not_found(user_id));
        };

        if available < amount {
            return Err(StoreError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        sqlx::query("UPDATE users SET balance = balance - $1 WHERE id = $2")
            .bind(amount)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals (order_number, user_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, order_number, user_id, amount, processed_at
            "#,
        )
        .bind(order_number)
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn list_withdrawals_by_user(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, order_number, user_id, amount, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }

    async fn get_withdrawn_sum(&self, user_id: i64) -> Result<f64> {
        let sum: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::DOUBLE PRECISION FROM withdrawals WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        let row: Option<(f64, f64)> = sqlx::query_as(
            r#"
            SELECT u.balance,
                   COALESCE((SELECT SUM(w.amount) FROM withdrawals w WHERE w.user_id = u.id), 0)::DOUBLE PRECISION
            FROM users u
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (current, withdrawn) = row.ok_or_else(|| StoreError::user_not_found(user_id))?;
        Ok(Balance { current, withdrawn })
    }
}
