//! 内存订单存储
//!
//! 用于测试和本地开发。所有实体放在同一把锁下，跨实体的读改写
//! （订单入账 + 用户余额、余额扣减 + 流水）天然原子，不会出现 `Contended`。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::traits::{OrderStore, validate_credit_amount, validate_withdrawal_amount};
use crate::error::{Result, StoreError};
use crate::models::{Balance, Order, OrderStatus, OrderSubmission, TransitionOutcome, User, Withdrawal};

#[derive(Default)]
struct Inner {
    users: HashMap<i64, User>,
    /// 订单号 -> (插入序号, 订单)，序号用于上传时间相同时的稳定排序
    orders: HashMap<String, (u64, Order)>,
    withdrawals: Vec<Withdrawal>,
    next_user_id: i64,
    next_withdrawal_id: i64,
    next_order_seq: u64,
}

impl Inner {
    fn user_mut(&mut self, id: i64) -> Result<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| StoreError::user_not_found(id))
    }

    fn withdrawn_sum(&self, user_id: i64) -> f64 {
        self.withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.amount)
            .sum()
    }
}

/// 内存订单存储
#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一条订单，可指定任意状态和上传时间
    ///
    /// 测试用：构造已有历史数据的场景
    pub fn seed_order(&self, order: Order) {
        let mut inner = self.inner.lock();
        let seq = inner.next_order_seq;
        inner.next_order_seq += 1;
        inner.orders.insert(order.number.clone(), (seq, order));
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn register_user(&self, name: &str, password_hash: &str) -> Result<User> {
        let mut inner = self.inner.lock();
        if inner.users.values().any(|u| u.name == name) {
            return Err(StoreError::UserAlreadyExists {
                name: name.to_string(),
            });
        }

        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            balance: 0.0,
            created_at: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        Ok(self
            .inner
            .lock()
            .users
            .values()
            .find(|u| u.name == name)
            .cloned())
    }

    async fn create_new_order(&self, number: &str, user_id: i64) -> Result<OrderSubmission> {
        let mut inner = self.inner.lock();
        if let Some((_, existing)) = inner.orders.get(number) {
            return if existing.user_id == user_id {
                Ok(OrderSubmission::AlreadySubmitted)
            } else {
                Err(StoreError::OwnedByAnotherUser {
                    number: number.to_string(),
                })
            };
        }
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::user_not_found(user_id));
        }

        let seq = inner.next_order_seq;
        inner.next_order_seq += 1;
        let order = Order {
            number: number.to_string(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
            user_id,
        };
        inner.orders.insert(number.to_string(), (seq, order));
        Ok(OrderSubmission::Accepted)
    }

    async fn get_order(&self, number: &str) -> Result<Option<Order>> {
        Ok(self
            .inner
            .lock()
            .orders
            .get(number)
            .map(|(_, order)| order.clone()))
    }

    async fn list_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let inner = self.inner.lock();
        let mut orders: Vec<_> = inner
            .orders
            .values()
            .filter(|(_, o)| o.user_id == user_id)
            .collect();
        orders.sort_by(|(sa, a), (sb, b)| b.uploaded_at.cmp(&a.uploaded_at).then(sb.cmp(sa)));
        Ok(orders.into_iter().map(|(_, o)| o.clone()).collect())
    }

    async fn get_orders_awaiting_verdict(&self) -> Result<Vec<Order>> {
        let inner = self.inner.lock();
        let mut orders: Vec<_> = inner
            .orders
            .values()
            .filter(|(_, o)| !o.status.is_terminal())
            .collect();
        orders.sort_by(|(sa, a), (sb, b)| a.uploaded_at.cmp(&b.uploaded_at).then(sa.cmp(sb)));
        Ok(orders.into_iter().map(|(_, o)| o.clone()).collect())
    }

    async fn update_order_status(
        &self,
        number: &str,
        status: OrderStatus,
    ) -> Result<TransitionOutcome> {
        let mut inner = self.inner.lock();
        let (_, order) = inner
            .orders
            .get_mut(number)
            .ok_or_else(|| StoreError::order_not_found(number))?;

        if order.status.is_terminal() {
            return Ok(TransitionOutcome::AlreadyTerminal);
        }
        order.status = status;
        Ok(TransitionOutcome::Applied)
    }

    async fn set_order_processed_and_credit_balance(
        &self,
        number: &str,
        amount: f64,
    ) -> Result<TransitionOutcome> {
        validate_credit_amount(amount)?;

        let mut inner = self.inner.lock();
        let user_id = match inner.orders.get(number) {
            None => return Err(StoreError::order_not_found(number)),
            Some((_, order)) if order.status.is_terminal() => {
                return Ok(TransitionOutcome::AlreadyTerminal);
            }
            Some((_, order)) => order.user_id,
        };

        // 先入账，用户不存在时订单保持原样
        inner.user_mut(user_id)?.balance += amount;
        if let Some((_, order)) = inner.orders.get_mut(number) {
            order.status = OrderStatus::Processed;
            order.accrual = Some(amount);
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn create_withdrawal(
        &self,
        user_id: i64,
        order_number: &str,
        amount: f64,
    ) -> Result<Withdrawal> {
        validate_withdrawal_amount(amount)?;

        let mut inner = self.inner.lock();
        let user = inner.user_mut(user_id)?;
        if user.balance < amount {
            return Err(StoreError::InsufficientBalance {
                required: amount,
                available: user.balance,
            });
        }
        user.balance -= amount;

        inner.next_withdrawal_id += 1;
        let withdrawal = Withdrawal {
            id: inner.next_withdrawal_id,
            order_number: order_number.to_string(),
            user_id,
            amount,
            processed_at: Utc::now(),
        };
        inner.withdrawals.push(withdrawal.clone());
        Ok(withdrawal)
    }

    async fn list_withdrawals_by_user(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        let inner = self.inner.lock();
        // 追加顺序即处理时间顺序，倒序输出
        Ok(inner
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_withdrawn_sum(&self, user_id: i64) -> Result<f64> {
        Ok(self.inner.lock().withdrawn_sum(user_id))
    }

    async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        let inner = self.inner.lock();
        let user = inner
            .users
            .get(&user_id)
            .ok_or_else(|| StoreError::user_not_found(user_id))?;
        Ok(Balance {
            current: user.balance,
            withdrawn: inner.withdrawn_sum(user_id),
        })
    }
}
