//! 仓储 Trait 定义
//!
//! 流水线和上层 HTTP 模块都只依赖这个接口，PostgreSQL 与内存实现可互换。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Balance, Order, OrderStatus, OrderSubmission, TransitionOutcome, User, Withdrawal};

/// 订单存储接口
///
/// 订单、用户余额、扣减流水的唯一事实来源。所有修改都是原子的读改写：
/// 终态订单不可再写，同一订单的 PROCESSED 入账最多生效一次。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    // 用户
    async fn register_user(&self, name: &str, password_hash: &str) -> Result<User>;
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>>;
    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;

    // 订单
    /// 原子地检查并插入：同一用户重复上传返回 `AlreadySubmitted`，
    /// 其他用户已上传返回 `OwnedByAnotherUser` 错误
    async fn create_new_order(&self, number: &str, user_id: i64) -> Result<OrderSubmission>;
    async fn get_order(&self, number: &str) -> Result<Option<Order>>;
    /// 按上传时间倒序
    async fn list_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>>;
    /// NEW / PROCESSING 订单，按上传时间正序（先到先查）
    async fn get_orders_awaiting_verdict(&self) -> Result<Vec<Order>>;
    /// 修改非终态订单的状态，不涉及积分
    async fn update_order_status(
        &self,
        number: &str,
        status: OrderStatus,
    ) -> Result<TransitionOutcome>;
    /// 标记 PROCESSED、写入积分并给订单所属用户入账，三者同一事务
    async fn set_order_processed_and_credit_balance(
        &self,
        number: &str,
        amount: f64,
    ) -> Result<TransitionOutcome>;

    // 余额与扣减
    /// 余额充足时扣减并追加流水，不足返回 `InsufficientBalance` 且不写任何数据
    async fn create_withdrawal(
        &self,
        user_id: i64,
        order_number: &str,
        amount: f64,
    ) -> Result<Withdrawal>;
    /// 按处理时间倒序
    async fn list_withdrawals_by_user(&self, user_id: i64) -> Result<Vec<Withdrawal>>;
    async fn get_withdrawn_sum(&self, user_id: i64) -> Result<f64>;
    async fn get_balance(&self, user_id: i64) -> Result<Balance>;
}

/// 入账金额校验：必须是非负有限数
pub(crate) fn validate_credit_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(crate::error::StoreError::InvalidAmount(amount))
    }
}

/// 扣减金额校验：必须是正的有限数
pub(crate) fn validate_withdrawal_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(crate::error::StoreError::InvalidAmount(amount))
    }
}
