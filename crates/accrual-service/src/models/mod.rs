//! 领域模型
//!
//! 订单、用户、扣减流水三类持久化实体，所有枚举同时支持 sqlx 和 serde。

mod order;
mod user;
mod withdrawal;

pub use order::{Order, OrderStatus, OrderSubmission, TransitionOutcome};
pub use user::{Balance, User};
pub use withdrawal::Withdrawal;
