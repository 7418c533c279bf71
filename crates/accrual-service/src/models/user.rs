//! 用户与积分余额

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户
///
/// balance 由订单入账（加）和积分扣减（减）两条路径修改，任何时候都不为负
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// 密码摘要，由上层认证模块生成，这里只做透传存储
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
}

/// 余额视图：当前可用 + 累计已扣减
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub current: f64,
    pub withdrawn: f64,
}
