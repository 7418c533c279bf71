//! 积分扣减流水

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 扣减记录
///
/// 只追加不修改，与余额扣减在同一事务内写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Withdrawal {
    #[serde(skip_serializing, default)]
    pub id: i64,
    /// 用积分抵扣的订单号
    #[serde(rename = "order")]
    pub order_number: String,
    #[serde(skip_serializing, default)]
    pub user_id: i64,
    #[serde(rename = "sum")]
    pub amount: f64,
    pub processed_at: DateTime<Utc>,
}
