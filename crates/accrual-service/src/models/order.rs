//! 订单实体与状态迁移结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 订单状态
///
/// NEW → PROCESSING → INVALID | PROCESSED，后两者为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 已上传，尚未被积分计算系统处理
    New,
    /// 积分计算系统处理中
    Processing,
    /// 积分计算系统拒绝，不会产生积分
    Invalid,
    /// 计算完成，积分已入账
    Processed,
}

impl OrderStatus {
    /// 等待最终结论的状态，生成器只扫描这两种
    pub const AWAITING_VERDICT: [OrderStatus; 2] = [OrderStatus::New, OrderStatus::Processing];

    /// 终态订单不允许再修改状态和积分
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    /// 订单号（外部校验位合法的唯一编号）
    pub number: String,
    pub status: OrderStatus,
    /// 仅 PROCESSED 时有值
    pub accrual: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub user_id: i64,
}

/// 上传订单的结果
///
/// 同一用户重复上传不是错误，调用方据此返回"已受理"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSubmission {
    /// 新订单已写入，状态 NEW
    Accepted,
    /// 该用户之前已上传过此订单
    AlreadySubmitted,
}

/// 状态迁移结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// 写入成功
    Applied,
    /// 订单已处于终态，本次为空操作
    AlreadyTerminal,
    /// 行锁被其他 Worker 或实例持有，本次跳过，留给后续轮询
    Contended,
}

impl TransitionOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }

    /// 指标标签
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::AlreadyTerminal => "already_terminal",
            Self::Contended => "contended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_wire_names() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");

        let status: OrderStatus = serde_json::from_str("\"INVALID\"").unwrap();
        assert_eq!(status, OrderStatus::Invalid);
        assert_eq!(status.to_string(), "INVALID");
    }

    #[test]
    fn test_order_json_hides_owner() {
        let order = Order {
            number: "12345678903".to_string(),
            status: OrderStatus::Processed,
            accrual: Some(500.0),
            uploaded_at: Utc::now(),
            user_id: 7,
        };
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["status"], "PROCESSED");
        assert_eq!(value["accrual"], 500.0);
        assert!(value.get("user_id").is_none());
    }
}
