//! 积分计算系统的响应模型

use serde::{Deserialize, Serialize};

/// 积分计算系统侧的订单状态
///
/// 与本地 `OrderStatus` 不同：REGISTERED 表示已登记但尚未开始计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// `GET /api/orders/{number}` 的 200 响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualVerdict {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}

impl AccrualVerdict {
    pub fn new(order: impl Into<String>, status: AccrualStatus, accrual: Option<f64>) -> Self {
        Self {
            order: order.into(),
            status,
            accrual,
        }
    }

    /// PROCESSED 且积分为正时返回需要入账的金额
    pub fn creditable_amount(&self) -> Option<f64> {
        match (self.status, self.accrual) {
            (AccrualStatus::Processed, Some(amount)) if amount > 0.0 => Some(amount),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_without_accrual() {
        let verdict: AccrualVerdict =
            serde_json::from_str(r#"{"order":"12345678903","status":"REGISTERED"}"#).unwrap();
        assert_eq!(verdict.status, AccrualStatus::Registered);
        assert!(verdict.accrual.is_none());
        assert!(verdict.creditable_amount().is_none());
    }

    #[test]
    fn test_creditable_amount() {
        let verdict: AccrualVerdict = serde_json::from_str(
            r#"{"order":"12345678903","status":"PROCESSED","accrual":729.98}"#,
        )
        .unwrap();
        assert_eq!(verdict.creditable_amount(), Some(729.98));

        let zero = AccrualVerdict::new("1", AccrualStatus::Processed, Some(0.0));
        assert!(zero.creditable_amount().is_none());

        let invalid = AccrualVerdict::new("1", AccrualStatus::Invalid, Some(10.0));
        assert!(invalid.creditable_amount().is_none());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result: Result<AccrualVerdict, _> =
            serde_json::from_str(r#"{"order":"1","status":"DONE"}"#);
        assert!(result.is_err());
    }
}
