//! 积分服务错误类型
//!
//! 分两类：
//! - `StoreError`: 订单存储层的业务冲突与存储故障
//! - `AccrualError`: 积分计算系统调用失败，决定 Worker 的退避行为

use std::time::Duration;

use thiserror::Error;

/// 订单存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: &'static str, id: String },

    /// 订单号已被其他用户上传，需要反馈给当前上传者
    #[error("订单号已被其他用户上传: {number}")]
    OwnedByAnotherUser { number: String },

    #[error("用户名已存在: {name}")]
    UserAlreadyExists { name: String },

    #[error("积分余额不足: 需要 {required}, 可用 {available}")]
    InsufficientBalance { required: f64, available: f64 },

    /// 金额为负（入账）或非正（扣减），属于调用方编程错误
    #[error("非法金额: {0}")]
    InvalidAmount(f64),

    /// 数据库不可用或执行失败，当前轮次放弃，流水线继续
    #[error("存储不可用: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

/// 存储层 Result 类型别名
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::OwnedByAnotherUser { .. } => "OWNED_BY_ANOTHER_USER",
            Self::UserAlreadyExists { .. } => "USER_ALREADY_EXISTS",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    pub(crate) fn order_not_found(number: &str) -> Self {
        Self::NotFound {
            entity: "order",
            id: number.to_string(),
        }
    }

    pub(crate) fn user_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "user",
            id: id.to_string(),
        }
    }
}

/// 积分计算系统调用错误
///
/// 客户端内部不做重试，重试节奏由生成器的轮询周期决定
#[derive(Debug, Error)]
pub enum AccrualError {
    /// 204：订单尚未在积分计算系统登记，下个周期再查
    #[error("订单未在积分计算系统登记: {number}")]
    NotRegistered { number: String },

    /// 429：请求过于频繁，需要冷却
    #[error("积分计算系统限流, retry_after={retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx、未知状态码、网络故障或响应无法解析
    #[error("积分计算系统暂时不可用: {0}")]
    TransientFailure(String),
}

impl AccrualError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotRegistered { .. } => "NOT_REGISTERED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::TransientFailure(_) => "TRANSIENT_FAILURE",
        }
    }

    /// 指标标签
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::NotRegistered { .. } => "not_registered",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransientFailure(_) => "transient",
        }
    }
}

impl From<reqwest::Error> for AccrualError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TransientFailure(format!("请求超时: {err}"))
        } else if err.is_decode() {
            Self::TransientFailure(format!("响应解析失败: {err}"))
        } else {
            Self::TransientFailure(err.to_string())
        }
    }
}
