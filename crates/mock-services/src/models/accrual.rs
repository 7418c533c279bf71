//! 模拟积分计算系统的数据模型

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 积分计算系统侧的订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MockAccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// 预置的单次响应
///
/// 以 `kind` 字段区分类型，便于通过 HTTP 接口直接脚本化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MockAccrualResponse {
    /// 200 + JSON 结论
    Verdict {
        status: MockAccrualStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accrual: Option<f64>,
    },
    /// 204
    NotRegistered,
    /// 429，可选 Retry-After 秒数
    RateLimited {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// 500
    ServerError,
    /// 200 但响应体不是合法 JSON
    Malformed,
}

impl MockAccrualResponse {
    pub fn processed(accrual: f64) -> Self {
        Self::Verdict {
            status: MockAccrualStatus::Processed,
            accrual: Some(accrual),
        }
    }
}

/// 单个订单的响应脚本与访问计数
#[derive(Debug, Clone, Default)]
pub struct OrderScript {
    responses: VecDeque<MockAccrualResponse>,
    hits: usize,
}

impl OrderScript {
    /// 替换响应队列，访问计数保留
    pub fn replace(&mut self, responses: Vec<MockAccrualResponse>) {
        self.responses = responses.into();
    }

    /// 记一次访问并取出本次响应
    ///
    /// 队列只剩一条时重复返回它，空队列视为未登记
    pub fn next_response(&mut self) -> MockAccrualResponse {
        self.hits += 1;
        if self.responses.len() > 1 {
            self.responses
                .pop_front()
                .unwrap_or(MockAccrualResponse::NotRegistered)
        } else {
            self.responses
                .front()
                .cloned()
                .unwrap_or(MockAccrualResponse::NotRegistered)
        }
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// 脚本化请求体：`PUT /mock/orders/{number}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub responses: Vec<MockAccrualResponse>,
}

/// 访问计数响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitsResponse {
    pub order: String,
    pub hits: usize,
}
