//! 脚本化积分计算客户端
//!
//! 按订单号预置响应队列，依次返回，队列只剩最后一条时重复返回它。
//! 未预置的订单一律视为未登记。用于流水线的确定性测试和本地演练。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::AccrualClient;
use super::verdict::{AccrualStatus, AccrualVerdict};
use crate::error::AccrualError;

/// 预置的单次响应
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    Verdict {
        status: AccrualStatus,
        accrual: Option<f64>,
    },
    NotRegistered,
    RateLimited {
        retry_after: Option<Duration>,
    },
    Transient,
}

impl ScriptedResponse {
    pub fn processed(amount: f64) -> Self {
        Self::Verdict {
            status: AccrualStatus::Processed,
            accrual: Some(amount),
        }
    }

    pub fn status(status: AccrualStatus) -> Self {
        Self::Verdict {
            status,
            accrual: None,
        }
    }

    fn into_result(self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        match self {
            Self::Verdict { status, accrual } => Ok(AccrualVerdict::new(number, status, accrual)),
            Self::NotRegistered => Err(AccrualError::NotRegistered {
                number: number.to_string(),
            }),
            Self::RateLimited { retry_after } => Err(AccrualError::RateLimited { retry_after }),
            Self::Transient => Err(AccrualError::TransientFailure("scripted failure".to_string())),
        }
    }
}

/// 脚本化客户端
#[derive(Debug, Default)]
pub struct ScriptedAccrualClient {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    hits: Mutex<HashMap<String, usize>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAccrualClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用前等待 `latency`，模拟外部系统耗时
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 追加订单的响应序列
    pub fn script(&self, number: &str, responses: impl IntoIterator<Item = ScriptedResponse>) {
        self.scripts
            .lock()
            .entry(number.to_string())
            .or_default()
            .extend(responses);
    }

    /// 某订单被查询的次数
    pub fn hits(&self, number: &str) -> usize {
        self.hits.lock().get(number).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().values().sum()
    }

    /// 观测到的最大并发调用数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, number: &str) -> ScriptedResponse {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(number) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(ScriptedResponse::NotRegistered),
            Some(queue) => queue.front().cloned().unwrap_or(ScriptedResponse::NotRegistered),
            None => ScriptedResponse::NotRegistered,
        }
    }
}

/// 调用结束（包括被取消）时归还并发计数
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccrualClient for ScriptedAccrualClient {
    async fn fetch(&self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        *self.hits.lock().entry(number.to_string()).or_default() += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.next_response(number).into_result(number)
    }
}
