//! 积分计算系统 HTTP 客户端
//!
//! 通过 AccrualClient trait 抽象外部调用，Worker 只依赖 trait，
//! 测试时注入 mock 或脚本化实现。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use loyalty_shared::config::AccrualConfig;
use loyalty_shared::observability::metrics;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, instrument};

use super::gate::MAX_COOLDOWN;
use super::verdict::AccrualVerdict;
use crate::error::AccrualError;

// ---------------------------------------------------------------------------
// Trait 抽象
// ---------------------------------------------------------------------------

/// 积分计算系统查询接口
///
/// 一次调用对应一次 HTTP 请求，不做任何重试
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// 查询订单的积分计算结论
    async fn fetch(&self, number: &str) -> Result<AccrualVerdict, AccrualError>;
}

// ---------------------------------------------------------------------------
// reqwest 实现
// ---------------------------------------------------------------------------

/// 基于 reqwest 的积分计算系统客户端
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// `base_url` 需已规范化（带协议、无尾部斜杠）
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, AccrualError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &AccrualConfig) -> Result<Self, AccrualError> {
        Self::new(config.normalized_base_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);

        let mut trace_headers = HashMap::new();
        loyalty_shared::observability::tracing::inject_to_headers(&mut trace_headers);

        let mut request = self.http.get(&url);
        for (name, value) in trace_headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(%status, "积分计算系统响应");

        match status {
            StatusCode::OK => Ok(response.json::<AccrualVerdict>().await?),
            StatusCode::NO_CONTENT => Err(AccrualError::NotRegistered {
                number: number.to_string(),
            }),
            StatusCode::TOO_MANY_REQUESTS => Err(AccrualError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            }),
            other => Err(AccrualError::TransientFailure(format!(
                "意外的响应状态码: {other}"
            ))),
        }
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    #[instrument(skip(self), fields(order_number = %number))]
    async fn fetch(&self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        let started = Instant::now();
        let result = self.request(number).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.as_label(),
        };
        metrics::record_accrual_request(outcome, started.elapsed().as_secs_f64());

        result
    }
}

/// 解析 Retry-After 头，只支持秒数形式，超过 [`MAX_COOLDOWN`] 时截断
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_COOLDOWN))
}
