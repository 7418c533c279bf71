//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标
///
/// 描述信息会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "accrual_requests_total",
        "Total number of requests to the accrual authority"
    );
    metrics::describe_histogram!(
        "accrual_request_duration_seconds",
        "Accrual authority request duration in seconds"
    );

    metrics::describe_counter!(
        "order_transitions_total",
        "Total number of order state transitions attempted by workers"
    );
    metrics::describe_counter!(
        "points_credited_total",
        "Total loyalty points credited to user balances"
    );

    metrics::describe_histogram!(
        "generator_cycle_orders",
        "Number of orders emitted per generator cycle"
    );
    metrics::describe_counter!(
        "generator_cycles_total",
        "Total number of generator cycles by outcome"
    );

    metrics::describe_counter!(
        "accrual_cooldowns_total",
        "Number of times the rate-limit cooldown gate was closed"
    );

    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last completed iteration per worker"
    );
    metrics::describe_gauge!("reconciler_workers", "Configured reconciliation worker count");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次积分计算系统请求
///
/// outcome 取值：ok / not_registered / rate_limited / transient
#[inline]
pub fn record_accrual_request(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("accrual_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("accrual_request_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}

/// 记录订单状态迁移结果
#[inline]
pub fn record_order_transition(target_status: &'static str, outcome: &'static str) {
    metrics::counter!(
        "order_transitions_total",
        "status" => target_status,
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录入账积分
#[inline]
pub fn record_points_credited(amount: f64) {
    metrics::counter!("points_credited_total").increment(amount.max(0.0).round() as u64);
}

/// 记录一次生成器轮询
#[inline]
pub fn record_generator_cycle(outcome: &'static str, emitted: usize) {
    metrics::counter!("generator_cycles_total", "outcome" => outcome).increment(1);
    metrics::histogram!("generator_cycle_orders").record(emitted as f64);
}

/// 记录冷却闸门关闭
#[inline]
pub fn record_cooldown() {
    metrics::counter!("accrual_cooldowns_total").increment(1);
}

/// 记录 Worker 最近一次运行时间，供告警判断 Worker 是否存活
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string()).set(now);
}

/// 记录 Worker 池大小
#[inline]
pub fn set_reconciler_workers(count: usize) {
    metrics::gauge!("reconciler_workers").set(count as f64);
}
