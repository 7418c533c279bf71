//! Mock 服务的 HTTP 装配与启动

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::services::{AccrualServiceState, accrual_routes};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// 组装完整应用：健康检查 + 积分计算接口
pub fn build_app(state: Arc<AccrualServiceState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(accrual_routes().with_state(state))
        .layer(TraceLayer::new_for_http())
}

/// 在已绑定的监听器上运行，直到 `shutdown` 完成
pub async fn serve<F>(listener: TcpListener, state: Arc<AccrualServiceState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("服务器运行失败")
}

/// 绑定地址并在后台运行，返回实际监听地址
///
/// 端口传 0 时由系统分配，供集成测试使用
pub async fn spawn(addr: SocketAddr, state: Arc<AccrualServiceState>) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await.context("绑定端口失败")?;
    let local_addr = listener.local_addr().context("读取监听地址失败")?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state, std::future::pending()).await {
            error!(error = %e, "Mock 积分计算服务异常退出");
        }
    });

    info!("Mock 积分计算服务已启动: http://{}", local_addr);
    Ok((local_addr, handle))
}
