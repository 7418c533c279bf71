//! Mock 积分计算系统命令行入口

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mock_services::services::AccrualServiceState;
use tokio::net::TcpListener;
use tracing::info;

/// Mock 积分计算系统
#[derive(Parser, Debug)]
#[command(name = "mock-accrual")]
#[command(version, about = "积分计算系统模拟服务")]
struct Cli {
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// 监听端口
    #[arg(short, long, default_value = "8081")]
    port: u16,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数指定的级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .context("监听地址无效")?;
    let listener = TcpListener::bind(addr).await.context("绑定端口失败")?;

    info!("Mock 积分计算服务已启动: http://{}", addr);
    info!("  GET /api/orders/{{number}} - 查询订单积分");
    info!("  PUT /mock/orders/{{number}} - 预置响应");
    info!("  GET /mock/orders/{{number}}/hits - 查询访问次数");
    info!("按 Ctrl+C 停止服务");

    let state = Arc::new(AccrualServiceState::new());
    mock_services::server::serve(listener, state, shutdown_signal()).await?;

    info!("Mock 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("安装 CTRL+C 信号处理器失败");
    info!("收到关闭信号，正在停止服务...");
}
