//! 积分订单对账服务入口

use std::sync::Arc;

use accrual_service::{
    accrual::HttpAccrualClient,
    reconciler::{ReconcilerConfig, ReconciliationService},
    repository::{MIGRATOR, MemoryOrderStore, OrderStore, PgOrderStore},
};
use anyhow::Result;
use loyalty_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load("accrual-service").unwrap_or_else(|e| {
        eprintln!("配置加载失败，使用默认配置: {e}");
        AppConfig::default()
    });

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting accrual-service...");
    config.validate()?;

    // 3. 订单存储：连接或迁移失败直接退出
    let (store, db): (Arc<dyn OrderStore>, Option<Database>) = if config.database.url.is_empty() {
        warn!("未配置数据库地址，使用内存存储，数据不会持久化");
        (Arc::new(MemoryOrderStore::new()), None)
    } else {
        let db = Database::connect(&config.database).await?;
        db.run_migrations(&MIGRATOR).await?;
        db.health_check().await?;
        (Arc::new(PgOrderStore::new(db.pool().clone())), Some(db))
    };

    // 4. 积分计算系统客户端
    let client = HttpAccrualClient::from_config(&config.accrual)?;
    info!(base_url = %client.base_url(), "Accrual client initialized");

    // 5. 启动对账流水线
    let service = ReconciliationService::new(
        store,
        Arc::new(client),
        ReconcilerConfig::from(&config.accrual),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = service.run(shutdown_rx);

    // 6. 等待退出信号并排空
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    handle.wait().await;

    if let Some(db) = db {
        db.close().await;
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
