//! 订单对账流水线
//!
//! 生成器 → 有界通道 → Worker 池 → 订单存储

mod generator;
mod service;
mod worker;

use tokio::sync::watch;

pub use service::{ReconcilerConfig, ReconciliationHandle, ReconciliationService};

/// 等待关闭信号，发送端被丢弃同样视为关闭
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
