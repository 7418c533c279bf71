//! 对账服务
//!
//! 启动一个生成器和 N 个 Worker，通过容量为 N 的有界通道连接。
//! `run` 立即返回句柄，调用方通过 watch 信号通知关闭，再用句柄等待排空。

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use loyalty_shared::config::AccrualConfig;
use loyalty_shared::observability::metrics;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::generator::Generator;
use super::worker::{OrderProcessor, Worker};
use crate::accrual::{AccrualClient, CooldownGate};
use crate::repository::OrderStore;

/// 对账流水线参数
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// 生成器扫描间隔
    pub poll_interval: Duration,
    /// Worker 数量，同时也是通道容量
    pub workers: usize,
    /// 429 未携带 Retry-After 时的冷却时长
    pub rate_limit_cooldown: Duration,
}

impl From<&AccrualConfig> for ReconcilerConfig {
    fn from(config: &AccrualConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            workers: config.worker_count(),
            rate_limit_cooldown: config.rate_limit_cooldown(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from(&AccrualConfig::default())
    }
}

/// 订单对账服务
pub struct ReconciliationService {
    store: Arc<dyn OrderStore>,
    client: Arc<dyn AccrualClient>,
    config: ReconcilerConfig,
    gate: CooldownGate,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        client: Arc<dyn AccrualClient>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            client,
            config,
            gate: CooldownGate::new(),
        }
    }

    /// 限流冷却闸门
    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// 启动生成器和 Worker，立即返回
    ///
    /// 必须在 tokio 运行时内调用。`shutdown` 变为 `true`（或发送端被丢弃）后
    /// 所有任务尽快退出：挂起的发送和接收立即解除，进行中的外部调用自然完成
    /// 或触发请求超时。
    pub fn run(&self, shutdown: watch::Receiver<bool>) -> ReconciliationHandle {
        let workers = self.config.workers.max(1);
        let (sender, receiver) = mpsc::channel(workers);
        let receiver = Arc::new(Mutex::new(receiver));

        let processor = Arc::new(OrderProcessor::new(
            self.store.clone(),
            self.client.clone(),
            self.gate.clone(),
            self.config.rate_limit_cooldown,
        ));

        let mut tasks = Vec::with_capacity(workers + 1);

        let generator = Generator::new(
            self.store.clone(),
            self.gate.clone(),
            self.config.poll_interval,
            sender,
        );
        tasks.push(tokio::spawn(generator.run(shutdown.clone())));

        for id in 0..workers {
            let worker = Worker::new(id, processor.clone(), receiver.clone());
            tasks.push(tokio::spawn(worker.run(shutdown.clone())));
        }

        metrics::set_reconciler_workers(workers);
        info!(
            workers,
            poll_interval = ?self.config.poll_interval,
            "订单对账服务已启动"
        );

        ReconciliationHandle { tasks }
    }
}

/// 运行中的对账流水线
#[must_use = "丢弃句柄后无法等待流水线排空"]
pub struct ReconciliationHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl ReconciliationHandle {
    /// 所有任务是否已退出
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// 等待生成器和全部 Worker 退出
    pub async fn wait(self) {
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "对账任务异常退出");
            }
        }
        info!("订单对账服务已停止");
    }
}
