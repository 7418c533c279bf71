//! 待处理订单生成器
//!
//! 固定间隔扫描 NEW / PROCESSING 订单，按上传时间从早到晚送入有界通道。
//! 通道满时在发送处挂起，形成对扫描节奏的背压。同一订单可能在多个周期
//! 被重复投递，安全性由存储层的幂等迁移保证。

use std::sync::Arc;
use std::time::Duration;

use loyalty_shared::observability::metrics;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::wait_for_shutdown;
use crate::accrual::CooldownGate;
use crate::models::Order;
use crate::repository::OrderStore;

/// 单轮扫描的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// 本轮送出的订单数
    Emitted(usize),
    /// 冷却中，跳过本轮
    CoolingDown,
    /// 查询失败，跳过本轮
    StoreUnavailable,
    /// 收到关闭信号或 Worker 已全部退出
    Stopped,
}

pub(crate) struct Generator {
    store: Arc<dyn OrderStore>,
    gate: CooldownGate,
    poll_interval: Duration,
    sender: mpsc::Sender<Order>,
}

impl Generator {
    pub(crate) fn new(
        store: Arc<dyn OrderStore>,
        gate: CooldownGate,
        poll_interval: Duration,
        sender: mpsc::Sender<Order>,
    ) -> Self {
        Self {
            store,
            gate,
            poll_interval,
            sender,
        }
    }

    /// 主循环，返回时释放通道发送端
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(poll_interval = ?self.poll_interval, "订单生成器已启动");

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            if self.run_cycle(&mut shutdown).await == CycleOutcome::Stopped {
                break;
            }
        }

        info!("订单生成器已停止");
    }

    pub(crate) async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        if let Some(remaining) = self.gate.remaining() {
            debug!(?remaining, "积分计算系统冷却中，跳过本轮扫描");
            metrics::record_generator_cycle("cooldown", 0);
            return CycleOutcome::CoolingDown;
        }

        let query = tokio::select! {
            biased;

            _ = wait_for_shutdown(shutdown) => return CycleOutcome::Stopped,
            result = self.store.get_orders_awaiting_verdict() => result,
        };

        let orders = match query {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "查询待处理订单失败，跳过本轮");
                metrics::record_generator_cycle("store_error", 0);
                return CycleOutcome::StoreUnavailable;
            }
        };

        let mut emitted = 0;
        for order in orders {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(shutdown) => {
                    metrics::record_generator_cycle("interrupted", emitted);
                    return CycleOutcome::Stopped;
                }
                sent = self.sender.send(order) => {
                    if sent.is_err() {
                        warn!("所有 Worker 已退出，生成器停止");
                        return CycleOutcome::Stopped;
                    }
                    emitted += 1;
                }
            }
        }

        debug!(emitted, "本轮扫描完成");
        metrics::record_generator_cycle("ok", emitted);
        CycleOutcome::Emitted(emitted)
    }
}
