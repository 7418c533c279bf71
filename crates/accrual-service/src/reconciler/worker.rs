//! 对账 Worker
//!
//! 多个 Worker 共享同一个通道接收端，逐个取出订单、查询积分计算系统
//! 并把结论写回订单存储。单个订单的任何失败都只影响该订单本轮的处理。

use std::sync::Arc;
use std::time::Duration;

use loyalty_shared::observability::metrics;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use super::wait_for_shutdown;
use crate::accrual::{AccrualClient, AccrualStatus, AccrualVerdict, CooldownGate};
use crate::error::AccrualError;
use crate::models::{Order, OrderStatus};
use crate::repository::OrderStore;

/// 单个订单的处理逻辑，所有 Worker 共用一份
pub(crate) struct OrderProcessor {
    store: Arc<dyn OrderStore>,
    client: Arc<dyn AccrualClient>,
    gate: CooldownGate,
    rate_limit_cooldown: Duration,
}

impl OrderProcessor {
    pub(crate) fn new(
        store: Arc<dyn OrderStore>,
        client: Arc<dyn AccrualClient>,
        gate: CooldownGate,
        rate_limit_cooldown: Duration,
    ) -> Self {
        Self {
            store,
            client,
            gate,
            rate_limit_cooldown,
        }
    }

    pub(crate) async fn process(&self, order: &Order) {
        if let Some(remaining) = self.gate.remaining() {
            debug!(order_number = %order.number, ?remaining, "冷却中，订单留待后续周期");
            return;
        }

        match self.client.fetch(&order.number).await {
            Ok(verdict) => self.apply(order, &verdict).await,
            Err(AccrualError::RateLimited { retry_after }) => {
                let cooldown = retry_after.unwrap_or(self.rate_limit_cooldown);
                self.gate.close_for(cooldown);
                metrics::record_cooldown();
                warn!(
                    order_number = %order.number,
                    ?cooldown,
                    "积分计算系统限流，暂停轮询"
                );
            }
            Err(e @ AccrualError::NotRegistered { .. }) => {
                debug!(order_number = %order.number, error = %e, "订单尚未登记，下轮再查");
            }
            Err(e) => {
                warn!(order_number = %order.number, error = %e, "查询积分计算系统失败，下轮再查");
            }
        }
    }

    async fn apply(&self, order: &Order, verdict: &AccrualVerdict) {
        let number = order.number.as_str();
        if verdict.order != number {
            warn!(
                order_number = %number,
                verdict_order = %verdict.order,
                "响应中的订单号与请求不一致，忽略本次结论"
            );
            return;
        }

        let credit = verdict.creditable_amount();

        let target = match verdict.status {
            AccrualStatus::Registered | AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        };

        // 快照已是 PROCESSING 时无需重复写入
        if target == OrderStatus::Processing && order.status == OrderStatus::Processing {
            debug!(order_number = %number, "状态未变化，跳过写入");
            return;
        }

        let result = match credit {
            Some(amount) => {
                self.store
                    .set_order_processed_and_credit_balance(number, amount)
                    .await
            }
            None => self.store.update_order_status(number, target).await,
        };

        match result {
            Ok(outcome) => {
                metrics::record_order_transition(target.as_str(), outcome.as_label());
                if outcome.is_applied() {
                    if let Some(amount) = credit {
                        metrics::record_points_credited(amount);
                    }
                    info!(
                        order_number = %number,
                        status = %target,
                        accrual = ?credit,
                        "订单状态已更新"
                    );
                } else {
                    debug!(
                        order_number = %number,
                        outcome = outcome.as_label(),
                        "订单状态未变更"
                    );
                }
            }
            Err(e) => {
                metrics::record_order_transition(target.as_str(), "error");
                error!(
                    order_number = %number,
                    status = %target,
                    error = %e,
                    retryable = e.is_retryable(),
                    "写入订单状态失败"
                );
            }
        }
    }
}

/// Worker 任务
pub(crate) struct Worker {
    id: usize,
    processor: Arc<OrderProcessor>,
    receiver: Arc<Mutex<mpsc::Receiver<Order>>>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        processor: Arc<OrderProcessor>,
        receiver: Arc<Mutex<mpsc::Receiver<Order>>>,
    ) -> Self {
        Self {
            id,
            processor,
            receiver,
        }
    }

    /// 通道关闭或收到关闭信号时返回；进行中的订单会处理完
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id = self.id, "对账 Worker 已启动");

        loop {
            let order = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => break,
                order = self.next_order() => match order {
                    Some(order) => order,
                    None => break,
                },
            };

            self.processor.process(&order).await;
            metrics::set_worker_last_run("reconciler_worker");
        }

        debug!(worker_id = self.id, "对账 Worker 已停止");
    }

    async fn next_order(&self) -> Option<Order> {
        self.receiver.lock().await.recv().await
    }
}
