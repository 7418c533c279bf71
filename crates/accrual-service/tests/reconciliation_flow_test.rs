//! 对账流水线集成测试
//!
//! 内存存储 + 脚本化客户端，无需外部依赖

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use accrual_service::accrual::{AccrualStatus, ScriptedAccrualClient, ScriptedResponse};
use accrual_service::error::StoreError;
use accrual_service::models::{OrderStatus, OrderSubmission};
use accrual_service::reconciler::{ReconcilerConfig, ReconciliationHandle, ReconciliationService};
use accrual_service::repository::{MemoryOrderStore, OrderStore};
use tokio::sync::watch;

// ==================== 测试辅助 ====================

struct Pipeline {
    store: Arc<MemoryOrderStore>,
    client: Arc<ScriptedAccrualClient>,
    service: ReconciliationService,
}

impl Pipeline {
    fn new(client: ScriptedAccrualClient, workers: usize, poll_interval: Duration) -> Self {
        let store = Arc::new(MemoryOrderStore::new());
        let client = Arc::new(client);
        let service = ReconciliationService::new(
            store.clone(),
            client.clone(),
            ReconcilerConfig {
                poll_interval,
                workers,
                rate_limit_cooldown: Duration::from_secs(60),
            },
        );
        Self {
            store,
            client,
            service,
        }
    }

    fn start(&self) -> (watch::Sender<bool>, ReconciliationHandle) {
        let (tx, rx) = watch::channel(false);
        let handle = self.service.run(rx);
        (tx, handle)
    }

    async fn status(&self, number: &str) -> OrderStatus {
        self.store.get_order(number).await.unwrap().unwrap().status
    }
}

/// 轮询直到条件成立，超时则测试失败
async fn wait_until<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "等待条件超时");
}

async fn stop(tx: watch::Sender<bool>, handle: ReconciliationHandle) {
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("流水线未能按时退出");
}

// ==================== 测试用例 ====================

#[tokio::test]
async fn test_end_to_end_credit_and_withdraw() {
    let client = ScriptedAccrualClient::new();
    client.script("123456789049", [ScriptedResponse::processed(100.0)]);
    let pipeline = &Pipeline::new(client, 2, Duration::from_millis(20));

    let user = pipeline.store.register_user("alice", "hash").await.unwrap();
    assert_eq!(
        pipeline
            .store
            .create_new_order("123456789049", user.id)
            .await
            .unwrap(),
        OrderSubmission::Accepted
    );

    let (tx, handle) = pipeline.start();
    wait_until(Duration::from_secs(2), move || async move {
        pipeline.status("123456789049").await == OrderStatus::Processed
    })
    .await;
    stop(tx, handle).await;

    let order = pipeline.store.get_order("123456789049").await.unwrap().unwrap();
    assert_eq!(order.accrual, Some(100.0));
    assert_eq!(pipeline.store.get_balance(user.id).await.unwrap().current, 100.0);

    pipeline
        .store
        .create_withdrawal(user.id, "2377225624", 50.0)
        .await
        .unwrap();
    let balance = pipeline.store.get_balance(user.id).await.unwrap();
    assert_eq!(balance.current, 50.0);
    assert_eq!(balance.withdrawn, 50.0);

    let err = pipeline
        .store
        .create_withdrawal(user.id, "2377225624", 100.0)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InsufficientBalance { .. }));
    assert_eq!(pipeline.store.get_balance(user.id).await.unwrap().current, 50.0);
    assert_eq!(
        pipeline.store.list_withdrawals_by_user(user.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_submission_conflicts_leave_balance_untouched() {
    let store = MemoryOrderStore::new();
    let alice = store.register_user("alice", "hash").await.unwrap();
    let bob = store.register_user("bob", "hash").await.unwrap();

    store.create_new_order("123456789049", alice.id).await.unwrap();

    let err = store
        .create_new_order("123456789049", bob.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "OWNED_BY_ANOTHER_USER");

    assert_eq!(
        store.create_new_order("123456789049", alice.id).await.unwrap(),
        OrderSubmission::AlreadySubmitted
    );
    assert_eq!(store.get_balance(alice.id).await.unwrap().current, 0.0);
    assert_eq!(store.list_orders_by_user(bob.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_backpressure_processes_all_orders() {
    let client = ScriptedAccrualClient::new().with_latency(Duration::from_millis(15));
    let numbers: Vec<String> = (0..10).map(|i| format!("10000000{i:02}")).collect();
    for number in &numbers {
        client.script(number, [ScriptedResponse::processed(10.0)]);
    }
    let pipeline = &Pipeline::new(client, 2, Duration::from_millis(20));

    let user = pipeline.store.register_user("alice", "hash").await.unwrap();
    for number in &numbers {
        pipeline.store.create_new_order(number, user.id).await.unwrap();
    }

    let (tx, handle) = pipeline.start();
    wait_until(Duration::from_secs(5), move || async move {
        pipeline
            .store
            .get_orders_awaiting_verdict()
            .await
            .unwrap()
            .is_empty()
    })
    .await;
    stop(tx, handle).await;

    assert!(pipeline.client.max_in_flight() <= 2);
    for number in &numbers {
        assert!(pipeline.client.hits(number) >= 1);
        assert_eq!(pipeline.status(number).await, OrderStatus::Processed);
    }
    // 重复投递不会重复入账
    assert_eq!(pipeline.store.get_balance(user.id).await.unwrap().current, 100.0);
}

#[tokio::test]
async fn test_repeated_delivery_credits_once() {
    // 扫描间隔远小于查询耗时，同一订单会被多次投递
    let client = ScriptedAccrualClient::new().with_latency(Duration::from_millis(40));
    client.script("12345678903", [ScriptedResponse::processed(250.5)]);
    let pipeline = &Pipeline::new(client, 4, Duration::from_millis(5));

    let user = pipeline.store.register_user("alice", "hash").await.unwrap();
    pipeline
        .store
        .create_new_order("12345678903", user.id)
        .await
        .unwrap();

    let (tx, handle) = pipeline.start();
    wait_until(Duration::from_secs(2), move || async move {
        pipeline.status("12345678903").await == OrderStatus::Processed
    })
    .await;
    // 让仍在途的重复查询完成写入尝试
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop(tx, handle).await;

    assert_eq!(pipeline.store.get_balance(user.id).await.unwrap().current, 250.5);
}

#[tokio::test]
async fn test_verdict_mapping_across_cycles() {
    let client = ScriptedAccrualClient::new();
    client.script(
        "111",
        [
            ScriptedResponse::NotRegistered,
            ScriptedResponse::status(AccrualStatus::Registered),
            ScriptedResponse::Transient,
            ScriptedResponse::status(AccrualStatus::Processing),
            ScriptedResponse::processed(42.0),
        ],
    );
    client.script("222", [ScriptedResponse::status(AccrualStatus::Invalid)]);
    client.script(
        "333",
        [ScriptedResponse::Verdict {
            status: AccrualStatus::Processed,
            accrual: None,
        }],
    );
    let pipeline = &Pipeline::new(client, 2, Duration::from_millis(10));

    let user = pipeline.store.register_user("alice", "hash").await.unwrap();
    for number in ["111", "222", "333", "444"] {
        pipeline.store.create_new_order(number, user.id).await.unwrap();
    }

    let (tx, handle) = pipeline.start();
    wait_until(Duration::from_secs(3), move || async move {
        pipeline.status("111").await == OrderStatus::Processed
            && pipeline.status("222").await == OrderStatus::Invalid
            && pipeline.status("333").await == OrderStatus::Processed
    })
    .await;
    stop(tx, handle).await;

    assert!(pipeline.client.hits("111") >= 5);
    assert_eq!(pipeline.client.hits("222"), 1);
    // 未登记的订单保持 NEW，持续被查询
    assert_eq!(pipeline.status("444").await, OrderStatus::New);
    assert!(pipeline.client.hits("444") >= 2);

    let no_points = pipeline.store.get_order("333").await.unwrap().unwrap();
    assert_eq!(no_points.accrual, None);
    assert_eq!(pipeline.store.get_balance(user.id).await.unwrap().current, 42.0);
}

#[tokio::test]
async fn test_rate_limit_pauses_polling() {
    let client = ScriptedAccrualClient::new();
    client.script(
        "12345678903",
        [
            ScriptedResponse::RateLimited {
                retry_after: Some(Duration::from_millis(500)),
            },
            ScriptedResponse::processed(10.0),
        ],
    );
    let pipeline = &Pipeline::new(client, 2, Duration::from_millis(10));

    let user = pipeline.store.register_user("alice", "hash").await.unwrap();
    pipeline
        .store
        .create_new_order("12345678903", user.id)
        .await
        .unwrap();

    let (tx, handle) = pipeline.start();
    wait_until(Duration::from_secs(1), move || async move {
        pipeline.client.hits("12345678903") >= 1
    })
    .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pipeline.client.hits("12345678903"), 1);
    assert!(!pipeline.service.gate().is_open());

    wait_until(Duration::from_secs(3), move || async move {
        pipeline.status("12345678903").await == OrderStatus::Processed
    })
    .await;
    stop(tx, handle).await;

    assert_eq!(pipeline.store.get_balance(user.id).await.unwrap().current, 10.0);
}

#[tokio::test]
async fn test_shutdown_drains_with_calls_in_flight() {
    let client = ScriptedAccrualClient::new().with_latency(Duration::from_millis(300));
    let pipeline = &Pipeline::new(client, 1, Duration::from_millis(10));

    let user = pipeline.store.register_user("alice", "hash").await.unwrap();
    for i in 0..5 {
        pipeline
            .store
            .create_new_order(&format!("5000{i}"), user.id)
            .await
            .unwrap();
    }

    let (tx, handle) = pipeline.start();
    // 唯一的 Worker 正在查询，生成器阻塞在发送上
    wait_until(Duration::from_secs(1), move || async move {
        pipeline.client.total_hits() >= 1
    })
    .await;

    stop(tx, handle).await;
    assert!(pipeline.client.total_hits() <= 2);
}
