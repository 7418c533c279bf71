//! 限流冷却闸门
//!
//! 任一 Worker 收到 429 后关闭闸门，冷却期内生成器跳过扫描、Worker 不再请求，
//! 到期自动打开。闸门只影响轮询节奏，不承载任何业务状态。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// 单次冷却的上限，对端给出更长的 Retry-After 时按上限处理
pub const MAX_COOLDOWN: Duration = Duration::from_secs(3600);

/// 生成器与所有 Worker 共享的冷却闸门
#[derive(Debug, Clone, Default)]
pub struct CooldownGate {
    closed_until: Arc<Mutex<Option<Instant>>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 关闭闸门 `duration`（不超过 [`MAX_COOLDOWN`]），已有更晚的截止时间时保持不变
    pub fn close_for(&self, duration: Duration) {
        let now = Instant::now();
        let deadline = now
            .checked_add(duration.min(MAX_COOLDOWN))
            .unwrap_or(now);
        let mut closed_until = self.closed_until.lock();
        if closed_until.is_none_or(|current| current < deadline) {
            *closed_until = Some(deadline);
        }
    }

    /// 剩余冷却时间，闸门打开时返回 None
    pub fn remaining(&self) -> Option<Duration> {
        let mut closed_until = self.closed_until.lock();
        let deadline = (*closed_until)?;
        let now = Instant::now();
        if deadline <= now {
            *closed_until = None;
            None
        } else {
            Some(deadline - now)
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gate_reopens_after_cooldown() {
        let gate = CooldownGate::new();
        assert!(gate.is_open());

        gate.close_for(Duration::from_secs(5));
        assert!(!gate.is_open());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!gate.is_open());
        assert_eq!(gate.remaining(), Some(Duration::from_secs(2)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(gate.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_close_does_not_shrink_cooldown() {
        let gate = CooldownGate::new();
        let shared = gate.clone();

        gate.close_for(Duration::from_secs(60));
        shared.close_for(Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!gate.is_open());
        assert!(!shared.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cooldown_is_capped() {
        let gate = CooldownGate::new();
        gate.close_for(Duration::MAX);
        assert_eq!(gate.remaining(), Some(MAX_COOLDOWN));

        let seconds = Duration::from_secs(u64::MAX);
        gate.close_for(seconds);
        assert_eq!(gate.remaining(), Some(MAX_COOLDOWN));

        tokio::time::advance(MAX_COOLDOWN).await;
        assert!(gate.is_open());
    }
}
