//! 内存存储
//!
//! 使用 DashMap 实现的并发内存存储，按 key 分片加锁。

use std::sync::Arc;

use dashmap::DashMap;

/// 通用内存存储
///
/// 克隆后共享同一份数据，可直接放进 axum 的路由状态
#[derive(Debug)]
pub struct MemoryStore<T> {
    data: Arc<DashMap<String, T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    /// 在 key 对应的条目上原地执行 `f`，条目不存在时先用默认值创建
    ///
    /// 整个读改写期间持有该 key 的分片锁
    pub fn upsert_with<R>(&self, id: &str, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default,
    {
        let mut entry = self.data.entry(id.to_string()).or_default();
        f(entry.value_mut())
    }

    /// 在已有条目上原地执行 `f`，不存在时返回 None 且不创建条目
    pub fn update_with<R>(&self, id: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.data.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }

    /// 只读访问，不存在时返回 None
    pub fn read_with<R>(&self, id: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.data.get(id).map(|entry| f(entry.value()))
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}
