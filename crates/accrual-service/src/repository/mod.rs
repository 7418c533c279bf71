//! 数据访问层
//!
//! `OrderStore` 是订单、余额、扣减流水的唯一入口：
//! - `PgOrderStore`: 生产实现，依赖行锁保证跨实例的原子迁移
//! - `MemoryOrderStore`: 单进程实现，测试与本地开发使用

mod memory_store;
mod pg_store;
mod traits;

pub use memory_store::MemoryOrderStore;
pub use pg_store::{MIGRATOR, PgOrderStore};
pub use traits::OrderStore;

#[cfg(test)]
pub use traits::MockOrderStore;
