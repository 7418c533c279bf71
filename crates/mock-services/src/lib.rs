//! Mock Services
//!
//! 模拟外部积分计算系统，用于本地开发和 HTTP 客户端测试。
//!
//! # 主要模块
//!
//! - `models`: 预置响应与访问计数
//! - `store`: 内存存储实现
//! - `services`: axum 路由与处理器
//! - `server`: 应用装配与启动
//!
//! # 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use mock_services::models::MockAccrualResponse;
//! use mock_services::services::AccrualServiceState;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let state = Arc::new(AccrualServiceState::new());
//! state.script("12345678903", vec![MockAccrualResponse::processed(100.0)]);
//!
//! let (addr, _handle) = mock_services::server::spawn(([127, 0, 0, 1], 0).into(), state).await?;
//! println!("base url: http://{addr}");
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod server;
pub mod services;
pub mod store;
