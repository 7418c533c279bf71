//! 积分订单对账服务
//!
//! 用户上传的订单需要到外部积分计算系统查询结论，确认后给用户入账。
//! 本 crate 负责其中的后台对账部分。
//!
//! ## 模块结构
//!
//! - `models`: 订单、用户、扣减流水
//! - `error`: 存储与外部调用的错误类型
//! - `repository`: 订单存储（PostgreSQL / 内存）
//! - `accrual`: 积分计算系统客户端与限流冷却闸门
//! - `reconciler`: 生成器 + Worker 池组成的对账流水线

pub mod accrual;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod repository;
