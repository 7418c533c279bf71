//! 模拟数据模型

pub mod accrual;

pub use accrual::{HitsResponse, MockAccrualResponse, MockAccrualStatus, OrderScript, ScriptRequest};
