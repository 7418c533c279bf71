//! 积分计算系统接入
//!
//! - `client`: AccrualClient trait 与 reqwest 实现
//! - `scripted`: 按订单预置响应的实现
//! - `gate`: 429 限流后的共享冷却闸门

mod client;
mod gate;
mod scripted;
mod verdict;

pub use client::{AccrualClient, HttpAccrualClient};
pub use gate::{CooldownGate, MAX_COOLDOWN};
pub use scripted::{ScriptedAccrualClient, ScriptedResponse};
pub use verdict::{AccrualStatus, AccrualVerdict};

#[cfg(test)]
pub use client::MockAccrualClient;
