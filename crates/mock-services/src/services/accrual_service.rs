//! Mock 积分计算系统
//!
//! 对外提供与真实积分计算系统一致的 `GET /api/orders/{number}`，
//! 响应内容由 `/mock/*` 管理接口按订单预置。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde_json::json;
use tracing::{debug, info};

use crate::models::{HitsResponse, MockAccrualResponse, OrderScript, ScriptRequest};
use crate::store::MemoryStore;

/// 积分计算服务状态
#[derive(Default)]
pub struct AccrualServiceState {
    pub scripts: MemoryStore<OrderScript>,
    /// 未预置订单的查询总数，不按订单号记录
    unscripted_hits: AtomicUsize,
}

impl AccrualServiceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置订单的响应队列（进程内直接调用，效果同 PUT 接口）
    pub fn script(&self, number: &str, responses: Vec<MockAccrualResponse>) {
        self.scripts
            .upsert_with(number, |script| script.replace(responses));
    }

    /// 已预置订单被查询的次数
    pub fn hits(&self, number: &str) -> usize {
        self.scripts
            .read_with(number, OrderScript::hits)
            .unwrap_or(0)
    }

    pub fn unscripted_hits(&self) -> usize {
        self.unscripted_hits.load(Ordering::Relaxed)
    }

    /// 取出本次响应；未预置的订单直接视为未登记，不创建条目
    fn next_response(&self, number: &str) -> MockAccrualResponse {
        self.scripts
            .update_with(number, OrderScript::next_response)
            .unwrap_or_else(|| {
                self.unscripted_hits.fetch_add(1, Ordering::Relaxed);
                MockAccrualResponse::NotRegistered
            })
    }

    fn reset(&self) {
        self.scripts.clear();
        self.unscripted_hits.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
// 路由定义
// ============================================================================

pub fn accrual_routes() -> Router<Arc<AccrualServiceState>> {
    Router::new()
        .route("/api/orders/{number}", get(get_order_accrual))
        .route("/mock/orders/{number}", put(script_order))
        .route("/mock/orders/{number}/hits", get(get_hits))
        .route("/mock/reset", put(reset))
}

// ============================================================================
// 路由处理器
// ============================================================================

/// GET /api/orders/{number}
async fn get_order_accrual(
    State(state): State<Arc<AccrualServiceState>>,
    Path(number): Path<String>,
) -> Response {
    let response = state.next_response(&number);
    debug!(order_number = %number, ?response, "查询订单积分");

    render(&number, response)
}

/// PUT /mock/orders/{number}
async fn script_order(
    State(state): State<Arc<AccrualServiceState>>,
    Path(number): Path<String>,
    Json(request): Json<ScriptRequest>,
) -> StatusCode {
    info!(
        order_number = %number,
        responses = request.responses.len(),
        "预置订单响应"
    );
    state.script(&number, request.responses);
    StatusCode::NO_CONTENT
}

/// GET /mock/orders/{number}/hits
async fn get_hits(
    State(state): State<Arc<AccrualServiceState>>,
    Path(number): Path<String>,
) -> Json<HitsResponse> {
    let hits = state.hits(&number);
    Json(HitsResponse {
        order: number,
        hits,
    })
}

/// PUT /mock/reset
async fn reset(State(state): State<Arc<AccrualServiceState>>) -> StatusCode {
    state.reset();
    info!("已清空所有预置响应");
    StatusCode::NO_CONTENT
}

fn render(number: &str, response: MockAccrualResponse) -> Response {
    match response {
        MockAccrualResponse::Verdict { status, accrual } => {
            let mut body = json!({ "order": number, "status": status });
            if let Some(accrual) = accrual {
                body["accrual"] = json!(accrual);
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        MockAccrualResponse::NotRegistered => StatusCode::NO_CONTENT.into_response(),
        MockAccrualResponse::RateLimited { retry_after_secs } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                "No more than N requests per minute allowed",
            )
                .into_response();
            if let Some(secs) = retry_after_secs {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            response
        }
        MockAccrualResponse::ServerError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
        MockAccrualResponse::Malformed => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            "{not json",
        )
            .into_response(),
    }
}

// ============================================================================
// 单元测试
// ============================================================================
