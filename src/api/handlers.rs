//! API Request Handlers
//!
//! Thin glue over the Coordinator; every pipeline error surfaces with its
//! unique code and the matching HTTP status.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::types::*;
use crate::coordinator::Coordinator;
use crate::models::{AppError, Token};
use crate::sources::DexScreenerClient;
use crate::store::MemoryStore;
use crate::telemetry::PipelineTelemetry;

/// Shared application state
pub struct AppState {
    pub coordinator: Coordinator,
    pub registry: Arc<MemoryStore>,
    pub market: Arc<DexScreenerClient>,
    pub telemetry: Arc<PipelineTelemetry>,
    pub start_time: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type HandlerError = (StatusCode, Json<ApiResponse<()>>);

fn error_response(err: &AppError, start: Instant) -> HandlerError {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ApiResponse::error(
            ApiError::from(err),
            start.elapsed().as_secs_f64() * 1000.0,
        )),
    )
}

// ============================================
// Health & Stats
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    Json(ApiResponse::success(
        data,
        start.elapsed().as_secs_f64() * 1000.0,
    ))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatsData>> {
    let start = Instant::now();

    let data = StatsData {
        pipeline: state.telemetry.stats(),
        uptime_seconds: state.uptime_seconds(),
        api_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(ApiResponse::success(
        data,
        start.elapsed().as_secs_f64() * 1000.0,
    ))
}

// ============================================
// Processing Control
// ============================================

pub async fn start_processing(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartProcessingRequest>>,
) -> Result<Json<ApiResponse<StartProcessingData>>, HandlerError> {
    let start = Instant::now();
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let run_id = state
        .coordinator
        .start(req.trigger())
        .map_err(|e| error_response(&e, start))?;

    Ok(Json(ApiResponse::success(
        StartProcessingData {
            run_id: run_id.to_string(),
        },
        start.elapsed().as_secs_f64() * 1000.0,
    )))
}

pub async fn stop_processing(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StopProcessingData>>, HandlerError> {
    let start = Instant::now();

    state
        .coordinator
        .stop()
        .map_err(|e| error_response(&e, start))?;

    Ok(Json(ApiResponse::success(
        StopProcessingData { stopping: true },
        start.elapsed().as_secs_f64() * 1000.0,
    )))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StatusData>>, HandlerError> {
    let start = Instant::now();

    match state.coordinator.status() {
        Some(snapshot) => Ok(Json(ApiResponse::success(
            snapshot,
            start.elapsed().as_secs_f64() * 1000.0,
        ))),
        None => Err(error_response(
            &AppError::no_active_run(),
            start,
        )),
    }
}

// ============================================
// Tokens
// ============================================

pub async fn process_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessTokenRequest>,
) -> Result<Json<ApiResponse<ProcessTokenData>>, HandlerError> {
    let start = Instant::now();

    let evaluations = state
        .coordinator
        .process_token(&req.token_address)
        .await
        .map_err(|e| error_response(&e, start))?;

    Ok(Json(ApiResponse::success(
        ProcessTokenData {
            token_address: req.token_address,
            evaluations,
        },
        start.elapsed().as_secs_f64() * 1000.0,
    )))
}

pub async fn add_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTokenRequest>,
) -> Result<Json<ApiResponse<AddTokenData>>, HandlerError> {
    let start = Instant::now();

    if req.token_address.trim().is_empty() {
        return Err(error_response(
            &AppError::config_invalid("token_address must not be empty"),
            start,
        ));
    }

    // Name omitted: best-effort lookup from market data
    let (name, symbol) = match req.name {
        Some(name) => (Some(name), None),
        None => match state.market.lookup_identity(&req.token_address).await {
            Some((name, symbol)) => (Some(name), Some(symbol)),
            None => (None, None),
        },
    };

    let mut token = Token::new(req.token_address.clone(), name.clone());
    token.symbol = symbol;
    let added = state.registry.add_token(token);
    if added {
        info!(token = %req.token_address, name = ?name, "token added");
    }

    Ok(Json(ApiResponse::success(
        AddTokenData {
            token_address: req.token_address,
            name,
            added,
        },
        start.elapsed().as_secs_f64() * 1000.0,
    )))
}
