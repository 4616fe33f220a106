//! API Request/Response Types

use serde::{Deserialize, Serialize};

use crate::models::{AppError, Evaluation, RunSnapshot, RunTrigger};
use crate::telemetry::TelemetryStats;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError, latency_ms: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// API Error carrying the pipeline's unique error code
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code_str().to_string(),
            message: err.message.clone(),
        }
    }
}

// ============================================
// Processing Control
// ============================================

#[derive(Debug, Deserialize, Default)]
pub struct StartProcessingRequest {
    /// "manual" (default) or "scheduled"
    #[serde(default)]
    pub trigger: Option<String>,
}

impl StartProcessingRequest {
    pub fn trigger(&self) -> RunTrigger {
        match self.trigger.as_deref() {
            Some("scheduled") => RunTrigger::Scheduled,
            _ => RunTrigger::Manual,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartProcessingData {
    pub run_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopProcessingData {
    pub stopping: bool,
}

/// Status is the coordinator's snapshot, verbatim
pub type StatusData = RunSnapshot;

// ============================================
// Tokens
// ============================================

#[derive(Debug, Deserialize)]
pub struct ProcessTokenRequest {
    pub token_address: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessTokenData {
    pub token_address: String,
    pub evaluations: Vec<Evaluation>,
}

#[derive(Debug, Deserialize)]
pub struct AddTokenRequest {
    pub token_address: String,
    /// Looked up from market data when omitted
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddTokenData {
    pub token_address: String,
    pub name: Option<String>,
    pub added: bool,
}

// ============================================
// Stats / Health
// ============================================

#[derive(Debug, Serialize)]
pub struct StatsData {
    #[serde(flatten)]
    pub pipeline: TelemetryStats,
    pub uptime_seconds: u64,
    pub api_version: String,
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}
