//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so production logs can be
//! filtered and counted without parsing free-form messages.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - SRC_xxx: external source errors
//! - RUN_xxx: processing-run lifecycle errors
//! - TOKEN_xxx: token lookup/state errors
//! - STORE_xxx: persistence collaborator errors
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Source Errors
    // ============================================
    /// Source request timed out
    SourceTimeout,
    /// Source rate limited us (HTTP 429)
    SourceRateLimited,
    /// Source returned a non-success HTTP status
    SourceHttpError,
    /// Source response could not be parsed or carried a soft error
    SourceInvalidResponse,
    /// Zero sources returned usable data for a token
    SourceDataInsufficient,

    // ============================================
    // Run Lifecycle Errors
    // ============================================
    /// A run is already active; second trigger rejected
    AlreadyRunning,
    /// stop() called with no run active
    NoActiveRun,

    // ============================================
    // Token Errors
    // ============================================
    /// Token address unknown to the store
    TokenNotFound,
    /// Token already held by an in-flight worker
    TokenInFlight,
    /// Token address failed validation
    TokenInvalidAddress,

    // ============================================
    // Store Errors
    // ============================================
    /// Persistence collaborator unreachable; fatal to the run
    StoreUnavailable,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Schedule expression could not be parsed
    ConfigBadSchedule,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            // Source Errors
            Self::SourceTimeout => "SRC_TIMEOUT",
            Self::SourceRateLimited => "SRC_RATE_LIMITED",
            Self::SourceHttpError => "SRC_HTTP_ERROR",
            Self::SourceInvalidResponse => "SRC_INVALID_RESPONSE",
            Self::SourceDataInsufficient => "SRC_DATA_INSUFFICIENT",

            // Run Lifecycle Errors
            Self::AlreadyRunning => "RUN_ALREADY_RUNNING",
            Self::NoActiveRun => "RUN_NONE_ACTIVE",

            // Token Errors
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::TokenInFlight => "TOKEN_IN_FLIGHT",
            Self::TokenInvalidAddress => "TOKEN_INVALID_ADDRESS",

            // Store Errors
            Self::StoreUnavailable => "STORE_UNAVAILABLE",

            // Configuration Errors
            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigBadSchedule => "CFG_BAD_SCHEDULE",

            // Generic
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ConfigInvalidValue | Self::TokenInvalidAddress | Self::ConfigBadSchedule => 400,
            Self::TokenNotFound => 404,
            Self::AlreadyRunning | Self::NoActiveRun | Self::TokenInFlight => 409,
            Self::SourceRateLimited => 429,
            Self::SourceDataInsufficient => 502,
            _ => 500,
        }
    }

    /// Check if error is retryable at the source-client level
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceTimeout
                | Self::SourceRateLimited
                | Self::SourceHttpError
                | Self::SourceInvalidResponse
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// Source request timed out
    pub fn source_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceTimeout, msg)
    }

    /// Rate limited (HTTP 429)
    pub fn source_rate_limited() -> Self {
        Self::new(ErrorCode::SourceRateLimited, "Rate limited (HTTP 429)")
    }

    /// Non-success HTTP status from a source
    pub fn source_http(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceHttpError, msg)
    }

    /// Unparseable or soft-failed source response
    pub fn source_invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceInvalidResponse, msg)
    }

    /// Zero usable sources for a token
    pub fn data_insufficient(token: &str) -> Self {
        Self::new(
            ErrorCode::SourceDataInsufficient,
            format!("No source returned usable data for token {}", token),
        )
    }

    /// A run is already active
    pub fn already_running() -> Self {
        Self::new(ErrorCode::AlreadyRunning, "A processing run is already active")
    }

    /// No run to stop
    pub fn no_active_run() -> Self {
        Self::new(ErrorCode::NoActiveRun, "No processing run is active")
    }

    /// Unknown token address
    pub fn token_not_found(address: &str) -> Self {
        Self::new(
            ErrorCode::TokenNotFound,
            format!("Unknown token address: {}", address),
        )
    }

    /// Token already being processed
    pub fn token_in_flight(address: &str) -> Self {
        Self::new(
            ErrorCode::TokenInFlight,
            format!("Token {} is already being processed", address),
        )
    }

    /// Persistence failure (fatal to a run)
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreUnavailable, msg)
    }

    /// Invalid configuration value
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Bad schedule expression
    pub fn bad_schedule(expr: &str) -> Self {
        Self::new(
            ErrorCode::ConfigBadSchedule,
            format!("Unsupported schedule expression: {:?}", expr),
        )
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::SourceTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::SourceHttpError, "Connection failed")
        } else {
            Self::with_source(ErrorCode::SourceHttpError, "Request failed", err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::SourceInvalidResponse, "JSON parse error", err)
    }
}
