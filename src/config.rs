//! Configuration module for the Omni Pipeline
//!
//! All knobs are environment-driven with the OMNI_ prefix. Nothing in the
//! rest of the crate reads the environment directly.

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::time::Duration;

use crate::models::{AppError, AppResult};

/// Verdict cutoffs applied to a trader's summed rule score
///
/// score < reject  -> Reject
/// score < flag    -> Flag
/// otherwise       -> Pass
#[derive(Debug, Clone, Copy)]
pub struct RiskThresholds {
    pub flag: f64,
    pub reject: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            flag: 0.0,
            reject: -30.0,
        }
    }
}

/// Precedence when more than one rule forces a verdict in the same
/// evaluation. The original system never documented this, so it stays
/// configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverridePolicy {
    /// First hard override in rule-list order wins; later rules do not run
    FirstWins,
    /// All rules run; the last hard override wins
    LastWins,
}

/// Per-source endpoint and pacing settings
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    /// Sustained request rate against this provider
    pub rate_limit_qps: f64,
}

/// Configuration for the token processing pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Global cap on concurrently processed tokens
    pub max_concurrency: usize,
    /// Daily schedule, "M H * * *" cron subset
    pub schedule_cron: String,
    /// Timeout applied to each individual fetch attempt
    pub per_source_timeout: Duration,
    /// Attempts per source before failure becomes data
    pub per_source_retries: u32,
    pub risk_thresholds: RiskThresholds,
    pub override_policy: OverridePolicy,
    pub bullx: SourceSettings,
    pub gmgn: SourceSettings,
    pub dexscreener: SourceSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: env_parse("OMNI_MAX_CONCURRENCY", 7),
            schedule_cron: std::env::var("OMNI_SCHEDULE_CRON")
                .unwrap_or_else(|_| "0 6 * * *".to_string()),
            per_source_timeout: Duration::from_secs(env_parse("OMNI_SOURCE_TIMEOUT_SECS", 15)),
            per_source_retries: env_parse("OMNI_SOURCE_RETRIES", 3),
            risk_thresholds: RiskThresholds {
                flag: env_parse("OMNI_FLAG_THRESHOLD", 0.0),
                reject: env_parse("OMNI_REJECT_THRESHOLD", -30.0),
            },
            override_policy: match std::env::var("OMNI_OVERRIDE_POLICY").as_deref() {
                Ok("last_wins") => OverridePolicy::LastWins,
                _ => OverridePolicy::FirstWins,
            },
            bullx: SourceSettings {
                base_url: std::env::var("OMNI_BULLX_URL")
                    .unwrap_or_else(|_| "https://api-neo.bullx.io/v2/api".to_string()),
                rate_limit_qps: env_parse("OMNI_BULLX_QPS", 4.0),
            },
            gmgn: SourceSettings {
                base_url: std::env::var("OMNI_GMGN_URL")
                    .unwrap_or_else(|_| "https://gmgn.ai".to_string()),
                rate_limit_qps: env_parse("OMNI_GMGN_QPS", 4.0),
            },
            dexscreener: SourceSettings {
                base_url: std::env::var("OMNI_DEXSCREENER_URL")
                    .unwrap_or_else(|_| "https://api.dexscreener.com/latest/dex".to_string()),
                rate_limit_qps: env_parse("OMNI_DEXSCREENER_QPS", 4.0),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Daily fire time parsed from the "M H * * *" cron subset
///
/// The pipeline runs once a day; anything fancier than a fixed minute and
/// hour is rejected rather than silently misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    pub minute: u32,
    pub hour: u32,
}

impl DailySchedule {
    pub fn parse(expr: &str) -> AppResult<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(AppError::bad_schedule(expr));
        }
        if fields[2] != "*" || fields[3] != "*" || fields[4] != "*" {
            return Err(AppError::bad_schedule(expr));
        }

        let minute: u32 = fields[0]
            .parse()
            .map_err(|_| AppError::bad_schedule(expr))?;
        let hour: u32 = fields[1]
            .parse()
            .map_err(|_| AppError::bad_schedule(expr))?;

        if minute > 59 || hour > 23 {
            return Err(AppError::bad_schedule(expr));
        }

        Ok(Self { minute, hour })
    }

    /// Next fire time strictly after `now`
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now
            .with_hour(self.hour)
            .and_then(|t| t.with_minute(self.minute))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);

        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config_sane() {
        let config = PipelineConfig::default();
        assert!(config.max_concurrency >= 1);
        assert!(config.per_source_retries >= 1);
        assert!(config.risk_thresholds.reject < config.risk_thresholds.flag);
        assert_eq!(config.override_policy, OverridePolicy::FirstWins);
    }

    #[test]
    fn test_schedule_parse() {
        let sched = DailySchedule::parse("0 6 * * *").unwrap();
        assert_eq!(sched, DailySchedule { minute: 0, hour: 6 });

        let sched = DailySchedule::parse("30 23 * * *").unwrap();
        assert_eq!(sched, DailySchedule { minute: 30, hour: 23 });
    }

    #[test]
    fn test_schedule_parse_rejects_unsupported() {
        assert!(DailySchedule::parse("").is_err());
        assert!(DailySchedule::parse("0 6 * *").is_err());
        assert!(DailySchedule::parse("*/5 * * * *").is_err());
        assert!(DailySchedule::parse("0 6 1 * *").is_err());
        assert!(DailySchedule::parse("60 6 * * *").is_err());
        assert!(DailySchedule::parse("0 24 * * *").is_err());
    }

    #[test]
    fn test_next_fire_same_day() {
        let sched = DailySchedule::parse("0 18 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let next = sched.next_fire_after(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_next_fire_rolls_over() {
        let sched = DailySchedule::parse("0 6 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap();
        let next = sched.next_fire_after(now);
        // Exactly at fire time -> schedule for tomorrow
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 11, 6, 0, 0).unwrap());
    }
}
