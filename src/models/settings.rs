use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Singleton settings row driving C9/C10/C11 (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordMonitorSettings {
    pub check_interval: u32,
    pub interval_unit: IntervalUnit,
    pub daily_request_limit: u32,
    pub provider: String,

    pub auto_ingest_enabled: bool,
    pub min_relevance_threshold: f64,
    pub quality_control_enabled: bool,
    pub auto_save_approved_only: bool,
    pub default_llm_model: String,
    pub llm_temperature: f64,
    pub llm_max_tokens: u32,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    pub fn to_duration(self, amount: u32) -> std::time::Duration {
        let secs = match self {
            IntervalUnit::Minutes => amount as u64 * 60,
            IntervalUnit::Hours => amount as u64 * 3600,
            IntervalUnit::Days => amount as u64 * 86_400,
        };
        std::time::Duration::from_secs(secs)
    }
}

impl Default for KeywordMonitorSettings {
    fn default() -> Self {
        KeywordMonitorSettings {
            check_interval: 1,
            interval_unit: IntervalUnit::Hours,
            daily_request_limit: 200,
            provider: "newsapi".to_string(),
            auto_ingest_enabled: false,
            min_relevance_threshold: 0.5,
            quality_control_enabled: true,
            auto_save_approved_only: true,
            default_llm_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.2,
            llm_max_tokens: 1024,
            batch_size: 5,
            max_concurrent_batches: 1,
        }
    }
}

/// Singleton status row: scheduler heartbeat + shared rate-limit counter (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordMonitorStatus {
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub requests_today: u32,
    pub last_reset_date: NaiveDate,
}

impl Default for KeywordMonitorStatus {
    fn default() -> Self {
        KeywordMonitorStatus {
            last_run_time: None,
            next_run_time: None,
            last_error: None,
            requests_today: 0,
            last_reset_date: Utc::now().date_naive(),
        }
    }
}

impl KeywordMonitorStatus {
    /// Resets the daily counter if the day has rolled over since
    /// `last_reset_date`, per the "single-row UPDATE" semantics of §5.
    pub fn roll_day_if_needed(&mut self, today: NaiveDate) {
        if today != self.last_reset_date {
            self.requests_today = 0;
            self.last_reset_date = today;
        }
    }

    pub fn is_rate_limited(&self, daily_request_limit: u32) -> bool {
        self.requests_today >= daily_request_limit
    }
}
