//! Performance monitoring for every suspension point named in §5 of the spec:
//! provider/scrape/LLM HTTP calls, DB reads/writes, vector backend calls, and
//! background-task runs. Generalized from the teacher's LanceDB performance
//! monitor; same aggregation/alerting shape, re-keyed operation set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub max_http_operation_ms: u64,
    pub max_llm_operation_ms: u64,
    pub max_db_operation_ms: u64,
    pub max_vector_operation_ms: u64,
    pub enable_alerting: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_http_operation_ms: 30_000,
            max_llm_operation_ms: 60_000,
            max_db_operation_ms: 1_000,
            max_vector_operation_ms: 2_000,
            enable_alerting: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    ScrapeUrl,
    LlmCall,
    ProviderSearch,
    VectorUpsert,
    VectorSearch,
    CacheLookup,
    DbRead,
    DbWrite,
    TaskRun,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationType::ScrapeUrl => "scrape_url",
            OperationType::LlmCall => "llm_call",
            OperationType::ProviderSearch => "provider_search",
            OperationType::VectorUpsert => "vector_upsert",
            OperationType::VectorSearch => "vector_search",
            OperationType::CacheLookup => "cache_lookup",
            OperationType::DbRead => "db_read",
            OperationType::DbWrite => "db_write",
            OperationType::TaskRun => "task_run",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetric {
    pub operation_type: OperationType,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub operation_type: OperationType,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub p95_duration_ms: u64,
    pub p99_duration_ms: u64,
    pub operations_per_second: f64,
    pub error_rate: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertType {
    ThresholdExceeded {
        operation_type: OperationType,
        threshold_ms: u64,
        actual_ms: u64,
    },
    HighErrorRate {
        operation_type: OperationType,
        error_rate: f64,
        threshold: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub alert_type: AlertType,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    config: Arc<MetricsConfig>,
    metrics: Arc<Mutex<Vec<OperationMetric>>>,
    aggregated: Arc<Mutex<HashMap<OperationType, AggregatedMetrics>>>,
    alerts: Arc<Mutex<Vec<PerformanceAlert>>>,
}

impl PerformanceMonitor {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(Mutex::new(Vec::new())),
            aggregated: Arc::new(Mutex::new(HashMap::new())),
            alerts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MetricsConfig::default())
    }

    pub fn start_operation(&self, operation_type: OperationType) -> OperationTimer {
        OperationTimer::new(operation_type, self.clone())
    }

    pub fn record_operation(
        &self,
        operation_type: OperationType,
        duration: Duration,
        success: bool,
        error_message: Option<String>,
        metadata: HashMap<String, String>,
    ) {
        let metric = OperationMetric {
            operation_type,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
            success,
            error_message,
            metadata,
        };
        self.finish_metric(metric);
    }

    /// Records one completed operation: threshold check, raw push, and
    /// aggregate recompute. Shared by `record_operation` and every
    /// `OperationTimer` completion so the two entry points stay consistent.
    fn finish_metric(&self, metric: OperationMetric) {
        self.check_thresholds(&metric);
        let operation_type = metric.operation_type;
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.push(metric);
        }
        self.update_aggregated_metrics(operation_type);
    }

    pub fn get_aggregated_metrics(&self) -> HashMap<OperationType, AggregatedMetrics> {
        self.aggregated.lock().unwrap().clone()
    }

    pub fn get_operation_metrics(&self, operation_type: OperationType) -> Option<AggregatedMetrics> {
        self.aggregated.lock().unwrap().get(&operation_type).cloned()
    }

    pub fn get_recent_alerts(&self, limit: usize) -> Vec<PerformanceAlert> {
        let alerts = self.alerts.lock().unwrap();
        alerts.iter().rev().take(limit).cloned().collect()
    }

    pub fn cleanup_old_metrics(&self, max_age: Duration) {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap();
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.retain(|m| m.timestamp > cutoff);
        }
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.retain(|a| a.timestamp > cutoff);
        }
    }

    pub fn generate_summary_report(&self) -> PerformanceSummary {
        let aggregated = self.get_aggregated_metrics();
        let total_operations: u64 = aggregated.values().map(|m| m.total_operations).sum();
        let total_errors: u64 = aggregated.values().map(|m| m.failed_operations).sum();
        let overall_error_rate = if total_operations > 0 {
            (total_errors as f64 / total_operations as f64) * 100.0
        } else {
            0.0
        };
        let avg_response_time = if !aggregated.is_empty() {
            aggregated.values().map(|m| m.avg_duration_ms).sum::<f64>() / aggregated.len() as f64
        } else {
            0.0
        };

        PerformanceSummary {
            total_operations,
            total_errors,
            overall_error_rate,
            avg_response_time_ms: avg_response_time,
            operations_by_type: aggregated,
            recent_alerts: self.get_recent_alerts(10),
            generated_at: Utc::now(),
        }
    }

    fn check_thresholds(&self, metric: &OperationMetric) {
        if !self.config.enable_alerting {
            return;
        }

        let threshold_ms = match metric.operation_type {
            OperationType::LlmCall => self.config.max_llm_operation_ms,
            OperationType::ScrapeUrl | OperationType::ProviderSearch => {
                self.config.max_http_operation_ms
            }
            OperationType::VectorUpsert | OperationType::VectorSearch => {
                self.config.max_vector_operation_ms
            }
            OperationType::DbRead | OperationType::DbWrite | OperationType::CacheLookup => {
                self.config.max_db_operation_ms
            }
            OperationType::TaskRun => self.config.max_http_operation_ms,
        };

        if metric.duration_ms > threshold_ms {
            let alert = PerformanceAlert {
                alert_type: AlertType::ThresholdExceeded {
                    operation_type: metric.operation_type,
                    threshold_ms,
                    actual_ms: metric.duration_ms,
                },
                timestamp: Utc::now(),
                severity: if metric.duration_ms > threshold_ms * 2 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                },
                description: format!(
                    "{} operation took {}ms, exceeding threshold of {}ms",
                    metric.operation_type, metric.duration_ms, threshold_ms
                ),
            };
            if let Ok(mut alerts) = self.alerts.lock() {
                alerts.push(alert);
            }
        }
    }

    fn update_aggregated_metrics(&self, operation_type: OperationType) {
        let metrics = self.metrics.lock().unwrap();
        let operation_metrics: Vec<&OperationMetric> = metrics
            .iter()
            .filter(|m| m.operation_type == operation_type)
            .collect();

        if operation_metrics.is_empty() {
            return;
        }

        let total_operations = operation_metrics.len() as u64;
        let successful_operations = operation_metrics.iter().filter(|m| m.success).count() as u64;
        let failed_operations = total_operations - successful_operations;
        let error_rate = (failed_operations as f64 / total_operations as f64) * 100.0;

        let durations: Vec<u64> = operation_metrics.iter().map(|m| m.duration_ms).collect();
        let avg_duration_ms = durations.iter().sum::<u64>() as f64 / durations.len() as f64;
        let min_duration_ms = *durations.iter().min().unwrap_or(&0);
        let max_duration_ms = *durations.iter().max().unwrap_or(&0);

        let mut sorted_durations = durations.clone();
        sorted_durations.sort_unstable();
        let p95_index = (sorted_durations.len() as f64 * 0.95) as usize;
        let p99_index = (sorted_durations.len() as f64 * 0.99) as usize;
        let p95_duration_ms = sorted_durations.get(p95_index).copied().unwrap_or(0);
        let p99_duration_ms = sorted_durations.get(p99_index).copied().unwrap_or(0);

        let one_minute_ago = Utc::now() - chrono::Duration::minutes(1);
        let recent_operations = operation_metrics
            .iter()
            .filter(|m| m.timestamp > one_minute_ago)
            .count() as f64;
        let operations_per_second = recent_operations / 60.0;

        let aggregated_metric = AggregatedMetrics {
            operation_type,
            total_operations,
            successful_operations,
            failed_operations,
            avg_duration_ms,
            min_duration_ms,
            max_duration_ms,
            p95_duration_ms,
            p99_duration_ms,
            operations_per_second,
            error_rate,
            last_updated: Utc::now(),
        };

        if let Ok(mut aggregated) = self.aggregated.lock() {
            aggregated.insert(operation_type, aggregated_metric);
        }
    }
}

pub struct OperationTimer {
    operation_type: OperationType,
    start_time: Instant,
    monitor: PerformanceMonitor,
    metadata: HashMap<String, String>,
}

impl OperationTimer {
    fn new(operation_type: OperationType, monitor: PerformanceMonitor) -> Self {
        Self {
            operation_type,
            start_time: Instant::now(),
            monitor,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn complete_success(self) {
        self.complete_with_result(true, None);
    }

    pub fn complete_error(self, error_message: String) {
        self.complete_with_result(false, Some(error_message));
    }

    /// Funnels through the same threshold-check + aggregate path as
    /// `PerformanceMonitor::record_operation` so every suspension point
    /// instrumented via `start_operation` shows up in `get_aggregated_metrics`
    /// and alerting, not just explicit `record_operation` calls.
    pub fn complete_with_result(self, success: bool, error_message: Option<String>) {
        let duration = self.start_time.elapsed();
        let metric = OperationMetric {
            operation_type: self.operation_type,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
            success,
            error_message,
            metadata: self.metadata,
        };
        self.monitor.finish_metric(metric);
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_operations: u64,
    pub total_errors: u64,
    pub overall_error_rate: f64,
    pub avg_response_time_ms: f64,
    pub operations_by_type: HashMap<OperationType, AggregatedMetrics>,
    pub recent_alerts: Vec<PerformanceAlert>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn records_and_aggregates_an_operation() {
        let monitor = PerformanceMonitor::with_defaults();
        let timer = monitor.start_operation(OperationType::DbWrite);
        thread::sleep(Duration::from_millis(5));
        timer.complete_success();

        let metrics = monitor.get_aggregated_metrics();
        assert!(metrics.contains_key(&OperationType::DbWrite));
        assert_eq!(metrics[&OperationType::DbWrite].total_operations, 1);
    }

    #[test]
    fn threshold_exceeded_raises_alert() {
        let config = MetricsConfig {
            max_db_operation_ms: 5,
            enable_alerting: true,
            ..Default::default()
        };
        let monitor = PerformanceMonitor::new(config);

        monitor.record_operation(
            OperationType::DbWrite,
            Duration::from_millis(100),
            true,
            None,
            HashMap::new(),
        );

        let alerts = monitor.get_recent_alerts(10);
        assert!(!alerts.is_empty());
        if let AlertType::ThresholdExceeded { actual_ms, .. } = &alerts[0].alert_type {
            assert!(*actual_ms >= 100);
        } else {
            panic!("expected ThresholdExceeded alert");
        }
    }
}
