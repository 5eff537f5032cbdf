use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named async job tracked by the background task manager (C12, §3.1).
/// In-memory only; not durable across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackgroundTask {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: f64,
    pub total_items: Option<usize>,
    pub processed_items: usize,
    pub current_item: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BackgroundTask {
    pub fn new(name: impl Into<String>, total_items: Option<usize>, metadata: HashMap<String, String>) -> Self {
        BackgroundTask {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0.0,
            total_items,
            processed_items: 0,
            current_item: None,
            result: None,
            error: None,
            metadata,
        }
    }
}
