use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::error::AppResult;
use crate::metrics::{OperationType, PerformanceMonitor};
use crate::models::{BackgroundTask, TaskStatus};

#[derive(Debug, Clone, Default)]
pub struct TaskManagerSummary {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// A cooperative handle passed into a running task's closure: reports
/// progress and polls its own cancellation flag at the next suspension point
/// (C12, §4.9). Cancellation is advisory — the closure must check it.
#[derive(Clone)]
pub struct TaskHandle {
    id: String,
    manager: Arc<BackgroundTaskManager>,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_progress(&self, processed_items: usize, current_item: Option<String>) {
        self.manager.update_progress(&self.id, processed_items, current_item);
    }
}

/// In-memory registry of named async jobs (C12, §4.9). Grounded on the
/// `MemoryVectorStore` bridge shape: a `parking_lot::Mutex`-guarded map for
/// short, non-blocking critical sections, with `tokio::sync::Semaphore`
/// bounding how many run concurrently.
pub struct BackgroundTaskManager {
    tasks: Mutex<HashMap<String, BackgroundTask>>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<PerformanceMonitor>,
}

impl BackgroundTaskManager {
    pub fn new(max_concurrent_tasks: usize, metrics: Arc<PerformanceMonitor>) -> Arc<Self> {
        Arc::new(BackgroundTaskManager {
            tasks: Mutex::new(HashMap::new()),
            cancel_flags: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent_tasks.max(1))),
            metrics,
        })
    }

    /// Registers a new task in `Pending` state and returns its id.
    pub fn create(&self, name: impl Into<String>, total_items: Option<usize>, metadata: HashMap<String, String>) -> String {
        let task = BackgroundTask::new(name, total_items, metadata);
        let id = task.id.clone();
        self.tasks.lock().insert(id.clone(), task);
        self.cancel_flags.lock().insert(id.clone(), Arc::new(AtomicBool::new(false)));
        id
    }

    pub fn get(&self, id: &str) -> Option<BackgroundTask> {
        self.tasks.lock().get(id).cloned()
    }

    pub fn list(&self) -> Vec<BackgroundTask> {
        let mut tasks: Vec<BackgroundTask> = self.tasks.lock().values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Flags a task for cancellation. Returns `false` if the task is unknown
    /// or already terminal.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(flag) = self.cancel_flags.lock().get(id).cloned() else {
            return false;
        };
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled) {
            return false;
        }
        flag.store(true, Ordering::SeqCst);
        true
    }

    pub fn summary(&self) -> TaskManagerSummary {
        let tasks = self.tasks.lock();
        let mut summary = TaskManagerSummary::default();
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Drops terminal tasks older than `max_age_hours` (default 24, §4.9).
    pub fn cleanup(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let mut tasks = self.tasks.lock();
        let stale: Vec<String> = tasks
            .values()
            .filter(|t| {
                matches!(t.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
                    && t.completed_at.map(|c| c < cutoff).unwrap_or(false)
            })
            .map(|t| t.id.clone())
            .collect();
        for id in &stale {
            tasks.remove(id);
            self.cancel_flags.lock().remove(id);
        }
        stale.len()
    }

    fn update_progress(&self, id: &str, processed_items: usize, current_item: Option<String>) {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.get_mut(id) {
            task.processed_items = processed_items;
            task.current_item = current_item;
            task.progress = match task.total_items {
                Some(total) if total > 0 => ((processed_items as f64 / total as f64) * 100.0).min(100.0),
                _ => task.progress,
            };
        }
    }

    /// Acquires a concurrency permit, marks the task `Running`, runs `work`,
    /// then records the terminal state (§4.9). Cancellation between permit
    /// acquisition and task start is honored: a task cancelled while queued
    /// never starts.
    pub async fn run<F, Fut>(self: &Arc<Self>, id: String, work: F) -> AppResult<()>
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<serde_json::Value>> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let cancelled = manager
                .cancel_flags
                .lock()
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

            if cancelled.load(Ordering::SeqCst) {
                manager.finish(&id, TaskStatus::Cancelled, None, None);
                return;
            }

            {
                let mut tasks = manager.tasks.lock();
                if let Some(task) = tasks.get_mut(&id) {
                    task.status = TaskStatus::Running;
                    task.started_at = Some(Utc::now());
                }
            }

            let timer = manager.metrics.start_operation(OperationType::TaskRun);
            let handle = TaskHandle { id: id.clone(), manager: Arc::clone(&manager), cancelled: Arc::clone(&cancelled) };

            let outcome = work(handle).await;

            match outcome {
                Ok(result) => {
                    timer.complete_success();
                    let status = if cancelled.load(Ordering::SeqCst) { TaskStatus::Cancelled } else { TaskStatus::Completed };
                    info!(task_id = %id, ?status, "background task finished");
                    manager.finish(&id, status, Some(result), None);
                }
                Err(e) => {
                    timer.complete_error(e.to_string());
                    error!(task_id = %id, error = %e, "background task failed");
                    manager.finish(&id, TaskStatus::Failed, None, Some(e.to_string()));
                }
            }
        });

        Ok(())
    }

    fn finish(&self, id: &str, status: TaskStatus, result: Option<serde_json::Value>, error: Option<String>) {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.get_mut(id) {
            task.status = status;
            task.completed_at = Some(Utc::now());
            task.result = result;
            task.error = error;
            if matches!(status, TaskStatus::Completed) {
                task.progress = 100.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<BackgroundTaskManager> {
        BackgroundTaskManager::new(2, Arc::new(PerformanceMonitor::with_defaults()))
    }

    #[tokio::test]
    async fn create_then_run_reaches_completed() {
        let manager = manager();
        let id = manager.create("demo", Some(3), HashMap::new());

        manager
            .run(id.clone(), |handle| async move {
                handle.set_progress(3, Some("last".to_string()));
                Ok(serde_json::json!({"ok": true}))
            })
            .await
            .unwrap();

        for _ in 0..50 {
            if matches!(manager.get(&id).unwrap().status, TaskStatus::Completed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let task = manager.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.processed_items, 3);
        assert_eq!(task.progress, 100.0);
    }

    #[tokio::test]
    async fn failing_work_marks_task_failed() {
        let manager = manager();
        let id = manager.create("demo", None, HashMap::new());

        manager
            .run(id.clone(), |_handle| async move { Err(crate::error::AppError::Internal("boom".to_string())) })
            .await
            .unwrap();

        for _ in 0..50 {
            if matches!(manager.get(&id).unwrap().status, TaskStatus::Failed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let task = manager.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.is_some());
    }

    #[test]
    fn cancel_unknown_task_returns_false() {
        let manager = manager();
        assert!(!manager.cancel("missing"));
    }

    #[test]
    fn summary_counts_by_status() {
        let manager = manager();
        manager.create("a", None, HashMap::new());
        manager.create("b", None, HashMap::new());
        let summary = manager.summary();
        assert_eq!(summary.pending, 2);
    }
}
