// Task board: the filtered task list for one day plus per-status counts.
//
// The board never patches its cache locally. Every successful mutation is
// followed by a full re-fetch of the list and the counts.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use crate::api::models::{Task, TaskCounts, TaskQuery, TaskStatus, TaskUpdate};
use crate::api::{ApiError, Backend};
use crate::config::TasksConfig;
use crate::session::Session;

/// Shown when the current filter matches nothing.
pub const EMPTY_MESSAGE: &str = "No tasks found for this selection.";

/// Render-ready copy of the board.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
    pub counts: TaskCounts,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct TaskBoard {
    backend: Arc<dyn Backend>,
    options: TasksConfig,
    status: TaskStatus,
    date: NaiveDate,
    tasks: Vec<Task>,
    counts: TaskCounts,
    loading: bool,
    error: Option<String>,
}

impl TaskBoard {
    pub fn new(backend: Arc<dyn Backend>, options: TasksConfig) -> Self {
        TaskBoard {
            backend,
            options,
            status: TaskStatus::Active,
            date: Local::now().date_naive(),
            tasks: Vec::new(),
            counts: TaskCounts::default(),
            loading: false,
            error: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn counts(&self) -> TaskCounts {
        self.counts
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            status: self.status,
            date: self.date,
            tasks: self.tasks.clone(),
            counts: self.counts,
            loading: self.loading,
            error: self.error.clone(),
        }
    }

    /// Forget cached data and return to today's active tasks.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Active;
        self.date = Local::now().date_naive();
        self.tasks.clear();
        self.counts = TaskCounts::default();
        self.loading = false;
        self.error = None;
    }

    fn query(&self) -> TaskQuery {
        TaskQuery {
            status: Some(self.status),
            target_date: Some(self.date),
            sort_by: self.options.sort_by,
            sort_order: self.options.sort_order,
            limit: Some(self.options.limit),
            offset: None,
        }
    }

    /// Mark the board busy so a snapshot taken before a request shows it.
    /// Cleared by the next completed refresh or by `set_loading(false)`.
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Change the status filter without fetching.
    pub fn select_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Change the target day without fetching.
    pub fn select_date(&mut self, date: NaiveDate) {
        self.date = date;
    }

    /// Day `days` away from the current target, clamped at the calendar range.
    pub fn shifted_date(&self, days: i64) -> NaiveDate {
        self.date
            .checked_add_signed(chrono::Duration::days(days))
            .unwrap_or(self.date)
    }

    /// Re-fetch the list and the counts for the current filter.
    ///
    /// A list failure clears the list and sets the inline error. A counts
    /// failure zeroes the counts. The first failure is returned, preferring
    /// an authorization failure.
    pub async fn refresh(&mut self, session: &Session) -> Result<(), ApiError> {
        let query = self.query();
        let list = self.backend.list_tasks(session, &query).await;
        let counts = self.backend.task_counts(session, Some(self.date)).await;
        self.loading = false;

        let mut failure: Option<ApiError> = None;
        match list {
            Ok(tasks) => {
                self.tasks = tasks;
                self.error = None;
            }
            Err(e) => {
                warn!("Failed to load tasks: {}", e);
                self.tasks.clear();
                self.error = Some(e.to_string());
                failure = Some(e);
            }
        }
        match counts {
            Ok(counts) => self.counts = counts,
            Err(e) => {
                warn!("Failed to load task counts: {}", e);
                self.counts = TaskCounts::default();
                let replace = match &failure {
                    None => true,
                    Some(f) => e.is_unauthorized() && !f.is_unauthorized(),
                };
                if replace {
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn set_status_filter(
        &mut self,
        session: &Session,
        status: TaskStatus,
    ) -> Result<(), ApiError> {
        self.select_status(status);
        self.refresh(session).await
    }

    pub async fn set_date(&mut self, session: &Session, date: NaiveDate) -> Result<(), ApiError> {
        self.select_date(date);
        self.refresh(session).await
    }

    pub async fn shift_date(&mut self, session: &Session, days: i64) -> Result<(), ApiError> {
        self.set_date(session, self.shifted_date(days)).await
    }

    pub async fn today(&mut self, session: &Session) -> Result<(), ApiError> {
        self.set_date(session, Local::now().date_naive()).await
    }

    // -- mutations ----------------------------------------------------------

    /// Record a failed mutation inline and hand it back.
    fn fail(&mut self, action: &str, e: ApiError) -> ApiError {
        warn!("Failed to {}: {}", action, e);
        self.error = Some(e.to_string());
        e
    }

    pub async fn create(&mut self, session: &Session, description: &str) -> Result<(), ApiError> {
        let description = description.trim();
        if description.is_empty() {
            return Ok(());
        }
        match self.backend.create_task(session, description).await {
            Ok(task) => info!("Created task {}", task.task_id),
            Err(e) => return Err(self.fail("create task", e)),
        }
        self.refresh(session).await
    }

    pub async fn edit(
        &mut self,
        session: &Session,
        task_id: &str,
        description: &str,
    ) -> Result<(), ApiError> {
        let description = description.trim();
        if description.is_empty() {
            return Ok(());
        }
        let update = TaskUpdate {
            task_description: Some(description.to_string()),
            ..TaskUpdate::default()
        };
        if let Err(e) = self.backend.update_task(session, task_id, &update).await {
            return Err(self.fail("edit task", e));
        }
        self.refresh(session).await
    }

    pub async fn change_status(
        &mut self,
        session: &Session,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), ApiError> {
        let update = TaskUpdate {
            current_status: Some(status),
            ..TaskUpdate::default()
        };
        if let Err(e) = self.backend.update_task(session, task_id, &update).await {
            return Err(self.fail("change task status", e));
        }
        info!("Moved task {} to {}", task_id, status);
        self.refresh(session).await
    }

    pub async fn delete(&mut self, session: &Session, task_id: &str) -> Result<(), ApiError> {
        if let Err(e) = self.backend.delete_task(session, task_id).await {
            return Err(self.fail("delete task", e));
        }
        info!("Deleted task {}", task_id);
        self.refresh(session).await
    }

    pub async fn delete_batch(
        &mut self,
        session: &Session,
        task_ids: &[String],
    ) -> Result<(), ApiError> {
        if task_ids.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.backend.delete_tasks(session, task_ids).await {
            return Err(self.fail("delete tasks", e));
        }
        info!("Deleted {} tasks", task_ids.len());
        self.refresh(session).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{session, task, FakeBackend};
    use crate::api::models::{SortField, SortOrder};

    fn board(backend: &Arc<FakeBackend>) -> TaskBoard {
        TaskBoard::new(
            backend.clone(),
            TasksConfig {
                sort_by: Some(SortField::CreatedAt),
                sort_order: Some(SortOrder::Desc),
                limit: 100,
            },
        )
    }

    fn seeded() -> Arc<FakeBackend> {
        let backend = Arc::new(FakeBackend::new());
        backend.with(|s| {
            s.tasks = vec![
                task("t-1", "Buy milk", TaskStatus::Active),
                task("t-2", "Call mom", TaskStatus::Active),
                task("t-3", "File taxes", TaskStatus::Backlog),
            ];
            s.counts = TaskCounts {
                active: 2,
                completed: 0,
                backlog: 1,
                pending: 0,
                total: 3,
            };
        });
        backend
    }

    #[tokio::test]
    async fn refresh_loads_list_and_counts() {
        let backend = seeded();
        let mut b = board(&backend);
        b.refresh(&session()).await.unwrap();

        assert_eq!(b.tasks().len(), 2);
        assert_eq!(b.counts().active, 2);
        assert!(b.error().is_none());

        let query = backend.with(|s| s.queries.last().cloned()).unwrap();
        assert_eq!(query.status, Some(TaskStatus::Active));
        assert_eq!(query.target_date, Some(Local::now().date_naive()));
        assert_eq!(query.sort_by, Some(SortField::CreatedAt));
        assert_eq!(query.limit, Some(100));
    }

    #[tokio::test]
    async fn empty_completed_filter() {
        let backend = seeded();
        let mut b = board(&backend);
        b.set_status_filter(&session(), TaskStatus::Completed)
            .await
            .unwrap();
        assert!(b.tasks().is_empty());
        assert_eq!(b.counts().for_status(TaskStatus::Completed), 0);
        assert_eq!(b.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn list_failure_clears_tasks_and_sets_error() {
        let backend = seeded();
        let mut b = board(&backend);
        b.refresh(&session()).await.unwrap();

        backend.with(|s| {
            s.list_error = Some(ApiError::Status {
                status: 500,
                detail: "database unavailable".into(),
            })
        });
        assert!(b.refresh(&session()).await.is_err());
        assert!(b.tasks().is_empty());
        assert_eq!(b.error(), Some("database unavailable"));
        // Counts still loaded.
        assert_eq!(b.counts().total, 3);
    }

    #[tokio::test]
    async fn counts_failure_zeroes_counts() {
        let backend = seeded();
        backend.with(|s| s.counts_error = Some(ApiError::Transport("reset".into())));
        let mut b = board(&backend);
        assert!(b.refresh(&session()).await.is_err());
        assert_eq!(b.counts(), TaskCounts::default());
        assert_eq!(b.tasks().len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_counts_failure_wins() {
        let backend = seeded();
        backend.with(|s| {
            s.list_error = Some(ApiError::Transport("reset".into()));
            s.counts_error = Some(ApiError::Unauthorized {
                status: 401,
                detail: "expired".into(),
            });
        });
        let mut b = board(&backend);
        let err = b.refresh(&session()).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn shift_date_moves_target_day() {
        let backend = seeded();
        let mut b = board(&backend);
        let today = b.date();
        b.shift_date(&session(), -1).await.unwrap();
        assert_eq!(b.date(), today.pred_opt().unwrap());
        b.shift_date(&session(), 2).await.unwrap();
        assert_eq!(b.date(), today.succ_opt().unwrap());
        b.today(&session()).await.unwrap();
        assert_eq!(b.date(), Local::now().date_naive());
        assert_eq!(backend.with(|s| s.queries.len()), 3);
    }

    #[tokio::test]
    async fn create_trims_and_refetches() {
        let backend = seeded();
        let mut b = board(&backend);
        b.create(&session(), "  Water plants ").await.unwrap();
        assert_eq!(backend.with(|s| s.created.clone()), vec!["Water plants".to_string()]);
        assert_eq!(b.tasks().len(), 3);
        assert_eq!(backend.with(|s| s.queries.len()), 1);
    }

    #[tokio::test]
    async fn blank_create_and_edit_are_no_ops() {
        let backend = seeded();
        let mut b = board(&backend);
        b.create(&session(), "   ").await.unwrap();
        b.edit(&session(), "t-1", "").await.unwrap();
        backend.with(|s| {
            assert!(s.created.is_empty());
            assert!(s.updates.is_empty());
            assert!(s.queries.is_empty());
        });
    }

    #[tokio::test]
    async fn edit_sends_description_only() {
        let backend = seeded();
        let mut b = board(&backend);
        b.edit(&session(), "t-1", "Buy oat milk").await.unwrap();
        let (id, update) = backend.with(|s| s.updates[0].clone());
        assert_eq!(id, "t-1");
        assert_eq!(update.task_description.as_deref(), Some("Buy oat milk"));
        assert!(update.current_status.is_none());
        assert!(b.tasks().iter().any(|t| t.task_description == "Buy oat milk"));
    }

    #[tokio::test]
    async fn change_status_moves_task_out_of_filter() {
        let backend = seeded();
        let mut b = board(&backend);
        b.refresh(&session()).await.unwrap();
        b.change_status(&session(), "t-1", TaskStatus::Completed)
            .await
            .unwrap();
        assert_eq!(b.tasks().len(), 1);
        assert_eq!(b.tasks()[0].task_id, "t-2");
    }

    #[tokio::test]
    async fn delete_and_batch_delete() {
        let backend = seeded();
        let mut b = board(&backend);
        b.delete(&session(), "t-1").await.unwrap();
        assert_eq!(backend.with(|s| s.deleted.clone()), vec!["t-1".to_string()]);

        b.delete_batch(&session(), &["t-2".to_string(), "t-3".to_string()])
            .await
            .unwrap();
        assert!(backend.with(|s| s.tasks.is_empty()));
        assert!(b.tasks().is_empty());

        b.delete_batch(&session(), &[]).await.unwrap();
        assert_eq!(backend.with(|s| s.batch_deleted.len()), 1);
    }

    #[tokio::test]
    async fn failed_mutation_sets_error_without_refetch() {
        let backend = seeded();
        backend.with(|s| {
            s.mutation_error = Some(ApiError::Status {
                status: 404,
                detail: "Task not found".into(),
            })
        });
        let mut b = board(&backend);
        let err = b.delete(&session(), "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Task not found");
        assert_eq!(b.error(), Some("Task not found"));
        assert_eq!(backend.with(|s| s.queries.len()), 0);
    }

    #[tokio::test]
    async fn snapshot_and_reset() {
        let backend = seeded();
        let mut b = board(&backend);
        b.set_status_filter(&session(), TaskStatus::Backlog)
            .await
            .unwrap();
        let snap = b.snapshot();
        assert_eq!(snap.status, TaskStatus::Backlog);
        assert_eq!(snap.tasks.len(), 1);
        assert!(!snap.loading);

        b.set_loading(true);
        assert!(b.snapshot().loading);
        b.refresh(&session()).await.unwrap();
        assert!(!b.snapshot().loading);

        b.reset();
        assert_eq!(b.status(), TaskStatus::Active);
        assert!(b.tasks().is_empty());
        assert_eq!(b.counts(), TaskCounts::default());
    }
}
