use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{
        AdminDashboardStats, Feedback, InternSummary, LogActivity, TaskHours, User, UserUpsert,
        WorkLog, WorkLogRequest,
    },
    session::Role,
};

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// Repository Trait
///
/// Persistence contract for users, work logs and feedback. Handlers only see
/// this trait, so tests can swap in an in-memory implementation.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: &str) -> RepoResult<Option<User>>;
    // Insert or refresh the mirror record, keyed by email. Always reactivates.
    async fn upsert_user(&self, user: UserUpsert) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn list_users_by_role(&self, role: Role) -> RepoResult<Vec<User>>;
    // Interns (role 'user') with their total log count.
    async fn list_interns(&self) -> RepoResult<Vec<InternSummary>>;
    // Flips `active` for an intern. None when no such intern exists.
    async fn toggle_user_active(&self, id: &str) -> RepoResult<Option<User>>;

    // --- Work logs ---
    // Newest `date_worked` first, each with its feedback text if any.
    async fn list_logs(&self, user_id: &str) -> RepoResult<Vec<WorkLog>>;
    async fn get_log(&self, id: Uuid) -> RepoResult<Option<WorkLog>>;
    async fn create_log(&self, user_id: &str, req: WorkLogRequest) -> RepoResult<WorkLog>;
    // Owner-only, and only while no feedback exists. None otherwise.
    async fn update_log(
        &self,
        id: Uuid,
        user_id: &str,
        req: WorkLogRequest,
    ) -> RepoResult<Option<WorkLog>>;
    async fn log_activity_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> RepoResult<Vec<LogActivity>>;
    // Highest `hours_worked` first.
    async fn top_tasks(&self, user_id: &str, limit: i64) -> RepoResult<Vec<TaskHours>>;

    // --- Feedback ---
    async fn get_feedback(&self, log_id: Uuid) -> RepoResult<Option<Feedback>>;
    // One feedback row per log: inserts or replaces its text.
    async fn upsert_feedback(&self, log_id: Uuid, text: String) -> RepoResult<Feedback>;

    async fn admin_stats(&self) -> RepoResult<AdminDashboardStats>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, full_name, email, role, active, created_at, updated_at";

const LOG_SELECT: &str = r#"
    SELECT w.id, w.user_id, w.task_title, w.description, w.date_worked, w.hours_worked,
           w.created_at, w.updated_at, f.feedback_text
    FROM work_logs w
    LEFT JOIN feedback f ON f.log_id = w.id
"#;

const LOG_RETURNING: &str = "RETURNING id, user_id, task_title, description, date_worked, hours_worked, created_at, updated_at";

const FEEDBACK_COLUMNS: &str = "id, log_id, feedback_text, created_at, updated_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// upsert_user
    ///
    /// Conflicts on `email`, so a re-created provider account takes over the
    /// existing record instead of duplicating it.
    async fn upsert_user(&self, user: UserUpsert) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, full_name, email, role, active)
            VALUES ($1, $2, $3, $4, true)
            ON CONFLICT (email) DO UPDATE
            SET id = EXCLUDED.id,
                full_name = EXCLUDED.full_name,
                role = EXCLUDED.role,
                active = true,
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn list_users_by_role(&self, role: Role) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY full_name ASC"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
    }

    async fn list_interns(&self) -> RepoResult<Vec<InternSummary>> {
        sqlx::query_as::<_, InternSummary>(
            r#"
            SELECT u.id, u.full_name, u.email, u.role, u.active, COUNT(w.id) AS total_logs
            FROM users u
            LEFT JOIN work_logs w ON w.user_id = u.id
            WHERE u.role = 'user'
            GROUP BY u.id
            ORDER BY u.full_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn toggle_user_active(&self, id: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET active = NOT active, updated_at = NOW()
            WHERE id = $1 AND role = 'user'
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_logs(&self, user_id: &str) -> RepoResult<Vec<WorkLog>> {
        sqlx::query_as::<_, WorkLog>(&format!(
            "{LOG_SELECT} WHERE w.user_id = $1 ORDER BY w.date_worked DESC, w.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_log(&self, id: Uuid) -> RepoResult<Option<WorkLog>> {
        sqlx::query_as::<_, WorkLog>(&format!("{LOG_SELECT} WHERE w.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_log(&self, user_id: &str, req: WorkLogRequest) -> RepoResult<WorkLog> {
        sqlx::query_as::<_, WorkLog>(&format!(
            r#"
            INSERT INTO work_logs (id, user_id, task_title, description, date_worked, hours_worked)
            VALUES ($1, $2, $3, $4, $5, $6)
            {LOG_RETURNING}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(req.task_title)
        .bind(req.description)
        .bind(req.date_worked)
        .bind(req.hours_worked)
        .fetch_one(&self.pool)
        .await
    }

    /// update_log
    ///
    /// The `NOT EXISTS` clause keeps the feedback lock in the same statement as
    /// the write.
    async fn update_log(
        &self,
        id: Uuid,
        user_id: &str,
        req: WorkLogRequest,
    ) -> RepoResult<Option<WorkLog>> {
        sqlx::query_as::<_, WorkLog>(&format!(
            r#"
            UPDATE work_logs
            SET task_title = $3,
                description = $4,
                date_worked = $5,
                hours_worked = $6,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
              AND NOT EXISTS (SELECT 1 FROM feedback f WHERE f.log_id = $1)
            {LOG_RETURNING}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(req.task_title)
        .bind(req.description)
        .bind(req.date_worked)
        .bind(req.hours_worked)
        .fetch_optional(&self.pool)
        .await
    }

    async fn log_activity_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> RepoResult<Vec<LogActivity>> {
        sqlx::query_as::<_, LogActivity>(
            "SELECT date_worked, hours_worked FROM work_logs WHERE user_id = $1 AND date_worked >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }

    async fn top_tasks(&self, user_id: &str, limit: i64) -> RepoResult<Vec<TaskHours>> {
        sqlx::query_as::<_, TaskHours>(
            r#"
            SELECT task_title, hours_worked FROM work_logs
            WHERE user_id = $1
            ORDER BY hours_worked DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_feedback(&self, log_id: Uuid) -> RepoResult<Option<Feedback>> {
        sqlx::query_as::<_, Feedback>(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE log_id = $1"
        ))
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert_feedback(&self, log_id: Uuid, text: String) -> RepoResult<Feedback> {
        sqlx::query_as::<_, Feedback>(&format!(
            r#"
            INSERT INTO feedback (id, log_id, feedback_text)
            VALUES ($1, $2, $3)
            ON CONFLICT (log_id) DO UPDATE
            SET feedback_text = EXCLUDED.feedback_text, updated_at = NOW()
            RETURNING {FEEDBACK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(log_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await
    }

    /// admin_stats
    ///
    /// Both counters in one round trip.
    async fn admin_stats(&self) -> RepoResult<AdminDashboardStats> {
        sqlx::query_as::<_, AdminDashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE role <> 'admin') AS total_interns,
                (SELECT COALESCE(SUM(hours_worked), 0)::DOUBLE PRECISION FROM work_logs) AS total_hours
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }
}
