use crate::errors::{Result, RewardEngineError};
use crate::level::level_for;
use crate::models::{
    SubmissionReview, SubmissionStatus, Task, TaskDifficulty, TaskSubmission, Transaction,
    TransactionType, User, UserLookup,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

/// Ledger entry descriptions. Fixed strings so the ledger stays greppable.
pub const REWARD_DESCRIPTION: &str = "Reward for task completion";
pub const ADJUSTMENT_DESCRIPTION: &str = "Adjustment by administrator";
pub const RESET_DESCRIPTION: &str = "Balance reset";

pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a new user account
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        email_password: &str,
        password_hash: &str,
        user_code: &str,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, email_password, password_hash, user_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(email_password)
        .bind(password_hash)
        .bind(user_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("users_username_key") => RewardEngineError::UsernameTaken(username.to_string()),
            _ => RewardEngineError::from(e),
        })?;

        Ok(user)
    }

    /// Look up a user by username (login path)
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Look up a user by their 20-digit code; blocked users are invisible here
    pub async fn get_user_by_code(&self, code: &str) -> Result<Option<UserLookup>> {
        let user = sqlx::query_as::<_, UserLookup>(
            r#"
            SELECT id, username, user_code
            FROM users
            WHERE user_code = $1 AND is_blocked = FALSE
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// List non-admin users, highest balance first
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE is_admin = FALSE
            ORDER BY balance DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Block or unblock a user
    pub async fn set_user_blocked(&self, user_id: Uuid, is_blocked: bool) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_blocked = $1
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(is_blocked)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Create a task; tasks start unpublished
    pub async fn create_task(
        &self,
        title: &str,
        description: &str,
        reward: Decimal,
        difficulty: TaskDifficulty,
        created_by: Option<Uuid>,
    ) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (title, description, reward, difficulty, created_by, is_published)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(reward)
        .bind(difficulty)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(task)
    }

    /// Get task by ID
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT * FROM tasks WHERE id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    /// Publish a task. One-way: published tasks are never unpublished.
    pub async fn publish_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET is_published = TRUE, updated_at = $1
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    /// List published tasks, newest first (participant view)
    pub async fn list_published_tasks(&self) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT * FROM tasks
            WHERE is_published = TRUE
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    /// List all tasks including unpublished (admin view)
    pub async fn list_all_tasks(&self) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT * FROM tasks
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    /// Record a proof-of-completion submission in the pending state.
    /// The partial unique index rejects a second pending submission for
    /// the same (task, user) pair.
    pub async fn create_submission(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        screenshot_url: Option<&str>,
        link_url: Option<&str>,
    ) -> Result<TaskSubmission> {
        let submission = sqlx::query_as::<_, TaskSubmission>(
            r#"
            INSERT INTO task_submissions (task_id, user_id, screenshot_url, link_url, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(user_id)
        .bind(screenshot_url)
        .bind(link_url)
        .bind(SubmissionStatus::Pending)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match constraint_violation(&e) {
            Some(("23505", _)) => RewardEngineError::DuplicateSubmission { task_id, user_id },
            Some(("23503", Some("task_submissions_task_id_fkey"))) => {
                RewardEngineError::TaskNotFound(task_id)
            }
            Some(("23503", Some("task_submissions_user_id_fkey"))) => {
                RewardEngineError::UserNotFound(user_id)
            }
            _ => RewardEngineError::from(e),
        })?;

        Ok(submission)
    }

    /// List submissions in a given status joined with task and submitter
    /// context, newest first
    pub async fn list_submissions(&self, status: SubmissionStatus) -> Result<Vec<SubmissionReview>> {
        let submissions = sqlx::query_as::<_, SubmissionReview>(
            r#"
            SELECT
                ts.id,
                ts.task_id,
                ts.user_id,
                ts.screenshot_url,
                ts.link_url,
                ts.status,
                ts.admin_comment,
                ts.submitted_at,
                ts.reviewed_at,
                t.title AS task_title,
                t.reward,
                u.username
            FROM task_submissions ts
            JOIN tasks t ON ts.task_id = t.id
            JOIN users u ON ts.user_id = u.id
            WHERE ts.status = $1
            ORDER BY ts.submitted_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(submissions)
    }

    /// Approve a pending submission and settle its reward in one
    /// transaction: claim the submission, lock the submitter's row,
    /// credit the reward, bump the completion count, recompute the level
    /// from the post-increment count, and append the ledger entry.
    /// Any failure rolls the whole settlement back.
    pub async fn approve_submission(
        &self,
        submission_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<(TaskSubmission, User, Decimal)> {
        let mut tx = self.pool.begin().await?;

        // Conditional claim: only a pending submission transitions, and
        // only one of two racing reviewers gets the row.
        let submission = sqlx::query_as::<_, TaskSubmission>(
            r#"
            UPDATE task_submissions
            SET status = $1, reviewed_at = $2, reviewed_by = $3
            WHERE id = $4 AND status = $5
            RETURNING *
            "#,
        )
        .bind(SubmissionStatus::Approved)
        .bind(Utc::now())
        .bind(reviewer_id)
        .bind(submission_id)
        .bind(SubmissionStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let submission = match submission {
            Some(submission) => submission,
            None => return Err(Self::classify_missed_claim(&mut tx, submission_id).await?),
        };

        let reward = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT reward FROM tasks WHERE id = $1
            "#,
        )
        .bind(submission.task_id)
        .fetch_one(&mut *tx)
        .await?;

        // Row lock serializes concurrent settlements for the same user;
        // the level is computed from the count this transaction writes.
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(submission.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let completed_tasks = user.completed_tasks + 1;
        let balance = user.balance + reward;
        let level = level_for(completed_tasks);

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET balance = $1, completed_tasks = $2, level = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(balance)
        .bind(completed_tasks)
        .bind(level)
        .bind(submission.user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (user_id, transaction_type, amount, submission_id, description)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(submission.user_id)
        .bind(TransactionType::Task)
        .bind(reward)
        .bind(submission_id)
        .bind(REWARD_DESCRIPTION)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((submission, user, reward))
    }

    /// Reject a pending submission with a reviewer comment. No balance or
    /// ledger effect.
    pub async fn reject_submission(
        &self,
        submission_id: Uuid,
        reviewer_id: Uuid,
        comment: &str,
    ) -> Result<TaskSubmission> {
        let mut tx = self.pool.begin().await?;

        let submission = sqlx::query_as::<_, TaskSubmission>(
            r#"
            UPDATE task_submissions
            SET status = $1, reviewed_at = $2, reviewed_by = $3, admin_comment = $4
            WHERE id = $5 AND status = $6
            RETURNING *
            "#,
        )
        .bind(SubmissionStatus::Rejected)
        .bind(Utc::now())
        .bind(reviewer_id)
        .bind(comment)
        .bind(submission_id)
        .bind(SubmissionStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let submission = match submission {
            Some(submission) => submission,
            None => return Err(Self::classify_missed_claim(&mut tx, submission_id).await?),
        };

        tx.commit().await?;

        Ok(submission)
    }

    /// Adjust a user's balance by a signed amount. The guard in the
    /// update keeps the balance non-negative without a read-check race.
    pub async fn adjust_balance(&self, user_id: Uuid, amount: Decimal) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET balance = balance + $1
            WHERE id = $2 AND balance + $1 >= 0
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let user = match user {
            Some(user) => user,
            None => {
                // Zero rows claimed: either the user does not exist or the
                // adjustment would drive the balance negative.
                let available =
                    sqlx::query_scalar::<_, Decimal>("SELECT balance FROM users WHERE id = $1")
                        .bind(user_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match available {
                    Some(available) => RewardEngineError::InsufficientBalance {
                        required: amount.abs().to_string(),
                        available: available.to_string(),
                    },
                    None => RewardEngineError::UserNotFound(user_id),
                });
            }
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (user_id, transaction_type, amount, description)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(TransactionType::Admin)
        .bind(amount)
        .bind(ADJUSTMENT_DESCRIPTION)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user)
    }

    /// Zero every non-admin balance, appending one compensating ledger
    /// entry per user first so balances stay equal to the sum of their
    /// transactions. Returns the number of users reset.
    pub async fn reset_all_balances(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // Lock the reset set once and key both statements to it. Each
        // statement otherwise reads its own snapshot, and a user funded
        // between the two would be zeroed without a compensating entry.
        let user_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM users
            WHERE is_admin = FALSE AND balance <> 0
            FOR UPDATE
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        if user_ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        sqlx::query(
            r#"
            INSERT INTO transactions (user_id, transaction_type, amount, description)
            SELECT id, $1, -balance, $2
            FROM users
            WHERE id = ANY($3)
            "#,
        )
        .bind(TransactionType::Admin)
        .bind(RESET_DESCRIPTION)
        .bind(&user_ids)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE users SET balance = 0 WHERE id = ANY($1)
            "#,
        )
        .bind(&user_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// Ledger entries for a user, newest first
    pub async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// A conditional claim matched nothing: report whether the submission
    /// is already reviewed or missing entirely, read in the same
    /// transaction as the claim.
    async fn classify_missed_claim(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        submission_id: Uuid,
    ) -> Result<RewardEngineError> {
        let existing = sqlx::query_as::<_, TaskSubmission>(
            r#"
            SELECT * FROM task_submissions WHERE id = $1
            "#,
        )
        .bind(submission_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(match existing {
            Some(submission) => RewardEngineError::InvalidState {
                submission_id,
                status: submission.status.to_string(),
            },
            None => RewardEngineError::SubmissionNotFound(submission_id),
        })
    }
}

fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    constraint_violation(err).and_then(|(code, constraint)| match code {
        "23505" => constraint,
        _ => None,
    })
}

/// SQLSTATE and constraint name for integrity violations, if that is what
/// the error is.
fn constraint_violation(err: &sqlx::Error) -> Option<(&str, Option<&str>)> {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            if matches!(code.as_ref(), "23505" | "23503") {
                // code borrows from db_err; return the static SQLSTATE
                let code = if code.as_ref() == "23505" { "23505" } else { "23503" };
                return Some((code, db_err.constraint()));
            }
        }
    }
    None
}
