use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Submission review status. Pending is the only non-terminal state;
/// approved and rejected are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            other => Err(format!("unknown submission status: {}", other)),
        }
    }
}

/// Task difficulty tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskDifficulty {
    Easy,
    Medium,
    Hard,
}

/// Ledger entry kind: task rewards vs. manual admin adjustments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Task,
    Admin,
}

/// User account row. Balance, completed_tasks and level are mutated only
/// through the settlement and adjustment paths.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub email_password: String,
    pub password_hash: String,
    pub user_code: String,
    pub balance: Decimal,
    pub completed_tasks: i32,
    pub level: i32,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user; never carries credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub balance: Decimal,
    pub user_code: String,
    pub level: i32,
    pub completed_tasks: i32,
    pub is_blocked: bool,
    pub is_admin: bool,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            username: user.username,
            email: user.email,
            balance: user.balance,
            user_code: user.user_code,
            level: user.level,
            completed_tasks: user.completed_tasks,
            is_blocked: user.is_blocked,
            is_admin: user.is_admin,
        }
    }
}

/// Minimal lookup result for the off-platform user-code flow
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct UserLookup {
    pub id: Uuid,
    pub username: String,
    pub user_code: String,
}

/// Task row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub reward: Decimal,
    pub difficulty: TaskDifficulty,
    pub is_published: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submission row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskSubmission {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub screenshot_url: Option<String>,
    pub link_url: Option<String>,
    pub status: SubmissionStatus,
    pub admin_comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
}

/// Submission joined with task and submitter context for review listings
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SubmissionReview {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub screenshot_url: Option<String>,
    pub link_url: Option<String>,
    pub status: SubmissionStatus,
    pub admin_comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub task_title: String,
    pub reward: Decimal,
    pub username: String,
}

/// Immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub submission_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Registration request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "emailPassword")]
    pub email_password: String,
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Task creation request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub reward: Decimal,
    pub difficulty: Option<TaskDifficulty>,
    pub created_by: Option<Uuid>,
}

/// Proof-of-completion submission request
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitTaskRequest {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub screenshot_url: Option<String>,
    pub link_url: Option<String>,
}

/// Submission listing filter; defaults to pending
#[derive(Debug, Deserialize)]
pub struct ListSubmissionsQuery {
    pub status: Option<String>,
}

/// Approve request; the reviewer id is recorded on the submission
#[derive(Debug, Deserialize, Serialize)]
pub struct ApproveSubmissionRequest {
    pub admin_id: Uuid,
}

/// Reject request
#[derive(Debug, Deserialize, Serialize)]
pub struct RejectSubmissionRequest {
    pub admin_id: Uuid,
    #[serde(default)]
    pub comment: String,
}

/// Block / unblock request
#[derive(Debug, Deserialize, Serialize)]
pub struct BlockUserRequest {
    pub is_blocked: Option<bool>,
}

/// Manual balance adjustment request; amount may be negative
#[derive(Debug, Deserialize, Serialize)]
pub struct AdjustBalanceRequest {
    pub amount: Decimal,
    pub admin_id: Uuid,
}

/// Settlement result returned to the reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub balance: Decimal,
    pub level: i32,
    pub completed_tasks: i32,
}

/// Reward event for NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct RewardEvent {
    pub event_type: RewardEventType,
    pub user_id: Option<Uuid>,
    pub submission_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub balance: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RewardEventType {
    #[serde(rename = "submission.approved")]
    SubmissionApproved,
    #[serde(rename = "submission.rejected")]
    SubmissionRejected,
    #[serde(rename = "balance.adjusted")]
    BalanceAdjusted,
    #[serde(rename = "balances.reset")]
    BalancesReset,
}
