use crate::auth;
use crate::database::Database;
use crate::errors::{Result, RewardEngineError};
use crate::metrics;
use crate::models::{
    CreateTaskRequest, LoginRequest, RegisterRequest, RewardEvent, RewardEventType,
    SettlementOutcome, SubmissionReview, SubmissionStatus, SubmitTaskRequest, Task,
    TaskDifficulty, TaskSubmission, UserLookup, UserProfile,
};
use crate::nats::NatsProducer;
use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Length of the numeric code participants share off-platform.
const USER_CODE_LENGTH: usize = 20;

pub struct RewardService {
    pub db: Arc<Database>,
    pub nats: Arc<NatsProducer>,
    forbidden_usernames: Vec<String>,
    min_password_length: usize,
}

impl RewardService {
    pub fn new(
        db: Arc<Database>,
        nats: Arc<NatsProducer>,
        forbidden_usernames: Vec<String>,
        min_password_length: usize,
    ) -> Self {
        RewardService {
            db,
            nats,
            forbidden_usernames: forbidden_usernames
                .into_iter()
                .map(|word| word.to_lowercase())
                .collect(),
            min_password_length,
        }
    }

    /// Register a new participant with a hashed password and a fresh
    /// 20-digit user code
    pub async fn register(&self, request: RegisterRequest) -> Result<UserProfile> {
        validator::Validate::validate(&request)
            .map_err(|e| RewardEngineError::Validation(e.to_string()))?;

        let username = request.username.trim();
        self.check_username_allowed(username)?;
        self.check_password_length(&request.password)?;

        let password_hash = auth::hash_password(&request.password)?;
        let user_code = generate_user_code();

        let user = self
            .db
            .create_user(
                username,
                request.email.trim(),
                &request.email_password,
                &password_hash,
                &user_code,
            )
            .await?;

        metrics::USERS_REGISTERED.inc();
        info!("Registered user {} ({})", user.username, user.id);

        Ok(user.into())
    }

    /// Verify credentials. Unknown usernames and wrong passwords produce
    /// the same error; blocked users are told so only after their
    /// password checks out.
    pub async fn login(&self, request: LoginRequest) -> Result<UserProfile> {
        let username = request.username.trim();

        let user = match self.db.find_user_by_username(username).await? {
            Some(user) => user,
            None => return Err(RewardEngineError::Unauthorized),
        };

        if !auth::verify_password(&request.password, &user.password_hash)? {
            return Err(RewardEngineError::Unauthorized);
        }

        if user.is_blocked {
            return Err(RewardEngineError::UserBlocked);
        }

        info!("User {} logged in", user.id);
        Ok(user.into())
    }

    pub fn check_username_allowed(&self, username: &str) -> Result<()> {
        if !username_allowed(username, &self.forbidden_usernames) {
            return Err(RewardEngineError::Validation(format!(
                "Username '{}' is not allowed",
                username
            )));
        }
        Ok(())
    }

    pub fn check_password_length(&self, password: &str) -> Result<()> {
        if !password_long_enough(password, self.min_password_length) {
            return Err(RewardEngineError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }

    /// Create an unpublished task
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<Task> {
        validator::Validate::validate(&request)
            .map_err(|e| RewardEngineError::Validation(e.to_string()))?;

        if request.reward <= Decimal::ZERO {
            return Err(RewardEngineError::Validation(
                "Task reward must be positive".to_string(),
            ));
        }

        let difficulty = request.difficulty.unwrap_or(TaskDifficulty::Medium);
        let task = self
            .db
            .create_task(
                &request.title,
                &request.description,
                request.reward,
                difficulty,
                request.created_by,
            )
            .await?;

        info!("Created task {} with reward {}", task.id, task.reward);
        Ok(task)
    }

    pub async fn publish_task(&self, task_id: Uuid) -> Result<Task> {
        let task = self
            .db
            .publish_task(task_id)
            .await?
            .ok_or(RewardEngineError::TaskNotFound(task_id))?;

        info!("Published task {}", task.id);
        Ok(task)
    }

    pub async fn list_published_tasks(&self) -> Result<Vec<Task>> {
        self.db.list_published_tasks().await
    }

    pub async fn list_all_tasks(&self) -> Result<Vec<Task>> {
        self.db.list_all_tasks().await
    }

    /// Accept a proof-of-completion submission for a published task
    pub async fn submit_task(&self, request: SubmitTaskRequest) -> Result<TaskSubmission> {
        let task = self
            .db
            .get_task(request.task_id)
            .await?
            .ok_or(RewardEngineError::TaskNotFound(request.task_id))?;

        if !task.is_published {
            return Err(RewardEngineError::Validation(
                "Task is not published".to_string(),
            ));
        }

        let submission = self
            .db
            .create_submission(
                request.task_id,
                request.user_id,
                request.screenshot_url.as_deref(),
                request.link_url.as_deref(),
            )
            .await?;

        metrics::SUBMISSIONS_CREATED.inc();
        info!(
            "Submission {} received for task {} from user {}",
            submission.id, submission.task_id, submission.user_id
        );
        Ok(submission)
    }

    pub async fn list_submissions(&self, status: SubmissionStatus) -> Result<Vec<SubmissionReview>> {
        self.db.list_submissions(status).await
    }

    /// Approve a submission and settle its reward. The settlement itself
    /// is a single database transaction; the event and counters fire only
    /// after it commits.
    pub async fn approve_submission(
        &self,
        submission_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<SettlementOutcome> {
        let started = Instant::now();
        let (submission, user, reward) =
            self.db.approve_submission(submission_id, reviewer_id).await?;
        metrics::SETTLEMENT_DURATION.observe(started.elapsed().as_secs_f64());

        metrics::SUBMISSIONS_APPROVED.inc();
        metrics::REWARDS_CREDITED.inc_by(reward.to_f64().unwrap_or(0.0));

        let event = RewardEvent {
            event_type: RewardEventType::SubmissionApproved,
            user_id: Some(user.id),
            submission_id: Some(submission.id),
            amount: Some(reward),
            balance: Some(user.balance),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.nats.publish_reward_event(&event).await {
            error!("Failed to publish reward event: {}", e);
        }

        info!(
            "Approved submission {}: credited {} to user {}, balance {}, level {}",
            submission.id, reward, user.id, user.balance, user.level
        );

        Ok(SettlementOutcome {
            balance: user.balance,
            level: user.level,
            completed_tasks: user.completed_tasks,
        })
    }

    pub async fn reject_submission(
        &self,
        submission_id: Uuid,
        reviewer_id: Uuid,
        comment: &str,
    ) -> Result<TaskSubmission> {
        let submission = self
            .db
            .reject_submission(submission_id, reviewer_id, comment)
            .await?;

        metrics::SUBMISSIONS_REJECTED.inc();

        let event = RewardEvent {
            event_type: RewardEventType::SubmissionRejected,
            user_id: Some(submission.user_id),
            submission_id: Some(submission.id),
            amount: None,
            balance: None,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.nats.publish_reward_event(&event).await {
            error!("Failed to publish reward event: {}", e);
        }

        info!(
            "Rejected submission {} (reviewer {})",
            submission.id, reviewer_id
        );
        Ok(submission)
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let users = self.db.list_users().await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    pub async fn get_user_by_code(&self, code: &str) -> Result<UserLookup> {
        let code = code.trim();
        self.db
            .get_user_by_code(code)
            .await?
            .ok_or_else(|| RewardEngineError::UserCodeNotFound(code.to_string()))
    }

    pub async fn block_user(&self, user_id: Uuid, is_blocked: bool) -> Result<UserProfile> {
        let user = self
            .db
            .set_user_blocked(user_id, is_blocked)
            .await?
            .ok_or(RewardEngineError::UserNotFound(user_id))?;

        info!("User {} is_blocked set to {}", user.id, user.is_blocked);
        Ok(user.into())
    }

    /// Manual balance adjustment; the amount is signed and the database
    /// refuses to take a balance below zero
    pub async fn adjust_balance(
        &self,
        user_id: Uuid,
        amount: Decimal,
        admin_id: Uuid,
    ) -> Result<UserProfile> {
        let user = self.db.adjust_balance(user_id, amount).await?;

        metrics::ADMIN_ADJUSTMENTS.inc();

        let event = RewardEvent {
            event_type: RewardEventType::BalanceAdjusted,
            user_id: Some(user.id),
            submission_id: None,
            amount: Some(amount),
            balance: Some(user.balance),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.nats.publish_reward_event(&event).await {
            error!("Failed to publish reward event: {}", e);
        }

        info!(
            "Admin {} adjusted balance of user {} by {}, new balance {}",
            admin_id, user.id, amount, user.balance
        );
        Ok(user.into())
    }

    /// Zero all non-admin balances, leaving a compensating ledger entry
    /// per user. Returns how many users were reset.
    pub async fn reset_all_balances(&self) -> Result<u64> {
        let users_reset = self.db.reset_all_balances().await?;

        let event = RewardEvent {
            event_type: RewardEventType::BalancesReset,
            user_id: None,
            submission_id: None,
            amount: None,
            balance: None,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.nats.publish_reward_event(&event).await {
            error!("Failed to publish reward event: {}", e);
        }

        info!("Reset balances for {} users", users_reset);
        Ok(users_reset)
    }
}

/// A username is allowed when it contains none of the forbidden words,
/// case-insensitively. The forbidden list is expected lowercased.
pub fn username_allowed(username: &str, forbidden_usernames: &[String]) -> bool {
    let lowered = username.to_lowercase();
    !forbidden_usernames
        .iter()
        .any(|word| lowered.contains(word.as_str()))
}

/// Passwords are measured in characters, not bytes.
pub fn password_long_enough(password: &str, min_length: usize) -> bool {
    password.chars().count() >= min_length
}

fn generate_user_code() -> String {
    let mut rng = rand::thread_rng();
    (0..USER_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
