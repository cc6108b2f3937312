// Integration Tests for the Settlement Engine and review lifecycle

#[cfg(test)]
mod tests {
    use actix_web::error::ResponseError;
    use actix_web::http::StatusCode;
    use reward_engine::errors::RewardEngineError;
    use reward_engine::models::{SubmissionStatus, TaskDifficulty};
    use reward_engine::services::{password_long_enough, username_allowed};
    use uuid::Uuid;

    fn forbidden() -> Vec<String> {
        ["admin", "administrator", "root", "moderator"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_error_kinds_map_to_status_codes() {
        let id = Uuid::new_v4();

        assert_eq!(
            RewardEngineError::SubmissionNotFound(id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RewardEngineError::TaskNotFound(id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RewardEngineError::UserNotFound(id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RewardEngineError::UserCodeNotFound("0".repeat(20)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RewardEngineError::InvalidState {
                submission_id: id,
                status: "approved".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RewardEngineError::DuplicateSubmission {
                task_id: id,
                user_id: id
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RewardEngineError::UsernameTaken("taken".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RewardEngineError::Conflict("deadlock detected".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RewardEngineError::Validation("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RewardEngineError::InsufficientBalance {
                required: "25".to_string(),
                available: "10".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RewardEngineError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RewardEngineError::UserBlocked.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RewardEngineError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_submission_status_parsing() {
        assert_eq!(
            "pending".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Pending
        );
        assert_eq!(
            "approved".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Approved
        );
        assert_eq!(
            "rejected".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Rejected
        );
        assert!("Pending".parse::<SubmissionStatus>().is_err());
        assert!("settled".parse::<SubmissionStatus>().is_err());
    }

    #[test]
    fn test_status_and_difficulty_wire_format() {
        assert_eq!(SubmissionStatus::Approved.to_string(), "approved");
        assert_eq!(
            serde_json::to_string(&TaskDifficulty::Easy).unwrap(),
            "\"easy\""
        );
        assert_eq!(
            serde_json::from_str::<TaskDifficulty>("\"hard\"").unwrap(),
            TaskDifficulty::Hard
        );
    }

    #[test]
    fn test_forbidden_username_examples() {
        // Case-insensitive substring match, not exact match
        assert!(!username_allowed("Administrator99", &forbidden()));
        assert!(!username_allowed("admin", &forbidden()));
        assert!(!username_allowed("ROOTbeer", &forbidden()));
        assert!(!username_allowed("the_moderator", &forbidden()));

        assert!(username_allowed("megafan", &forbidden()));
        assert!(username_allowed("stepan", &forbidden()));
        assert!(username_allowed("mod", &forbidden()));
    }

    #[test]
    fn test_password_length_boundary() {
        assert!(!password_long_enough("abc", 4));
        assert!(password_long_enough("abcd", 4));
        assert!(password_long_enough("abcde", 4));
    }
}

// Database-backed settlement tests.
//
// Note: These tests require a test database
// They are marked as ignored and can be run with --ignored flag.
// Point TEST_DATABASE_URL (or DATABASE_URL) at a disposable Postgres and
// run with --test-threads=1; the reset test touches every non-admin row.
#[cfg(test)]
mod db_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use reward_engine::auth;
    use reward_engine::database::{
        Database, ADJUSTMENT_DESCRIPTION, RESET_DESCRIPTION, REWARD_DESCRIPTION,
    };
    use reward_engine::errors::RewardEngineError;
    use reward_engine::level::level_for;
    use reward_engine::models::{
        SubmissionStatus, Task, TaskDifficulty, TransactionType, User,
    };

    async fn create_test_db() -> Database {
        let url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .expect("TEST_DATABASE_URL or DATABASE_URL must be set");
        let db = Database::new(&url, 5).await.expect("database connection");
        sqlx::migrate!("./migrations")
            .run(db.pool())
            .await
            .expect("migrations");
        db
    }

    fn unique_code() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        (0..20)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    async fn seed_user(db: &Database) -> User {
        let username = format!("user_{}", Uuid::new_v4().simple());
        let hash = auth::hash_password("pw-good-enough").unwrap();
        db.create_user(&username, "", "", &hash, &unique_code())
            .await
            .unwrap()
    }

    async fn seed_user_with(db: &Database, balance: Decimal, completed_tasks: i32) -> User {
        let user = seed_user(db).await;
        sqlx::query(
            "UPDATE users SET balance = $1, completed_tasks = $2, level = $3 WHERE id = $4",
        )
        .bind(balance)
        .bind(completed_tasks)
        .bind(level_for(completed_tasks))
        .bind(user.id)
        .execute(db.pool())
        .await
        .unwrap();
        db.get_user(user.id).await.unwrap().unwrap()
    }

    async fn seed_published_task(db: &Database, reward: Decimal) -> Task {
        let task = db
            .create_task(
                "Invite five friends",
                "Bring five active referrals with screenshots",
                reward,
                TaskDifficulty::Medium,
                None,
            )
            .await
            .unwrap();
        db.publish_task(task.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_approve_settles_exactly_once() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let reviewer = seed_user(&db).await;
        let task = seed_published_task(&db, dec!(25.00)).await;
        let submission = db
            .create_submission(task.id, user.id, Some("https://img.example/1.png"), None)
            .await
            .unwrap();

        let (settled, updated, reward) = db
            .approve_submission(submission.id, reviewer.id)
            .await
            .unwrap();

        assert_eq!(settled.status, SubmissionStatus::Approved);
        assert_eq!(settled.reviewed_by, Some(reviewer.id));
        assert!(settled.reviewed_at.is_some());
        assert_eq!(reward, dec!(25.00));
        assert_eq!(updated.balance, dec!(25.00));
        assert_eq!(updated.completed_tasks, 1);
        assert_eq!(updated.level, 1);

        let ledger = db.transactions_for_user(user.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].transaction_type, TransactionType::Task);
        assert_eq!(ledger[0].amount, dec!(25.00));
        assert_eq!(ledger[0].submission_id, Some(submission.id));
        assert_eq!(ledger[0].description, REWARD_DESCRIPTION);

        // A second review of any kind must fail without further effects.
        let err = db
            .approve_submission(submission.id, reviewer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardEngineError::InvalidState { .. }));
        let err = db
            .reject_submission(submission.id, reviewer.id, "late")
            .await
            .unwrap_err();
        assert!(matches!(err, RewardEngineError::InvalidState { .. }));

        let after = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(after.balance, dec!(25.00));
        assert_eq!(after.completed_tasks, 1);
        assert_eq!(db.transactions_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_approve_unknown_submission_not_found() {
        let db = create_test_db().await;
        let reviewer = seed_user(&db).await;

        let err = db
            .approve_submission(Uuid::new_v4(), reviewer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardEngineError::SubmissionNotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_fifth_completion_promotes_and_credits() {
        let db = create_test_db().await;
        let user = seed_user_with(&db, dec!(100.00), 4).await;
        let reviewer = seed_user(&db).await;
        let task = seed_published_task(&db, dec!(25.00)).await;
        let submission = db
            .create_submission(task.id, user.id, None, Some("https://proof.example"))
            .await
            .unwrap();

        let (_, updated, _) = db
            .approve_submission(submission.id, reviewer.id)
            .await
            .unwrap();

        assert_eq!(updated.balance, dec!(125.00));
        assert_eq!(updated.completed_tasks, 5);
        assert_eq!(updated.level, 2);
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_reviews_settle_exactly_once() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let reviewer_a = seed_user(&db).await;
        let reviewer_b = seed_user(&db).await;
        let task = seed_published_task(&db, dec!(10.00)).await;
        let submission = db
            .create_submission(task.id, user.id, None, None)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            db.approve_submission(submission.id, reviewer_a.id),
            db.approve_submission(submission.id, reviewer_b.id),
        );

        // Exactly one reviewer wins the claim.
        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(
            loser.unwrap_err(),
            RewardEngineError::InvalidState { .. }
        ));

        let after = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(after.balance, dec!(10.00));
        assert_eq!(after.completed_tasks, 1);
        assert_eq!(db.transactions_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_settlements_same_user_both_land() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let reviewer = seed_user(&db).await;
        let task_a = seed_published_task(&db, dec!(10.00)).await;
        let task_b = seed_published_task(&db, dec!(15.00)).await;
        let sub_a = db
            .create_submission(task_a.id, user.id, None, None)
            .await
            .unwrap();
        let sub_b = db
            .create_submission(task_b.id, user.id, None, None)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            db.approve_submission(sub_a.id, reviewer.id),
            db.approve_submission(sub_b.id, reviewer.id),
        );
        first.unwrap();
        second.unwrap();

        // The user row lock serializes the two credits; neither is lost.
        let after = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(after.balance, dec!(25.00));
        assert_eq!(after.completed_tasks, 2);

        let ledger = db.transactions_for_user(user.id).await.unwrap();
        let total: Decimal = ledger.iter().map(|t| t.amount).sum();
        assert_eq!(total, dec!(25.00));
    }

    #[tokio::test]
    #[ignore]
    async fn test_reject_records_comment_without_balance_effect() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let reviewer = seed_user(&db).await;
        let task = seed_published_task(&db, dec!(50.00)).await;
        let submission = db
            .create_submission(task.id, user.id, Some("https://img.example/2.png"), None)
            .await
            .unwrap();

        let rejected = db
            .reject_submission(submission.id, reviewer.id, "Blurry screenshot")
            .await
            .unwrap();

        assert_eq!(rejected.status, SubmissionStatus::Rejected);
        assert_eq!(rejected.admin_comment.as_deref(), Some("Blurry screenshot"));
        assert_eq!(rejected.reviewed_by, Some(reviewer.id));

        let after = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(after.balance, dec!(0.00));
        assert_eq!(after.completed_tasks, 0);
        assert!(db.transactions_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_duplicate_pending_submission_rejected() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let reviewer = seed_user(&db).await;
        let task = seed_published_task(&db, dec!(5.00)).await;

        let first = db
            .create_submission(task.id, user.id, None, None)
            .await
            .unwrap();

        let err = db
            .create_submission(task.id, user.id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RewardEngineError::DuplicateSubmission { .. }
        ));

        // After a rejection the user may try again.
        db.reject_submission(first.id, reviewer.id, "incomplete")
            .await
            .unwrap();
        db.create_submission(task.id, user.id, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_adjustments_symmetric_and_ledgered() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;

        let after_credit = db.adjust_balance(user.id, dec!(50.00)).await.unwrap();
        assert_eq!(after_credit.balance, dec!(50.00));

        let after_debit = db.adjust_balance(user.id, dec!(-50.00)).await.unwrap();
        assert_eq!(after_debit.balance, dec!(0.00));

        let ledger = db.transactions_for_user(user.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger
            .iter()
            .all(|t| t.transaction_type == TransactionType::Admin
                && t.description == ADJUSTMENT_DESCRIPTION));
        let total: Decimal = ledger.iter().map(|t| t.amount).sum();
        assert_eq!(total, dec!(0.00));
    }

    #[tokio::test]
    #[ignore]
    async fn test_adjustment_below_zero_refused() {
        let db = create_test_db().await;
        let user = seed_user_with(&db, dec!(10.00), 0).await;

        let err = db.adjust_balance(user.id, dec!(-25.00)).await.unwrap_err();
        assert!(matches!(
            err,
            RewardEngineError::InsufficientBalance { .. }
        ));

        let after = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(after.balance, dec!(10.00));
        assert!(db.transactions_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_adjustment_unknown_user_not_found() {
        let db = create_test_db().await;

        let err = db
            .adjust_balance(Uuid::new_v4(), dec!(5.00))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardEngineError::UserNotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_reset_appends_compensating_entries() {
        let db = create_test_db().await;
        let user_a = seed_user(&db).await;
        let user_b = seed_user(&db).await;
        let admin = seed_user(&db).await;
        sqlx::query("UPDATE users SET is_admin = TRUE, balance = 40 WHERE id = $1")
            .bind(admin.id)
            .execute(db.pool())
            .await
            .unwrap();

        db.adjust_balance(user_a.id, dec!(30.00)).await.unwrap();
        db.adjust_balance(user_b.id, dec!(70.00)).await.unwrap();

        let users_reset = db.reset_all_balances().await.unwrap();
        assert!(users_reset >= 2);

        for (user, seeded) in [(&user_a, dec!(30.00)), (&user_b, dec!(70.00))] {
            let after = db.get_user(user.id).await.unwrap().unwrap();
            assert_eq!(after.balance, dec!(0.00));

            let ledger = db.transactions_for_user(user.id).await.unwrap();
            let reset_entry = ledger
                .iter()
                .find(|t| t.description == RESET_DESCRIPTION)
                .expect("compensating entry");
            assert_eq!(reset_entry.amount, -seeded);
            assert_eq!(reset_entry.transaction_type, TransactionType::Admin);

            // Balance equals the sum of the user's ledger after the reset.
            let total: Decimal = ledger.iter().map(|t| t.amount).sum();
            assert_eq!(total, dec!(0.00));
        }

        // Admin balances are out of scope for the reset.
        let admin_after = db.get_user(admin.id).await.unwrap().unwrap();
        assert_eq!(admin_after.balance, dec!(40.00));
        assert!(db.transactions_for_user(admin.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_reset_stays_ledger_consistent_under_concurrent_credit() {
        let db = Arc::new(create_test_db().await);
        let funded = seed_user(&db).await;
        let victim = seed_user(&db).await;
        db.adjust_balance(funded.id, dec!(40.00)).await.unwrap();

        // Hold the funded user's row so the reset stalls mid-statement,
        // then credit a user who held nothing when the reset started.
        let mut blocker = db.pool().begin().await.unwrap();
        sqlx::query("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(funded.id)
            .fetch_one(&mut *blocker)
            .await
            .unwrap();

        let reset = tokio::spawn({
            let db = db.clone();
            async move { db.reset_all_balances().await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        db.adjust_balance(victim.id, dec!(25.00)).await.unwrap();

        blocker.rollback().await.unwrap();
        let users_reset = reset.await.unwrap().unwrap();
        assert!(users_reset >= 1);

        // Whichever side of the reset the credit landed on, every balance
        // must still equal the sum of that user's ledger.
        for user in [&funded, &victim] {
            let after = db.get_user(user.id).await.unwrap().unwrap();
            let ledger = db.transactions_for_user(user.id).await.unwrap();
            let total: Decimal = ledger.iter().map(|t| t.amount).sum();
            assert_eq!(after.balance, total);
        }

        let funded_after = db.get_user(funded.id).await.unwrap().unwrap();
        assert_eq!(funded_after.balance, dec!(0.00));
        let funded_ledger = db.transactions_for_user(funded.id).await.unwrap();
        let compensation = funded_ledger
            .iter()
            .find(|t| t.description == RESET_DESCRIPTION)
            .expect("compensating entry");
        assert_eq!(compensation.amount, dec!(-40.00));
    }

    #[tokio::test]
    #[ignore]
    async fn test_balance_equals_ledger_sum() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let reviewer = seed_user(&db).await;

        db.adjust_balance(user.id, dec!(10.00)).await.unwrap();

        let task = seed_published_task(&db, dec!(25.00)).await;
        let submission = db
            .create_submission(task.id, user.id, None, None)
            .await
            .unwrap();
        db.approve_submission(submission.id, reviewer.id)
            .await
            .unwrap();

        db.adjust_balance(user.id, dec!(-5.00)).await.unwrap();

        let after = db.get_user(user.id).await.unwrap().unwrap();
        let ledger = db.transactions_for_user(user.id).await.unwrap();
        let total: Decimal = ledger.iter().map(|t| t.amount).sum();

        assert_eq!(after.balance, dec!(30.00));
        assert_eq!(total, after.balance);
    }

    #[tokio::test]
    #[ignore]
    async fn test_blocked_user_hidden_from_code_lookup() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;

        assert!(db
            .get_user_by_code(&user.user_code)
            .await
            .unwrap()
            .is_some());

        db.set_user_blocked(user.id, true).await.unwrap();
        assert!(db
            .get_user_by_code(&user.user_code)
            .await
            .unwrap()
            .is_none());

        db.set_user_blocked(user.id, false).await.unwrap();
        assert!(db
            .get_user_by_code(&user.user_code)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    #[ignore]
    async fn test_submission_listing_carries_context() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let task = seed_published_task(&db, dec!(12.50)).await;
        let submission = db
            .create_submission(task.id, user.id, Some("https://img.example/3.png"), None)
            .await
            .unwrap();

        let pending = db
            .list_submissions(SubmissionStatus::Pending)
            .await
            .unwrap();
        let entry = pending
            .iter()
            .find(|s| s.id == submission.id)
            .expect("submission listed");

        assert_eq!(entry.task_title, task.title);
        assert_eq!(entry.reward, dec!(12.50));
        assert_eq!(entry.username, user.username);
        assert_eq!(entry.status, SubmissionStatus::Pending);
    }

    #[tokio::test]
    #[ignore]
    async fn test_duplicate_username_conflict() {
        let db = create_test_db().await;
        let user = seed_user(&db).await;
        let hash = auth::hash_password("pw-good-enough").unwrap();

        let err = db
            .create_user(&user.username, "", "", &hash, &unique_code())
            .await
            .unwrap_err();
        assert!(matches!(err, RewardEngineError::UsernameTaken(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_unpublished_tasks_hidden() {
        let db = create_test_db().await;
        let task = db
            .create_task(
                "Draft task",
                "Not visible yet",
                dec!(5.00),
                TaskDifficulty::Easy,
                None,
            )
            .await
            .unwrap();

        let published = db.list_published_tasks().await.unwrap();
        assert!(published.iter().all(|t| t.id != task.id));

        let all = db.list_all_tasks().await.unwrap();
        assert!(all.iter().any(|t| t.id == task.id));

        db.publish_task(task.id).await.unwrap().unwrap();
        let published = db.list_published_tasks().await.unwrap();
        assert!(published.iter().any(|t| t.id == task.id && t.is_published));
    }
}
