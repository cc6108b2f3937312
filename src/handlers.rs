use crate::errors::RewardEngineError;
use crate::metrics;
use crate::models::{
    AdjustBalanceRequest, ApproveSubmissionRequest, BlockUserRequest, CreateTaskRequest,
    ListSubmissionsQuery, LoginRequest, RegisterRequest, RejectSubmissionRequest,
    SubmissionStatus, SubmitTaskRequest,
};
use crate::services::RewardService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "reward-engine",
        "version": "1.0.0"
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> Result<HttpResponse, RewardEngineError> {
    let body = metrics::metrics_handler()
        .map_err(|e| RewardEngineError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

/// Register a new participant
pub async fn register(
    service: web::Data<Arc<RewardService>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    let user = service.register(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

/// Verify credentials
pub async fn login(
    service: web::Data<Arc<RewardService>>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    let user = service.login(request.into_inner()).await?;
    let is_admin = user.is_admin;
    Ok(HttpResponse::Ok().json(json!({ "user": user, "isAdmin": is_admin })))
}

/// List published tasks (participant view)
pub async fn list_published_tasks(
    service: web::Data<Arc<RewardService>>,
) -> Result<HttpResponse, RewardEngineError> {
    let tasks = service.list_published_tasks().await?;
    Ok(HttpResponse::Ok().json(json!({ "tasks": tasks })))
}

/// List all tasks including unpublished (admin view)
pub async fn list_all_tasks(
    service: web::Data<Arc<RewardService>>,
) -> Result<HttpResponse, RewardEngineError> {
    let tasks = service.list_all_tasks().await?;
    Ok(HttpResponse::Ok().json(json!({ "tasks": tasks })))
}

/// Create a task; it stays unpublished until explicitly published
pub async fn create_task(
    service: web::Data<Arc<RewardService>>,
    request: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    let task = service.create_task(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "task": task })))
}

/// Publish a task
pub async fn publish_task(
    service: web::Data<Arc<RewardService>>,
    task_id: web::Path<Uuid>,
) -> Result<HttpResponse, RewardEngineError> {
    let task = service.publish_task(*task_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "task": task })))
}

/// Accept a proof-of-completion submission
pub async fn submit_task(
    service: web::Data<Arc<RewardService>>,
    request: web::Json<SubmitTaskRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    let submission = service.submit_task(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "submission": submission })))
}

/// List submissions by status for review
pub async fn list_submissions(
    service: web::Data<Arc<RewardService>>,
    query: web::Query<ListSubmissionsQuery>,
) -> Result<HttpResponse, RewardEngineError> {
    let status = match query.status.as_deref() {
        Some(raw) => raw
            .parse::<SubmissionStatus>()
            .map_err(RewardEngineError::Validation)?,
        None => SubmissionStatus::Pending,
    };

    let submissions = service.list_submissions(status).await?;
    Ok(HttpResponse::Ok().json(json!({ "submissions": submissions })))
}

/// Approve a submission and settle its reward
pub async fn approve_submission(
    service: web::Data<Arc<RewardService>>,
    submission_id: web::Path<Uuid>,
    request: web::Json<ApproveSubmissionRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    let outcome = service
        .approve_submission(*submission_id, request.admin_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "user": outcome })))
}

/// Reject a submission with a reviewer comment
pub async fn reject_submission(
    service: web::Data<Arc<RewardService>>,
    submission_id: web::Path<Uuid>,
    request: web::Json<RejectSubmissionRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    service
        .reject_submission(*submission_id, request.admin_id, &request.comment)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

/// List non-admin users, highest balance first
pub async fn list_users(
    service: web::Data<Arc<RewardService>>,
) -> Result<HttpResponse, RewardEngineError> {
    let users = service.list_users().await?;
    Ok(HttpResponse::Ok().json(json!({ "users": users })))
}

/// Look up a user by their 20-digit code
pub async fn get_user_by_code(
    service: web::Data<Arc<RewardService>>,
    code: web::Path<String>,
) -> Result<HttpResponse, RewardEngineError> {
    let user = service.get_user_by_code(&code).await?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

/// Block or unblock a user
pub async fn block_user(
    service: web::Data<Arc<RewardService>>,
    user_id: web::Path<Uuid>,
    request: web::Json<BlockUserRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    let user = service
        .block_user(*user_id, request.is_blocked.unwrap_or(true))
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

/// Adjust a user's balance by a signed amount
pub async fn adjust_balance(
    service: web::Data<Arc<RewardService>>,
    user_id: web::Path<Uuid>,
    request: web::Json<AdjustBalanceRequest>,
) -> Result<HttpResponse, RewardEngineError> {
    let user = service
        .adjust_balance(*user_id, request.amount, request.admin_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

/// Zero all non-admin balances with compensating ledger entries
pub async fn reset_balances(
    service: web::Data<Arc<RewardService>>,
) -> Result<HttpResponse, RewardEngineError> {
    let users_reset = service.reset_all_balances().await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "users_reset": users_reset })))
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics_endpoint))
        .service(
            web::scope("/api/v1/auth")
                .route("/register", web::post().to(register))
                .route("/login", web::post().to(login)),
        )
        .service(
            web::scope("/api/v1/tasks")
                .route("", web::get().to(list_published_tasks))
                .route("", web::post().to(create_task))
                .route("/all", web::get().to(list_all_tasks))
                .route("/submit", web::post().to(submit_task))
                .route("/{id}/publish", web::put().to(publish_task)),
        )
        .service(
            web::scope("/api/v1/submissions")
                .route("", web::get().to(list_submissions))
                .route("/{id}/approve", web::put().to(approve_submission))
                .route("/{id}/reject", web::put().to(reject_submission)),
        )
        .service(
            web::scope("/api/v1/users")
                .route("", web::get().to(list_users))
                .route("/by-code/{code}", web::get().to(get_user_by_code))
                .route("/reset-balances", web::post().to(reset_balances))
                .route("/{id}/block", web::put().to(block_user))
                .route("/{id}/balance", web::put().to(adjust_balance)),
        );
}
