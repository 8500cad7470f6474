//! HTTP routes over the orchestration gateway.
//!
//! Every `/api` route resolves the caller from its bearer token and forwards
//! the operation with that principal; the gateway enforces the
//! self-authentication and operator rules.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use loan_gateway::{LiquidationRequest, LoanId, LoanTerms};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/loans", post(initiate_loan).get(list_loans))
        .route("/api/loans/:id", get(loan_details))
        .route("/api/loans/:id/request", post(request_loan))
        .route("/api/loans/:id/cancel", post(cancel_loan))
        .route("/api/loans/:id/disburse", post(disburse_loan))
        .route("/api/loans/:id/repay", post(repay_loan))
        .route("/api/account/collateral/deposit", post(deposit_collateral))
        .route("/api/account/collateral/withdraw", post(withdraw_collateral))
        .route("/api/account/fiat/deposit", post(deposit_fiat))
        .route("/api/account/fiat/withdraw", post(withdraw_fiat))
        .route("/api/account/balances", get(balances))
        .route("/api/account/bank-transfer", post(bank_transfer))
        .route("/api/jobs/default-check", post(default_check))
        .route("/api/jobs/liquidate", post(liquidate))
        .route("/api/events", get(drain_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request bodies ─────────────────────────────────

#[derive(Deserialize)]
struct AmountRequest {
    amount: u64,
}

#[derive(Deserialize)]
struct DisburseRequest {
    next_deadline: i64,
}

#[derive(Deserialize)]
struct RepayRequest {
    pay_value: u64,
    next_deadline: i64,
}

#[derive(Deserialize)]
struct BankTransferRequest {
    bank_account: String,
    amount: u64,
}

#[derive(Deserialize)]
struct DefaultCheckRequest {
    deadline: i64,
}

#[derive(Deserialize)]
struct LiquidateRequest {
    requests: Vec<LiquidationRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    Lender,
    Borrower,
}

#[derive(Deserialize)]
struct ListLoansQuery {
    role: Option<Role>,
}

// ─── Handlers ───────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now().timestamp() }))
}

async fn initiate_loan(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(terms): Json<LoanTerms>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    let loan_id = gateway.initiate_loan(caller, caller, terms)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "loan_id": loan_id })),
    ))
}

async fn list_loans(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Query(query): Query<ListLoansQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let gateway = state.gateway.lock().await;
    let loans = match query.role.unwrap_or(Role::Lender) {
        Role::Lender => gateway.lender_loans(caller, caller)?,
        Role::Borrower => gateway.borrower_loans(caller, caller)?,
    };
    Ok(Json(json!({ "status": "success", "loans": loans })))
}

async fn loan_details(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(loan_id): Path<LoanId>,
) -> Result<impl IntoResponse, ApiError> {
    let gateway = state.gateway.lock().await;
    let loan = gateway.loan_details(caller, loan_id)?;
    Ok(Json(json!({ "status": "success", "loan": loan })))
}

async fn request_loan(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(loan_id): Path<LoanId>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.request_loan(caller, caller, loan_id)?;
    Ok(Json(json!({ "status": "success", "message": "Loan requested" })))
}

async fn cancel_loan(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(loan_id): Path<LoanId>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.cancel_loan(caller, caller, loan_id)?;
    Ok(Json(json!({ "status": "success", "message": "Loan cancelled" })))
}

async fn disburse_loan(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(loan_id): Path<LoanId>,
    Json(body): Json<DisburseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.disburse_loan(caller, caller, loan_id, body.next_deadline)?;
    Ok(Json(json!({ "status": "success", "message": "Loan disbursed" })))
}

async fn repay_loan(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(loan_id): Path<LoanId>,
    Json(body): Json<RepayRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    let fully_repaid =
        gateway.make_repayment(caller, caller, loan_id, body.pay_value, body.next_deadline)?;
    let message = if fully_repaid {
        "Loan fully repaid"
    } else {
        "Repayment recorded"
    };
    Ok(Json(
        json!({ "status": "success", "message": message, "fully_repaid": fully_repaid }),
    ))
}

async fn deposit_collateral(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<AmountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.store_collateral(caller, caller, body.amount)?;
    Ok(Json(json!({ "status": "success", "message": "Collateral stored" })))
}

async fn withdraw_collateral(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<AmountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.withdraw_collateral(caller, caller, body.amount)?;
    Ok(Json(json!({ "status": "success", "message": "Collateral withdrawn" })))
}

async fn deposit_fiat(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<AmountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.store_fiat(caller, caller, body.amount)?;
    Ok(Json(json!({ "status": "success", "message": "Fiat stored" })))
}

async fn withdraw_fiat(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<AmountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.withdraw_fiat(caller, caller, body.amount)?;
    Ok(Json(json!({ "status": "success", "message": "Fiat withdrawn" })))
}

async fn balances(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let gateway = state.gateway.lock().await;
    let balances = gateway.balances(caller, caller)?;
    Ok(Json(json!({
        "status": "success",
        "collateral": balances.collateral,
        "fiat": balances.fiat,
    })))
}

async fn bank_transfer(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<BankTransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.transfer_fiat_to_bank(caller, caller, &body.bank_account, body.amount)?;
    Ok(Json(
        json!({ "status": "success", "message": "Bank transfer instructed" }),
    ))
}

async fn default_check(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<DefaultCheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    let defaulted = gateway.check_borrower_default(caller, body.deadline)?;
    Ok(Json(json!({ "status": "success", "defaulted": defaulted })))
}

async fn liquidate(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<LiquidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    gateway.liquidate_loans(caller, &body.requests)?;
    Ok(Json(json!({ "status": "success", "message": "Liquidation applied" })))
}

async fn drain_events(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut gateway = state.gateway.lock().await;
    let events = gateway.drain_events(caller)?;
    Ok(Json(json!({ "status": "success", "events": events })))
}
