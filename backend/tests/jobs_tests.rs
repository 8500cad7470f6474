/// Integration tests for the operator-only batch jobs: the scheduled default
/// sweep, liquidation by valuation, and the audit event drain.
mod helpers;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use helpers::{send, terms_json, token_for, TestContext};

/// Drive a loan to `Repaying` over HTTP. Returns the loan id.
async fn open_repaying_loan(
    ctx: &TestContext,
    lender_token: &str,
    borrower_token: &str,
    repayment_count: u32,
    deadline: i64,
) -> u64 {
    send(
        &ctx.app,
        "POST",
        "/api/account/fiat/deposit",
        Some(lender_token),
        Some(json!({ "amount": 1_000 })),
    )
    .await;
    send(
        &ctx.app,
        "POST",
        "/api/account/collateral/deposit",
        Some(borrower_token),
        Some(json!({ "amount": 500 })),
    )
    .await;

    let (_, json) = send(
        &ctx.app,
        "POST",
        "/api/loans",
        Some(lender_token),
        Some(terms_json(repayment_count)),
    )
    .await;
    let loan_id = json["loan_id"].as_u64().expect("loan_id in response");

    send(
        &ctx.app,
        "POST",
        &format!("/api/loans/{loan_id}/request"),
        Some(borrower_token),
        None,
    )
    .await;
    let (status, _) = send(
        &ctx.app,
        "POST",
        &format!("/api/loans/{loan_id}/disburse"),
        Some(lender_token),
        Some(json!({ "next_deadline": deadline })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    loan_id
}

#[tokio::test]
async fn test_batch_jobs_require_operator() {
    let ctx = TestContext::new();
    let user_token = token_for(Uuid::new_v4());

    let (status, _) = send(
        &ctx.app,
        "POST",
        "/api/jobs/default-check",
        Some(&user_token),
        Some(json!({ "deadline": 1_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &ctx.app,
        "POST",
        "/api/jobs/liquidate",
        Some(&user_token),
        Some(json!({ "requests": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&ctx.app, "GET", "/api/events", Some(&user_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_default_check_defaults_overdue_loan() {
    let ctx = TestContext::new();
    let lender = Uuid::new_v4();
    let borrower = Uuid::new_v4();
    let lender_token = token_for(lender);
    let borrower_token = token_for(borrower);
    let operator_token = token_for(ctx.operator);

    let loan_id = open_repaying_loan(&ctx, &lender_token, &borrower_token, 2, 1_000).await;

    let (status, json) = send(
        &ctx.app,
        "POST",
        "/api/jobs/default-check",
        Some(&operator_token),
        Some(json!({ "deadline": 1_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["defaulted"], json!([loan_id]));

    let (_, json) = send(
        &ctx.app,
        "GET",
        &format!("/api/loans/{loan_id}"),
        Some(&lender_token),
        None,
    )
    .await;
    assert_eq!(json["loan"]["status"], "Defaulted");

    // The forfeited collateral is in the lender's spendable balance.
    let (_, json) = send(
        &ctx.app,
        "GET",
        "/api/account/balances",
        Some(&lender_token),
        None,
    )
    .await;
    assert_eq!(json["collateral"], 500);

    // A second sweep finds nothing left to default.
    let (status, json) = send(
        &ctx.app,
        "POST",
        "/api/jobs/default-check",
        Some(&operator_token),
        Some(json!({ "deadline": 9_999 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["defaulted"], json!([]));
}

#[tokio::test]
async fn test_liquidation_with_covering_valuation() {
    let ctx = TestContext::new();
    let lender = Uuid::new_v4();
    let borrower = Uuid::new_v4();
    let lender_token = token_for(lender);
    let borrower_token = token_for(borrower);
    let operator_token = token_for(ctx.operator);

    // gross remaining repayment = 4 × 100 = 400; vault holds 500.
    let loan_id = open_repaying_loan(&ctx, &lender_token, &borrower_token, 4, 1_000).await;

    let (status, _) = send(
        &ctx.app,
        "POST",
        "/api/jobs/liquidate",
        Some(&operator_token),
        Some(json!({
            "requests": [{
                "loan_id": loan_id,
                "collateral_value_fiat": 450,
                "collateral_payable": 100,
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(
        &ctx.app,
        "GET",
        &format!("/api/loans/{loan_id}"),
        Some(&lender_token),
        None,
    )
    .await;
    assert_eq!(json["loan"]["status"], "Completed");

    let (_, json) = send(
        &ctx.app,
        "GET",
        "/api/account/balances",
        Some(&lender_token),
        None,
    )
    .await;
    assert_eq!(json["fiat"], 400);

    let (_, json) = send(
        &ctx.app,
        "GET",
        "/api/account/balances",
        Some(&borrower_token),
        None,
    )
    .await;
    assert_eq!(json["fiat"], 1_100);
}

#[tokio::test]
async fn test_liquidation_with_shortfall_valuation() {
    let ctx = TestContext::new();
    let lender = Uuid::new_v4();
    let borrower = Uuid::new_v4();
    let lender_token = token_for(lender);
    let borrower_token = token_for(borrower);
    let operator_token = token_for(ctx.operator);

    let loan_id = open_repaying_loan(&ctx, &lender_token, &borrower_token, 4, 1_000).await;

    let (status, _) = send(
        &ctx.app,
        "POST",
        "/api/jobs/liquidate",
        Some(&operator_token),
        Some(json!({
            "requests": [{
                "loan_id": loan_id,
                "collateral_value_fiat": 399,
                "collateral_payable": 0,
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(
        &ctx.app,
        "GET",
        &format!("/api/loans/{loan_id}"),
        Some(&lender_token),
        None,
    )
    .await;
    assert_eq!(json["loan"]["status"], "Defaulted");

    // The whole vault went to the lender as collateral.
    let (_, json) = send(
        &ctx.app,
        "GET",
        "/api/account/balances",
        Some(&lender_token),
        None,
    )
    .await;
    assert_eq!(json["collateral"], 500);
    assert_eq!(json["fiat"], 0);
}

#[tokio::test]
async fn test_event_drain_returns_audit_trail_once() {
    let ctx = TestContext::new();
    let lender = Uuid::new_v4();
    let borrower = Uuid::new_v4();
    let lender_token = token_for(lender);
    let borrower_token = token_for(borrower);
    let operator_token = token_for(ctx.operator);

    open_repaying_loan(&ctx, &lender_token, &borrower_token, 2, 1_000).await;

    let (status, json) = send(&ctx.app, "GET", "/api/events", Some(&operator_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let events = json["events"].as_array().expect("events array");
    assert!(!events.is_empty());
    assert!(events
        .iter()
        .any(|event| event["kind"] == "loan_disbursed"));
    assert!(events
        .iter()
        .any(|event| event["kind"] == "collateral_escrowed"));

    // Draining empties the log.
    let (_, json) = send(&ctx.app, "GET", "/api/events", Some(&operator_token), None).await;
    assert_eq!(json["events"], json!([]));
}
