#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use loan_gateway::{Directory, Gateway, GATEWAY_NAME};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use colend_backend::{auth::AuthClaims, routes, state::AppState};

pub const JWT_SECRET: &str = "secret_key_change_in_production";

/// A router over a fresh, isolated gateway instance.
pub struct TestContext {
    pub app: Router,
    pub operator: Uuid,
}

impl TestContext {
    pub fn new() -> Self {
        let admin = Uuid::new_v4();
        let operator = Uuid::new_v4();

        let mut directory = Directory::new(admin);
        directory
            .register(admin, GATEWAY_NAME, Uuid::new_v4())
            .expect("failed to register gateway identity");
        let gateway =
            Gateway::bootstrap(&directory, admin, operator).expect("failed to bootstrap gateway");

        let state = AppState::new(gateway, JWT_SECRET.to_owned());
        Self {
            app: routes::app(state),
            operator,
        }
    }
}

pub fn token_for(principal: Uuid) -> String {
    let claims = AuthClaims { principal, exp: 0 };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode token")
}

/// Fire one request at the router and decode the JSON response.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("failed to parse JSON")
    };
    (status, json)
}

/// Loan terms used across the integration tests: 1000 fiat against 500
/// collateral, repaid in `repayment_count` cycles of 100.
pub fn terms_json(repayment_count: u32) -> Value {
    serde_json::json!({
        "loan_amount": 1_000,
        "collateral_amount": 500,
        "loan_term": 12,
        "apr": 1_200,
        "repayment_schedule": 30,
        "monthly_repayment_amount": 100,
        "repayment_count": repayment_count,
        "initial_ltv": 60,
        "margin_ltv": 75,
        "liquidation_ltv": 90,
    })
}
