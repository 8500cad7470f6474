//! Bearer-token authentication resolving the calling principal.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Claims carried by every API token. `principal` is the identity the
/// gateway authenticates the call against.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthClaims {
    pub principal: Uuid,
    pub exp: usize,
}

/// Extractor for the authenticated caller.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::MissingToken)?;
        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or(ApiError::MissingToken)?;

        let mut validation = Validation::new(Algorithm::HS256);
        // Token lifetime is managed by the issuer.
        validation.validate_exp = false;

        let data = decode::<AuthClaims>(
            token,
            &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| ApiError::InvalidToken)?;

        Ok(AuthUser(data.claims.principal))
    }
}
