use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use academy_core::identity::Identity;
use academy_shared::Masked;

use crate::state::AppState;

/// Claims issued by the sign-in service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: usize,
}

/// Inserted on every request; `None` for anonymous callers.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity(pub Option<Identity>);

pub fn decode_identity(token: &str, secret: &str) -> Result<Identity, StatusCode> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let claims = token_data.claims;
    let id = Uuid::parse_str(&claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(Identity {
        id,
        email: Masked(claims.email),
        is_admin: claims.is_admin,
    })
}

/// Resolves the bearer token into an identity. A missing header means an
/// anonymous request; a malformed or expired token is rejected.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .map(|h| h.to_str().map_err(|_| StatusCode::UNAUTHORIZED))
        .transpose()?;

    let identity = match auth_header {
        Some(header) => {
            let token = header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;
            let identity = decode_identity(token, &state.auth.secret)?;
            tracing::debug!(user_id = %identity.id, "request authenticated");
            Some(identity)
        }
        None => None,
    };

    req.extensions_mut().insert(RequestIdentity(identity));

    Ok(next.run(req).await)
}
