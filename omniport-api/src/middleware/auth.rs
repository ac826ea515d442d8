use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Passenger,
    Driver,
    Operator,
}

/// Identity issuance lives outside the engine; we only verify.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::AuthorizationError(format!(
                "{:?} role may not perform this action",
                self.role
            )))
        }
    }

    /// Passengers only ever see their own bookings; staff see everything.
    pub fn owner_scope(&self) -> Option<&str> {
        match self.role {
            Role::Passenger => Some(self.sub.as_str()),
            Role::Driver | Role::Operator => None,
        }
    }
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))
}

/// Verifies the bearer token and injects [`Claims`] into the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(role: Role, exp: usize) -> String {
        let claims = Claims { sub: "rider-1".into(), role, exp };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap()
    }

    #[test]
    fn test_roundtrip_and_role_check() {
        let exp = (chrono::Utc::now().timestamp() + 600) as usize;
        let claims = decode_claims(&token(Role::Driver, exp), "secret").unwrap();
        assert_eq!(claims.role, Role::Driver);
        assert!(claims.require(&[Role::Driver, Role::Operator]).is_ok());
        assert!(claims.require(&[Role::Passenger]).is_err());
        assert_eq!(claims.owner_scope(), None);
    }

    #[test]
    fn test_rejects_expired_and_foreign_tokens() {
        let past = (chrono::Utc::now().timestamp() - 3600) as usize;
        assert!(decode_claims(&token(Role::Passenger, past), "secret").is_err());

        let exp = (chrono::Utc::now().timestamp() + 600) as usize;
        assert!(decode_claims(&token(Role::Passenger, exp), "other-secret").is_err());
    }
}
