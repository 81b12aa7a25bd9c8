//! Bearer-token authentication.
//!
//! Tokens are minted by the identity system and signed with a shared HS256
//! secret. This service only verifies them and turns the claims into a
//! [`Principal`] that handlers pass explicitly to every access check.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id as a decimal string.
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub is_staff: bool,
}

/// The authenticated account acting on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub account_id: i64,
    pub is_staff: bool,
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Principal, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            let detail = match e.kind() {
                ErrorKind::ExpiredSignature => "Token has expired.",
                ErrorKind::InvalidSignature => "Token signature is invalid.",
                _ => "Given token not valid.",
            };
            ApiError::Unauthorized(detail.to_string())
        })?;

        let account_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthorized("Token contained no recognizable account.".into()))?;

        Ok(Principal {
            account_id,
            is_staff: data.claims.is_staff,
        })
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Authentication credentials were not provided.".into()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid authorization header.".into()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::Unauthorized("Invalid authorization header.".into())),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        state.verifier.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, exp_offset: i64, is_staff: bool) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            is_staff,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_principal() {
        let verifier = TokenVerifier::new(SECRET);
        let principal = verifier.verify(&token("42", 3600, true)).unwrap();
        assert_eq!(
            principal,
            Principal {
                account_id: 42,
                is_staff: true
            }
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let err = verifier.verify(&token("42", -3600, false)).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(ref d) if d == "Token has expired."));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = TokenVerifier::new("another-secret");
        assert!(verifier.verify(&token("42", 3600, false)).is_err());
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        assert!(verifier.verify(&token("alice", 3600, false)).is_err());
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let request = axum::http::Request::builder()
            .header(AUTHORIZATION, "bearer abc.def.ghi")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(bearer_token(&parts).unwrap(), "abc.def.ghi");

        let request = axum::http::Request::builder()
            .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert!(bearer_token(&parts).is_err());
    }
}
