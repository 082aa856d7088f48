//! # Bearer Identity
//!
//! Resolves the caller once at the boundary into an [`ActingUser`] that is
//! passed by value into every engine call.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}
//! ```
//!
//! `role` is `member` or `admin`; `user_id` is a UUID. When no
//! `AUTH_TOKEN` is configured the secret is not checked (development
//! mode), but the role and user id are still required because every
//! operation acts on behalf of someone.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gigflow_core::{ActingUser, Role, UserId};
use subtle::ConstantTimeEq;

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// The authenticated caller, extracted in handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub ActingUser);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Auth configuration injected into request extensions.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse `{role}:{user_id}:{secret}`. With `expected_secret` of `None` the
/// secret segment may be anything, including absent.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: Option<&str>,
) -> Result<ActingUser, String> {
    let mut parts = provided.splitn(3, ':');
    let (Some(role), Some(user)) = (parts.next(), parts.next()) else {
        return Err("invalid token format, expected {role}:{user_id}:{secret}".into());
    };
    let secret = parts.next();

    if let Some(expected) = expected_secret {
        match secret {
            Some(secret) if constant_time_token_eq(secret, expected) => {}
            _ => return Err("invalid bearer token".into()),
        }
    }

    let role: Role = role.parse().map_err(|e| format!("{e}"))?;
    let id: UserId = user
        .parse()
        .map_err(|_| format!("invalid user_id: {user}"))?;
    Ok(ActingUser { id, role })
}

/// Resolve the bearer token into a [`Caller`] extension.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match header_value {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token.trim().to_string(),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match parse_bearer_token(&provided, expected.as_deref()) {
        Ok(user) => {
            request.extensions_mut().insert(Caller(user));
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const USER: &str = "7d4f2c1e-5b3a-4e8d-9f60-1a2b3c4d5e6f";

    fn test_app(token: Option<&str>) -> Router {
        let auth_config = AuthConfig {
            token: token.map(String::from),
        };
        Router::new()
            .route(
                "/whoami",
                get(|Caller(user): Caller| async move { format!("{}:{}", user.role.as_str(), user.id) }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn parses_role_and_user() {
        let user = parse_bearer_token(&format!("admin:{USER}:s3cret"), Some("s3cret")).unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.id.as_uuid().to_string(), USER);
    }

    #[test]
    fn rejects_bad_tokens() {
        assert!(parse_bearer_token(&format!("member:{USER}:wrong"), Some("s3cret")).is_err());
        assert!(parse_bearer_token(&format!("member:{USER}"), Some("s3cret")).is_err());
        assert!(parse_bearer_token(&format!("owner:{USER}:s3cret"), Some("s3cret")).is_err());
        assert!(parse_bearer_token("member:not-a-uuid:s3cret", Some("s3cret")).is_err());
        assert!(parse_bearer_token("s3cret", Some("s3cret")).is_err());
    }

    #[test]
    fn secret_is_optional_when_auth_disabled() {
        let user = parse_bearer_token(&format!("member:{USER}"), None).unwrap();
        assert_eq!(user.role, Role::Member);
    }

    #[tokio::test]
    async fn valid_token_reaches_handler() {
        let (status, body) = call(test_app(Some("s3cret")), Some(&format!("Bearer member:{USER}:s3cret"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("member:"));
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (status, body) = call(test_app(Some("s3cret")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_unauthorized() {
        let (status, body) = call(test_app(None), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized() {
        let (status, _) = call(test_app(Some("s3cret")), Some(&format!("Bearer admin:{USER}:guess"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
