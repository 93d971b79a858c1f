use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    db::models::Role,
    error::{AppError, Result},
    routes::auth::Claims,
    AppState,
};

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    /// Request bodies may still name the acting user (`student_id`,
    /// `teacher_id`, `user_id`); such a claim must match the token.
    pub fn ensure_acting_as(&self, claimed: Option<i64>) -> Result<()> {
        match claimed {
            Some(id) if id != self.id => Err(AppError::Forbidden(
                "Cannot act on behalf of another user".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::Unauthorized)?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let claims = token_data.claims;
    let user = AuthUser {
        id: claims.sub.parse().map_err(|_| AppError::Unauthorized)?,
        email: claims.email,
        name: claims.name,
        role: claims.role,
    };

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

// Extractor for getting the authenticated user from request extensions
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student() -> AuthUser {
        AuthUser {
            id: 7,
            email: "s@example.com".to_string(),
            name: "Sam".to_string(),
            role: Role::Student,
        }
    }

    #[test]
    fn acting_as_self_or_unspecified_is_allowed() {
        assert!(student().ensure_acting_as(None).is_ok());
        assert!(student().ensure_acting_as(Some(7)).is_ok());
    }

    #[test]
    fn acting_as_someone_else_is_forbidden() {
        assert!(matches!(
            student().ensure_acting_as(Some(8)),
            Err(AppError::Forbidden(_))
        ));
    }
}
