use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    db::models::User,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{
        auth::{hash_password, validate_password, verify_password},
        MessageResponse,
    },
    AppState,
};

const THEMES: [&str; 2] = ["light", "dark"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_profile).put(update_profile))
        .route("/users/me/password", put(change_password))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

async fn load_user(pool: &sqlx::SqlitePool, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, name, password_hash, role, avatar, theme, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

async fn get_profile(State(state): State<AppState>, user: AuthUser) -> Result<Json<User>> {
    Ok(Json(load_user(&state.db.pool, user.id).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    let name = body.name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(AppError::Validation("Name cannot be empty".to_string()));
    }
    if let Some(theme) = body.theme.as_deref() {
        if !THEMES.contains(&theme) {
            return Err(AppError::Validation(
                "Theme must be light or dark".to_string(),
            ));
        }
    }

    // Concurrent edits are last-writer-wins
    sqlx::query(
        r#"
        UPDATE users
        SET name = COALESCE(?, name),
            avatar = COALESCE(?, avatar),
            theme = COALESCE(?, theme)
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(&body.avatar)
    .bind(&body.theme)
    .bind(user.id)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(load_user(&state.db.pool, user.id).await?))
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    let current = load_user(&state.db.pool, user.id).await?;

    if !verify_password(&body.current_password, &current.password_hash)? {
        return Err(AppError::Validation(
            "Current password is incorrect".to_string(),
        ));
    }
    validate_password(&body.new_password)?;

    let password_hash = hash_password(&body.new_password)?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(user.id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(user_id = user.id, "password changed");

    Ok(Json(MessageResponse::new("Password updated")))
}
