use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    db::{self, models::Todo},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::MessageResponse,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/:id", patch(update_todo).delete(delete_todo))
}

#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTodoRequest {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

fn todo_not_found() -> AppError {
    AppError::NotFound("Todo not found".to_string())
}

async fn list_todos(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Todo>>> {
    let todos = sqlx::query_as::<_, Todo>(
        r#"
        SELECT id, user_id, title, completed, created_at
        FROM todos
        WHERE user_id = ?
        ORDER BY completed ASC, created_at DESC, id DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(todos))
}

async fn create_todo(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateTodoRequest>,
) -> Result<Json<Todo>> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let todo = sqlx::query_as::<_, Todo>(
        r#"
        INSERT INTO todos (user_id, title, completed, created_at)
        VALUES (?, ?, 0, ?)
        RETURNING id, user_id, title, completed, created_at
        "#,
    )
    .bind(user.id)
    .bind(title)
    .bind(db::now())
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(todo))
}

async fn update_todo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTodoRequest>,
) -> Result<Json<Todo>> {
    let title = body.title.as_deref().map(str::trim);
    if title.is_some_and(str::is_empty) {
        return Err(AppError::Validation("Title cannot be empty".to_string()));
    }

    let todo = sqlx::query_as::<_, Todo>(
        r#"
        UPDATE todos
        SET title = COALESCE(?, title),
            completed = COALESCE(?, completed)
        WHERE id = ? AND user_id = ?
        RETURNING id, user_id, title, completed, created_at
        "#,
    )
    .bind(title)
    .bind(body.completed)
    .bind(id)
    .bind(user.id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(todo_not_found)?;

    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let result = sqlx::query("DELETE FROM todos WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user.id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(todo_not_found());
    }

    Ok(Json(MessageResponse::new("Todo deleted")))
}
