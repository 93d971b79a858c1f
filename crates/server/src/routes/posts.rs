use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    db::{
        self,
        models::{ClassRole, Comment, Post},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::MessageResponse,
    services::{classroom, feed},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/class/:id/posts", get(list_posts).post(create_post))
        .route("/posts/:post_id", get(get_post).delete(delete_post))
        .route("/posts/:post_id/comments", post(create_comment))
        .route("/comments/:id", delete(delete_comment))
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: String,
    pub user_id: Option<i64>,
    pub parent_comment_id: Option<i64>,
}

async fn list_posts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(class_id): Path<i64>,
) -> Result<Json<Vec<Post>>> {
    classroom::class_role(&state.db.pool, class_id, user.id).await?;

    let posts = feed::class_feed(&state.db.pool, class_id).await?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(class_id): Path<i64>,
    Json(body): Json<CreatePostRequest>,
) -> Result<Json<Post>> {
    user.ensure_acting_as(body.user_id)?;
    classroom::class_role(&state.db.pool, class_id, user.id).await?;

    let content = body.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Post content is required".to_string()));
    }

    let now = db::now();
    let post_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO posts (class_id, user_id, content, created_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(class_id)
    .bind(user.id)
    .bind(content)
    .bind(&now)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(Post {
        id: post_id,
        class_id,
        user_id: user.id,
        author_name: user.name,
        content: content.to_string(),
        created_at: now,
        comments: Vec::new(),
    }))
}

// Returns (class_id, author_id) of a post
async fn post_owner(pool: &sqlx::SqlitePool, post_id: i64) -> Result<(i64, i64)> {
    sqlx::query_as::<_, (i64, i64)>("SELECT class_id, user_id FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
}

async fn get_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Post>> {
    let (class_id, _) = post_owner(&state.db.pool, post_id).await?;
    classroom::class_role(&state.db.pool, class_id, user.id).await?;

    let post = feed::single_post(&state.db.pool, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let (class_id, author_id) = post_owner(&state.db.pool, post_id).await?;
    let role = classroom::class_role(&state.db.pool, class_id, user.id).await?;

    // Only author or class teacher can delete
    if author_id != user.id && role != ClassRole::Teacher {
        return Err(AppError::Forbidden("Cannot delete this post".to_string()));
    }

    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(post_id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(MessageResponse::new("Post deleted")))
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<i64>,
    Json(body): Json<CreateCommentRequest>,
) -> Result<Json<Comment>> {
    user.ensure_acting_as(body.user_id)?;

    let (class_id, _) = post_owner(&state.db.pool, post_id).await?;
    classroom::class_role(&state.db.pool, class_id, user.id).await?;

    let content = body.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation(
            "Comment content is required".to_string(),
        ));
    }

    if let Some(parent_id) = body.parent_comment_id {
        let same_post = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE id = ? AND post_id = ?",
        )
        .bind(parent_id)
        .bind(post_id)
        .fetch_one(&state.db.pool)
        .await?;

        if same_post == 0 {
            return Err(AppError::Validation(
                "Parent comment does not belong to this post".to_string(),
            ));
        }
    }

    let now = db::now();
    let comment_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO comments (post_id, user_id, content, parent_comment_id, approved, created_at)
        VALUES (?, ?, ?, ?, 1, ?)
        RETURNING id
        "#,
    )
    .bind(post_id)
    .bind(user.id)
    .bind(content)
    .bind(body.parent_comment_id)
    .bind(&now)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(Comment {
        id: comment_id,
        post_id,
        user_id: user.id,
        author_name: user.name,
        content: content.to_string(),
        parent_comment_id: body.parent_comment_id,
        approved: true,
        created_at: now,
    }))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let (class_id, author_id) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT p.class_id, c.user_id
        FROM comments c
        JOIN posts p ON p.id = c.post_id
        WHERE c.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    let role = classroom::class_role(&state.db.pool, class_id, user.id).await?;

    if author_id != user.id && role != ClassRole::Teacher {
        return Err(AppError::Forbidden(
            "Cannot delete this comment".to_string(),
        ));
    }

    // Replies cascade with their parent
    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(MessageResponse::new("Comment deleted")))
}
