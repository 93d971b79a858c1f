use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Class, ClassMember, ClassRole, ClassSummary, Role},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::MessageResponse,
    services::{class_code, classroom},
    AppState,
};

const DEFAULT_COLOR: &str = "#1a73e8";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/:user_id", get(dashboard))
        .route("/create-classes", post(create_class))
        .route("/join-class", post(join_class))
        .route(
            "/class/:id",
            get(get_class).put(update_class).delete(delete_class),
        )
        .route("/class/:id/students", get(list_students))
        .route("/class/:id/students/:student_id", delete(remove_student))
}

#[derive(Debug, Deserialize)]
pub struct CreateClassRequest {
    #[serde(default)]
    pub name: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub teacher_id: Option<i64>,
    pub class_code: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateClassResponse {
    pub message: String,
    pub class_id: i64,
    pub class_code: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinClassRequest {
    #[serde(default)]
    pub class_code: String,
    pub student_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JoinClassResponse {
    pub message: String,
    pub class: Class,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClassRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassDetail {
    #[serde(flatten)]
    pub class: Class,
    pub role: ClassRole,
}

fn validate_color(color: &str) -> Result<()> {
    let hex = color.strip_prefix('#').unwrap_or("");
    if !(hex.len() == 6 || hex.len() == 3) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Validation(
            "Color must be a hex value like #1a73e8".to_string(),
        ));
    }
    Ok(())
}

async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<ClassSummary>>> {
    user.ensure_acting_as(Some(user_id))?;

    let classes = classroom::dashboard(&state.db.pool, user.id).await?;
    Ok(Json(classes))
}

async fn create_class(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateClassRequest>,
) -> Result<Json<CreateClassResponse>> {
    user.ensure_acting_as(body.teacher_id)?;

    if user.role != Role::Teacher {
        return Err(AppError::Forbidden(
            "Only teachers can create classes".to_string(),
        ));
    }

    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Class name is required".to_string()));
    }

    let description = body
        .description
        .or(body.subject)
        .unwrap_or_default()
        .trim()
        .to_string();

    let color = body.color.unwrap_or_else(|| DEFAULT_COLOR.to_string());
    validate_color(&color)?;

    let code = match body.class_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(requested) => {
            let code = class_code::normalize(requested)?;
            let taken =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM classes WHERE code = ?")
                    .bind(&code)
                    .fetch_one(&state.db.pool)
                    .await?;
            if taken > 0 {
                return Err(AppError::Conflict("Class code already in use".to_string()));
            }
            code
        }
        None => class_code::allocate(&state.db.pool).await?,
    };

    let class_id = classroom::create_class(
        &state.db.pool,
        user.id,
        classroom::NewClass {
            name,
            description: &description,
            code: &code,
            color: &color,
        },
    )
    .await?;

    tracing::info!(class_id, teacher_id = user.id, %code, "class created");

    Ok(Json(CreateClassResponse {
        message: "Class created successfully".to_string(),
        class_id,
        class_code: code,
    }))
}

async fn join_class(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<JoinClassRequest>,
) -> Result<Json<JoinClassResponse>> {
    user.ensure_acting_as(body.student_id)?;

    let class = classroom::join_by_code(&state.db.pool, &body.class_code, user.id).await?;

    Ok(Json(JoinClassResponse {
        message: "Joined class successfully".to_string(),
        class,
    }))
}

async fn get_class(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ClassDetail>> {
    let role = classroom::class_role(&state.db.pool, id, user.id).await?;
    let class = classroom::find_class(&state.db.pool, id).await?;

    Ok(Json(ClassDetail { class, role }))
}

async fn update_class(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateClassRequest>,
) -> Result<Json<Class>> {
    classroom::require_teacher(&state.db.pool, id, user.id).await?;

    let name = body.name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(AppError::Validation("Class name is required".to_string()));
    }
    if let Some(color) = &body.color {
        validate_color(color)?;
    }

    sqlx::query(
        r#"
        UPDATE classes
        SET name = COALESCE(?, name),
            description = COALESCE(?, description),
            color = COALESCE(?, color)
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(body.description.as_deref().map(str::trim))
    .bind(&body.color)
    .bind(id)
    .execute(&state.db.pool)
    .await?;

    let class = classroom::find_class(&state.db.pool, id).await?;
    Ok(Json(class))
}

async fn delete_class(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    classroom::require_teacher(&state.db.pool, id, user.id).await?;

    let files = classroom::class_upload_paths(&state.db.pool, id).await?;

    // Enrollments, posts, assignments and submissions cascade
    sqlx::query("DELETE FROM classes WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    state.uploads.remove_all(&files).await;

    tracing::info!(class_id = id, removed_files = files.len(), "class deleted");

    Ok(Json(MessageResponse::new("Class deleted successfully")))
}

async fn list_students(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ClassMember>>> {
    classroom::class_role(&state.db.pool, id, user.id).await?;

    let students = sqlx::query_as::<_, ClassMember>(
        r#"
        SELECT u.id, u.name, u.email, u.avatar, cs.joined_at
        FROM class_students cs
        JOIN users u ON u.id = cs.student_id
        WHERE cs.class_id = ?
        ORDER BY u.name ASC, u.id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(students))
}

async fn remove_student(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, student_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>> {
    let role = classroom::class_role(&state.db.pool, id, user.id).await?;

    // Students may only remove themselves (leave)
    if role == ClassRole::Student && student_id != user.id {
        return Err(AppError::Forbidden(
            "Only the class teacher can remove students".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM class_students WHERE class_id = ? AND student_id = ?")
        .bind(id)
        .bind(student_id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Student is not enrolled in this class".to_string(),
        ));
    }

    Ok(Json(MessageResponse::new("Student removed from class")))
}
