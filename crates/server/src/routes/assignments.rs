use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::{
        self,
        models::{Assignment, ClassRole, Submission, SubmissionStatus, SubmissionWithStudent},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::MessageResponse,
    services::classroom::{self, SubmissionInput},
    AppState,
};

const DEFAULT_POINTS: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/class/:id/assignments",
            get(list_assignments).post(create_assignment),
        )
        .route(
            "/assignments/:assignment_id",
            get(get_assignment).delete(delete_assignment),
        )
        .route("/assignments/:assignment_id/submit", post(submit))
        .route("/assignments/:assignment_id/submissions", get(list_submissions))
        .route("/submissions/:id/grade", put(grade_submission))
}

#[derive(Debug, Serialize)]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub my_submission: Option<Submission>,
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub grade: i64,
    pub status: Option<SubmissionStatus>,
}

/// Text fields plus at most one file from a multipart form.
#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<(String, Bytes)>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?;

                // Browsers send an empty part when no file was chosen
                if let Some(file_name) = file_name.filter(|n| !n.is_empty()) {
                    if form.file.is_some() {
                        return Err(AppError::BadRequest(
                            "Only one file can be uploaded at a time".to_string(),
                        ));
                    }
                    form.file = Some((file_name, data));
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read field {name}: {e}")))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn integer(&self, key: &str) -> Result<Option<i64>> {
        self.text(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| AppError::Validation(format!("{key} must be a whole number")))
            })
            .transpose()
    }
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (UTC) or a bare date (end of
/// that day, UTC) and returns an RFC 3339 UTC string.
pub fn parse_due_date(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let normalize = |dt: DateTime<Utc>| dt.to_rfc3339_opts(SecondsFormat::Secs, true);

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(normalize(dt.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(normalize(naive.and_utc()));
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
    {
        return Ok(normalize(naive.and_utc()));
    }

    Err(AppError::Validation(
        "Due date must be a date like 2025-05-01 or 2025-05-01T17:00".to_string(),
    ))
}

async fn load_assignment(pool: &sqlx::SqlitePool, assignment_id: i64) -> Result<Assignment> {
    sqlx::query_as::<_, Assignment>(
        r#"
        SELECT id, class_id, title, description, due_date, points, file_path, created_at
        FROM assignments WHERE id = ?
        "#,
    )
    .bind(assignment_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))
}

async fn create_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(class_id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Assignment>> {
    classroom::require_teacher(&state.db.pool, class_id, user.id).await?;

    let form = UploadForm::read(multipart).await?;

    let title = form
        .text("title")
        .ok_or_else(|| AppError::Validation("Title is required".to_string()))?
        .to_string();
    let description = form.text("description").unwrap_or_default().to_string();
    let due_date = parse_due_date(
        form.text("due_date")
            .ok_or_else(|| AppError::Validation("Due date is required".to_string()))?,
    )?;
    let points = form.integer("points")?.unwrap_or(DEFAULT_POINTS);
    if points < 0 {
        return Err(AppError::Validation("Points cannot be negative".to_string()));
    }

    // The file is written before the row; a failed insert removes it again
    let file_path = match &form.file {
        Some((name, data)) => Some(state.uploads.save(name, data).await?),
        None => None,
    };

    let inserted = sqlx::query_as::<_, Assignment>(
        r#"
        INSERT INTO assignments (class_id, title, description, due_date, points, file_path, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id, class_id, title, description, due_date, points, file_path, created_at
        "#,
    )
    .bind(class_id)
    .bind(&title)
    .bind(&description)
    .bind(&due_date)
    .bind(points)
    .bind(&file_path)
    .bind(db::now())
    .fetch_one(&state.db.pool)
    .await;

    let assignment = match inserted {
        Ok(assignment) => assignment,
        Err(e) => {
            if let Some(path) = &file_path {
                state.uploads.remove(path).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!(assignment_id = assignment.id, class_id, "assignment created");

    Ok(Json(assignment))
}

async fn list_assignments(
    State(state): State<AppState>,
    user: AuthUser,
    Path(class_id): Path<i64>,
) -> Result<Json<Vec<Assignment>>> {
    classroom::class_role(&state.db.pool, class_id, user.id).await?;

    let assignments = sqlx::query_as::<_, Assignment>(
        r#"
        SELECT id, class_id, title, description, due_date, points, file_path, created_at
        FROM assignments
        WHERE class_id = ?
        ORDER BY due_date ASC, id ASC
        "#,
    )
    .bind(class_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(assignments))
}

async fn get_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(assignment_id): Path<i64>,
) -> Result<Json<AssignmentDetail>> {
    let assignment = load_assignment(&state.db.pool, assignment_id).await?;
    let role = classroom::class_role(&state.db.pool, assignment.class_id, user.id).await?;

    let my_submission = match role {
        ClassRole::Student => {
            sqlx::query_as::<_, Submission>(
                r#"
                SELECT id, assignment_id, student_id, content, file_path, status, grade, submitted_at
                FROM submissions
                WHERE assignment_id = ? AND student_id = ?
                "#,
            )
            .bind(assignment_id)
            .bind(user.id)
            .fetch_optional(&state.db.pool)
            .await?
        }
        ClassRole::Teacher => None,
    };

    Ok(Json(AssignmentDetail {
        assignment,
        my_submission,
    }))
}

async fn delete_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(assignment_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let assignment = load_assignment(&state.db.pool, assignment_id).await?;
    classroom::require_teacher(&state.db.pool, assignment.class_id, user.id).await?;

    let mut files = sqlx::query_scalar::<_, String>(
        "SELECT file_path FROM submissions WHERE assignment_id = ? AND file_path IS NOT NULL",
    )
    .bind(assignment_id)
    .fetch_all(&state.db.pool)
    .await?;
    files.extend(assignment.file_path);

    sqlx::query("DELETE FROM assignments WHERE id = ?")
        .bind(assignment_id)
        .execute(&state.db.pool)
        .await?;

    state.uploads.remove_all(&files).await;

    Ok(Json(MessageResponse::new("Assignment deleted")))
}

async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(assignment_id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Submission>> {
    let assignment = load_assignment(&state.db.pool, assignment_id).await?;
    if classroom::class_role(&state.db.pool, assignment.class_id, user.id).await?
        == ClassRole::Teacher
    {
        return Err(AppError::Forbidden(
            "Teachers cannot submit to their own assignments".to_string(),
        ));
    }

    let form = UploadForm::read(multipart).await?;
    user.ensure_acting_as(form.integer("student_id")?)?;
    user.ensure_acting_as(form.integer("user_id")?)?;

    let content = form.text("content").map(str::to_string);
    if content.is_none() && form.file.is_none() {
        return Err(AppError::Validation(
            "A submission needs a file or some text".to_string(),
        ));
    }

    let file_path = match &form.file {
        Some((name, data)) => Some(state.uploads.save(name, data).await?),
        None => None,
    };

    let result = classroom::upsert_submission(
        &state.db.pool,
        &state.uploads,
        assignment_id,
        user.id,
        SubmissionInput {
            content,
            file_path: file_path.clone(),
        },
    )
    .await;

    match result {
        Ok(submission) => Ok(Json(submission)),
        Err(e) => {
            if let Some(path) = &file_path {
                state.uploads.remove(path).await;
            }
            Err(e)
        }
    }
}

async fn list_submissions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(assignment_id): Path<i64>,
) -> Result<Json<Vec<SubmissionWithStudent>>> {
    let assignment = load_assignment(&state.db.pool, assignment_id).await?;
    classroom::require_teacher(&state.db.pool, assignment.class_id, user.id).await?;

    let submissions = sqlx::query_as::<_, SubmissionWithStudent>(
        r#"
        SELECT s.id, s.assignment_id, s.student_id,
               u.name AS student_name, u.email AS student_email,
               s.content, s.file_path, s.status, s.grade, s.submitted_at
        FROM submissions s
        JOIN users u ON u.id = s.student_id
        WHERE s.assignment_id = ?
        ORDER BY u.name ASC, s.id ASC
        "#,
    )
    .bind(assignment_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(submissions))
}

async fn grade_submission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<GradeRequest>,
) -> Result<Json<Submission>> {
    let (class_id, points) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT a.class_id, a.points
        FROM submissions s
        JOIN assignments a ON a.id = s.assignment_id
        WHERE s.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    classroom::require_teacher(&state.db.pool, class_id, user.id).await?;

    if !(0..=points).contains(&body.grade) {
        return Err(AppError::Validation(format!(
            "Grade must be between 0 and {points}"
        )));
    }

    let status = body.status.unwrap_or(SubmissionStatus::Graded);
    let submission = sqlx::query_as::<_, Submission>(
        r#"
        UPDATE submissions SET grade = ?, status = ?
        WHERE id = ?
        RETURNING id, assignment_id, student_id, content, file_path, status, grade, submitted_at
        "#,
    )
    .bind(body.grade)
    .bind(status)
    .bind(id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(submission))
}
