//! Class membership, dashboard aggregation, enrollment by code and the
//! submission upsert.

use sqlx::SqlitePool;

use crate::{
    db::{
        self,
        models::{Class, ClassRole, ClassSummary, Submission},
    },
    error::{conflict_on_unique, AppError, Result},
    services::uploads::UploadStore,
};

const CLASS_SELECT: &str = r#"
    SELECT c.id, c.name, c.description, c.code, c.teacher_id,
           u.name AS teacher_name, c.color, c.created_at
    FROM classes c
    LEFT JOIN users u ON u.id = c.teacher_id
    "#;

const WELCOME_POST: &str = "Welcome to the class! Announcements and discussion will appear here.";

/// Resolves how `user_id` relates to a class. Non-members get `NotFound`,
/// the same answer as for a class that does not exist.
pub async fn class_role(pool: &SqlitePool, class_id: i64, user_id: i64) -> Result<ClassRole> {
    let row = sqlx::query_as::<_, (i64, bool)>(
        r#"
        SELECT c.teacher_id,
               EXISTS (SELECT 1 FROM class_students cs
                       WHERE cs.class_id = c.id AND cs.student_id = ?)
        FROM classes c
        WHERE c.id = ?
        "#,
    )
    .bind(user_id)
    .bind(class_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((teacher_id, _)) if teacher_id == user_id => Ok(ClassRole::Teacher),
        Some((_, true)) => Ok(ClassRole::Student),
        _ => Err(AppError::NotFound("Class not found".to_string())),
    }
}

pub async fn require_teacher(pool: &SqlitePool, class_id: i64, user_id: i64) -> Result<()> {
    match class_role(pool, class_id, user_id).await? {
        ClassRole::Teacher => Ok(()),
        ClassRole::Student => Err(AppError::Forbidden(
            "Only the class teacher can do this".to_string(),
        )),
    }
}

pub async fn find_class(pool: &SqlitePool, class_id: i64) -> Result<Class> {
    sqlx::query_as::<_, Class>(&format!("{CLASS_SELECT} WHERE c.id = ?"))
        .bind(class_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Class not found".to_string()))
}

/// Every class the user teaches or is enrolled in, each exactly once.
pub async fn dashboard(pool: &SqlitePool, user_id: i64) -> Result<Vec<ClassSummary>> {
    let classes = sqlx::query_as::<_, ClassSummary>(
        r#"
        SELECT c.id, c.name, c.description, c.code, c.teacher_id,
               u.name AS teacher_name, c.color,
               CASE WHEN c.teacher_id = ? THEN 'teacher' ELSE 'student' END AS role,
               (SELECT COUNT(*) FROM class_students s WHERE s.class_id = c.id) AS student_count,
               c.created_at
        FROM classes c
        LEFT JOIN users u ON u.id = c.teacher_id
        WHERE c.teacher_id = ?
           OR EXISTS (SELECT 1 FROM class_students cs
                      WHERE cs.class_id = c.id AND cs.student_id = ?)
        ORDER BY c.created_at DESC, c.id DESC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(classes)
}

pub struct NewClass<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub code: &'a str,
    pub color: &'a str,
}

/// Inserts the class and its welcome post in one transaction.
pub async fn create_class(pool: &SqlitePool, teacher_id: i64, new: NewClass<'_>) -> Result<i64> {
    let now = db::now();
    let mut tx = pool.begin().await?;

    let class_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO classes (name, description, code, teacher_id, color, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(new.name)
    .bind(new.description)
    .bind(new.code)
    .bind(teacher_id)
    .bind(new.color)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await
    .map_err(conflict_on_unique("Class code already in use"))?;

    sqlx::query("INSERT INTO posts (class_id, user_id, content, created_at) VALUES (?, ?, ?, ?)")
        .bind(class_id)
        .bind(teacher_id)
        .bind(WELCOME_POST)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(class_id)
}

/// Enrolls `student_id` in the class whose code matches `code`
/// case-insensitively.
pub async fn join_by_code(pool: &SqlitePool, code: &str, student_id: i64) -> Result<Class> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::Validation("Class code is required".to_string()));
    }

    let class = sqlx::query_as::<_, Class>(&format!("{CLASS_SELECT} WHERE c.code = ?"))
        .bind(code)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("No class found with that code".to_string()))?;

    if class.teacher_id == student_id {
        return Err(AppError::Validation(
            "You already teach this class".to_string(),
        ));
    }

    sqlx::query("INSERT INTO class_students (class_id, student_id, joined_at) VALUES (?, ?, ?)")
        .bind(class.id)
        .bind(student_id)
        .bind(db::now())
        .execute(pool)
        .await
        .map_err(conflict_on_unique("You have already joined this class"))?;

    tracing::info!(class_id = class.id, student_id, "student joined class");

    Ok(class)
}

/// Public paths of every file attached to the class or its submissions.
pub async fn class_upload_paths(pool: &SqlitePool, class_id: i64) -> Result<Vec<String>> {
    let paths = sqlx::query_scalar::<_, String>(
        r#"
        SELECT a.file_path FROM assignments a
        WHERE a.class_id = ? AND a.file_path IS NOT NULL
        UNION ALL
        SELECT s.file_path FROM submissions s
        JOIN assignments a ON a.id = s.assignment_id
        WHERE a.class_id = ? AND s.file_path IS NOT NULL
        "#,
    )
    .bind(class_id)
    .bind(class_id)
    .fetch_all(pool)
    .await?;

    Ok(paths)
}

pub struct SubmissionInput {
    pub content: Option<String>,
    pub file_path: Option<String>,
}

/// One row per (assignment, student). A resubmission overwrites the row in
/// place, resets status and grade, and keeps the previous file and text
/// unless new ones were sent. A replaced file is deleted once the row is
/// committed.
pub async fn upsert_submission(
    pool: &SqlitePool,
    uploads: &UploadStore,
    assignment_id: i64,
    student_id: i64,
    input: SubmissionInput,
) -> Result<Submission> {
    let mut tx = pool.begin().await?;

    // Write first so the transaction holds the write lock from the start.
    // A read-then-write upgrade fails with SQLITE_BUSY under contention.
    let previous_file = sqlx::query_scalar::<_, Option<String>>(
        r#"
        UPDATE submissions SET submitted_at = submitted_at
        WHERE assignment_id = ? AND student_id = ?
        RETURNING file_path
        "#,
    )
    .bind(assignment_id)
    .bind(student_id)
    .fetch_optional(&mut *tx)
    .await?
    .flatten();

    let submission = sqlx::query_as::<_, Submission>(
        r#"
        INSERT INTO submissions
            (assignment_id, student_id, content, file_path, status, grade, submitted_at)
        VALUES (?, ?, ?, ?, 'submitted', NULL, ?)
        ON CONFLICT (assignment_id, student_id) DO UPDATE SET
            content = COALESCE(excluded.content, submissions.content),
            file_path = COALESCE(excluded.file_path, submissions.file_path),
            status = 'submitted',
            grade = NULL,
            submitted_at = excluded.submitted_at
        RETURNING id, assignment_id, student_id, content, file_path, status, grade, submitted_at
        "#,
    )
    .bind(assignment_id)
    .bind(student_id)
    .bind(&input.content)
    .bind(&input.file_path)
    .bind(db::now())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    if let (Some(old), Some(new)) = (previous_file, input.file_path.as_deref()) {
        if old != new {
            uploads.remove(&old).await;
        }
    }

    tracing::info!(
        submission_id = submission.id,
        assignment_id,
        student_id,
        "submission stored"
    );

    Ok(submission)
}
