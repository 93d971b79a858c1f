use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member's relation to one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassRole {
    Teacher,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
    Returned,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub theme: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Class {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub code: String,
    pub teacher_id: i64,
    pub teacher_name: Option<String>,
    pub color: String,
    pub created_at: String,
}

/// Dashboard row: a class plus the caller's role in it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClassSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub code: String,
    pub teacher_id: i64,
    pub teacher_name: Option<String>,
    pub color: String,
    pub role: Role,
    pub student_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClassMember {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub points: i64,
    pub file_path: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Submission {
    pub id: i64,
    pub assignment_id: i64,
    pub student_id: i64,
    pub content: Option<String>,
    pub file_path: Option<String>,
    pub status: SubmissionStatus,
    pub grade: Option<i64>,
    pub submitted_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubmissionWithStudent {
    pub id: i64,
    pub assignment_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub student_email: String,
    pub content: Option<String>,
    pub file_path: Option<String>,
    pub status: SubmissionStatus,
    pub grade: Option<i64>,
    pub submitted_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub class_id: i64,
    pub user_id: i64,
    pub author_name: String,
    pub content: String,
    pub created_at: String,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub author_name: String,
    pub content: String,
    pub parent_comment_id: Option<i64>,
    pub approved: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Todo {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub completed: bool,
    pub created_at: String,
}
