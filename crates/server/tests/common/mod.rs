#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use klassly_server::{app, config::Config, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "klassly-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config {
            port: 0,
            database_url: format!(
                "sqlite:{}?mode=rwc",
                dir.path().join("klassly.db").display()
            ),
            database_max_connections: 5,
            upload_dir: dir.path().join("uploads").display().to_string(),
            static_dir: dir.path().join("static").display().to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_days: 1,
            max_upload_bytes: 1024 * 1024,
        };

        let state = AppState::init(config).await.expect("init app state");
        let router = app(state.clone());

        Self { router, state, dir }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.json(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn multipart(
        &self,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> (StatusCode, Value) {
        let mut body: Vec<u8> = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("build multipart request");

        self.send(request).await
    }

    /// Registers a user and returns `(user_id, token)`.
    pub async fn register(&self, name: &str, email: &str, role: &str) -> (i64, String) {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/register",
                None,
                Some(json!({
                    "name": name,
                    "email": email,
                    "password": "correct-horse",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");

        (
            body["user_id"].as_i64().expect("user_id"),
            body["token"].as_str().expect("token").to_string(),
        )
    }

    /// Creates a class and returns its id.
    pub async fn create_class(&self, token: &str, name: &str, code: Option<&str>) -> i64 {
        let (status, body) = self
            .post(
                "/api/create-classes",
                token,
                json!({ "name": name, "subject": "General", "class_code": code }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create class failed: {body}");
        body["class_id"].as_i64().expect("class_id")
    }

    pub async fn join(&self, token: &str, code: &str) -> (StatusCode, Value) {
        self.post("/api/join-class", token, json!({ "class_code": code }))
            .await
    }

    pub async fn create_assignment(&self, token: &str, class_id: i64, title: &str) -> i64 {
        let (status, body) = self
            .multipart(
                &format!("/api/class/{class_id}/assignments"),
                token,
                &[
                    ("title", title),
                    ("description", "Read chapter 3"),
                    ("due_date", "2030-01-15"),
                ],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create assignment failed: {body}");
        body["id"].as_i64().expect("assignment id")
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.state.db.pool)
            .await
            .expect("count query")
    }

    pub async fn execute(&self, sql: &str) {
        sqlx::query(sql)
            .execute(&self.state.db.pool)
            .await
            .expect("execute statement");
    }

    /// Number of files currently in the upload directory.
    pub fn upload_count(&self) -> usize {
        std::fs::read_dir(self.state.uploads.base_path())
            .expect("read upload dir")
            .count()
    }
}
