mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::{json, Value};

struct Classroom {
    app: TestApp,
    teacher: String,
    student: String,
    class_id: i64,
}

async fn classroom() -> Classroom {
    let app = TestApp::new().await;
    let (_, teacher) = app.register("Teacher", "t@example.com", "teacher").await;
    let class_id = app.create_class(&teacher, "History", Some("HIST101")).await;
    let (_, student) = app.register("Student", "s@example.com", "student").await;
    assert_eq!(app.join(&student, "HIST101").await.0, StatusCode::OK);

    Classroom {
        app,
        teacher,
        student,
        class_id,
    }
}

async fn create_post(c: &Classroom, token: &str, content: &str) -> i64 {
    let (status, body) = c
        .app
        .post(
            &format!("/api/class/{}/posts", c.class_id),
            token,
            json!({ "content": content }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["comments"], json!([]));
    body["id"].as_i64().unwrap()
}

async fn comment(c: &Classroom, token: &str, post_id: i64, body: Value) -> (StatusCode, Value) {
    c.app
        .post(&format!("/api/posts/{post_id}/comments"), token, body)
        .await
}

#[tokio::test]
async fn new_class_has_a_welcome_post_without_comments() {
    let c = classroom().await;

    let (status, feed) = c
        .app
        .get(&format!("/api/class/{}/posts", c.class_id), &c.student)
        .await;
    assert_eq!(status, StatusCode::OK);

    let posts = feed.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["author_name"], "Teacher");
    assert_eq!(posts[0]["comments"], json!([]));
}

#[tokio::test]
async fn feed_orders_posts_newest_first_and_comments_oldest_first() {
    let c = classroom().await;
    let first = create_post(&c, &c.teacher, "Quiz on Friday").await;
    let second = create_post(&c, &c.student, "Is the quiz open book?").await;

    let (s1, c1) = comment(&c, &c.teacher, second, json!({ "content": "No." })).await;
    assert_eq!(s1, StatusCode::OK);
    let (s2, c2) = comment(
        &c,
        &c.student,
        second,
        json!({ "content": "Thanks!", "parent_comment_id": c1["id"] }),
    )
    .await;
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(c2["parent_comment_id"], c1["id"]);

    let (_, feed) = c
        .app
        .get(&format!("/api/class/{}/posts", c.class_id), &c.teacher)
        .await;
    let posts = feed.as_array().unwrap();

    // two new posts plus the welcome post
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0]["id"].as_i64(), Some(second));
    assert_eq!(posts[1]["id"].as_i64(), Some(first));
    assert_eq!(posts[1]["comments"], json!([]));

    let comments = posts[0]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["content"], "No.");
    assert_eq!(comments[0]["author_name"], "Teacher");
    assert_eq!(comments[1]["content"], "Thanks!");
    assert_eq!(comments[1]["parent_comment_id"], c1["id"]);

    let (status, single) = c.app.get(&format!("/api/posts/{second}"), &c.student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single["comments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn reply_parent_must_belong_to_the_same_post() {
    let c = classroom().await;
    let a = create_post(&c, &c.teacher, "Post A").await;
    let b = create_post(&c, &c.teacher, "Post B").await;

    let (_, on_a) = comment(&c, &c.student, a, json!({ "content": "on A" })).await;
    let (status, _) = comment(
        &c,
        &c.student,
        b,
        json!({ "content": "reply", "parent_comment_id": on_a["id"] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app_comment_count(&c).await, 1);
}

async fn app_comment_count(c: &Classroom) -> i64 {
    c.app.count("SELECT COUNT(*) FROM comments").await
}

#[tokio::test]
async fn outsiders_cannot_read_or_write_the_feed() {
    let c = classroom().await;
    let post = create_post(&c, &c.teacher, "Members only").await;
    let (_, outsider) = c
        .app
        .register("Outsider", "o@example.com", "student")
        .await;

    let (status, _) = c
        .app
        .get(&format!("/api/class/{}/posts", c.class_id), &outsider)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = comment(&c, &outsider, post, json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_content_is_rejected() {
    let c = classroom().await;
    let (status, _) = c
        .app
        .post(
            &format!("/api/class/{}/posts", c.class_id),
            &c.student,
            json!({ "content": "   " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_author_or_teacher_deletes() {
    let c = classroom().await;
    let post = create_post(&c, &c.teacher, "Teacher post").await;
    let (_, student_comment) = comment(&c, &c.student, post, json!({ "content": "mine" })).await;
    let comment_id = student_comment["id"].as_i64().unwrap();

    let (status, _) = c
        .app
        .json(
            Method::DELETE,
            &format!("/api/posts/{post}"),
            Some(c.student.as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = c
        .app
        .json(
            Method::DELETE,
            &format!("/api/comments/{comment_id}"),
            Some(c.teacher.as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = c
        .app
        .json(
            Method::DELETE,
            &format!("/api/posts/{post}"),
            Some(c.teacher.as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = c.app.get(&format!("/api/posts/{post}"), &c.teacher).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
