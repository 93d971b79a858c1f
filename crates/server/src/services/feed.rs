//! Class feed: posts with their comments.
//!
//! The feed is read with a single LEFT JOIN so posts without comments still
//! produce one row (with all comment columns NULL). Rows arrive ordered by
//! post (newest first) and then by comment (oldest first); [`assemble`]
//! folds consecutive rows of the same post into one [`Post`].

use sqlx::SqlitePool;

use crate::{
    db::models::{Comment, Post},
    error::Result,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedRow {
    pub post_id: i64,
    pub class_id: i64,
    pub post_user_id: i64,
    pub post_author: String,
    pub post_content: String,
    pub post_created_at: String,
    pub comment_id: Option<i64>,
    pub comment_user_id: Option<i64>,
    pub comment_author: Option<String>,
    pub comment_content: Option<String>,
    pub parent_comment_id: Option<i64>,
    pub approved: Option<bool>,
    pub comment_created_at: Option<String>,
}

const FEED_QUERY: &str = r#"
    SELECT p.id AS post_id, p.class_id, p.user_id AS post_user_id,
           pu.name AS post_author, p.content AS post_content,
           p.created_at AS post_created_at,
           c.id AS comment_id, c.user_id AS comment_user_id,
           cu.name AS comment_author, c.content AS comment_content,
           c.parent_comment_id, c.approved,
           c.created_at AS comment_created_at
    FROM posts p
    JOIN users pu ON pu.id = p.user_id
    LEFT JOIN comments c ON c.post_id = p.id
    LEFT JOIN users cu ON cu.id = c.user_id
    "#;

pub async fn class_feed(pool: &SqlitePool, class_id: i64) -> Result<Vec<Post>> {
    let rows = sqlx::query_as::<_, FeedRow>(&format!(
        "{FEED_QUERY} WHERE p.class_id = ? \
         ORDER BY p.created_at DESC, p.id DESC, c.created_at ASC, c.id ASC"
    ))
    .bind(class_id)
    .fetch_all(pool)
    .await?;

    Ok(assemble(rows))
}

pub async fn single_post(pool: &SqlitePool, post_id: i64) -> Result<Option<Post>> {
    let rows = sqlx::query_as::<_, FeedRow>(&format!(
        "{FEED_QUERY} WHERE p.id = ? ORDER BY c.created_at ASC, c.id ASC"
    ))
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(assemble(rows).into_iter().next())
}

/// Folds flat feed rows into posts. Input order is preserved for both posts
/// and comments.
pub fn assemble(rows: Vec<FeedRow>) -> Vec<Post> {
    let mut posts: Vec<Post> = Vec::new();

    for row in rows {
        let comment = comment_from_row(&row);

        match posts.last_mut() {
            Some(post) if post.id == row.post_id => {
                post.comments.extend(comment);
            }
            _ => posts.push(Post {
                id: row.post_id,
                class_id: row.class_id,
                user_id: row.post_user_id,
                author_name: row.post_author,
                content: row.post_content,
                created_at: row.post_created_at,
                comments: comment.into_iter().collect(),
            }),
        }
    }

    posts
}

fn comment_from_row(row: &FeedRow) -> Option<Comment> {
    let id = row.comment_id?;
    Some(Comment {
        id,
        post_id: row.post_id,
        user_id: row.comment_user_id.unwrap_or_default(),
        author_name: row.comment_author.clone().unwrap_or_default(),
        content: row.comment_content.clone().unwrap_or_default(),
        parent_comment_id: row.parent_comment_id,
        approved: row.approved.unwrap_or(true),
        created_at: row.comment_created_at.clone().unwrap_or_default(),
    })
}
