pub mod assignments;
pub mod auth;
pub mod classes;
pub mod posts;
pub mod todos;
pub mod users;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
