use rand::Rng;
use sqlx::SqlitePool;

use crate::error::{AppError, Result};

/// Upper-case alphanumerics without the easily confused 0/O and 1/I.
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 7;
const MAX_ATTEMPTS: usize = 16;

pub fn generate() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Normalizes a teacher-chosen code: 4 to 12 ASCII alphanumerics, upper-cased.
pub fn normalize(code: &str) -> Result<String> {
    let code = code.trim();
    if !(4..=12).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::Validation(
            "Class code must be 4-12 letters or digits".to_string(),
        ));
    }
    Ok(code.to_ascii_uppercase())
}

/// Generates codes until one is not taken by an existing class.
pub async fn allocate(pool: &SqlitePool) -> Result<String> {
    for _ in 0..MAX_ATTEMPTS {
        let code = generate();
        let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM classes WHERE code = ?")
            .bind(&code)
            .fetch_one(pool)
            .await?;
        if taken == 0 {
            return Ok(code);
        }
        tracing::debug!(%code, "class code collision, retrying");
    }

    Err(AppError::Internal(
        "Could not allocate a unique class code".to_string(),
    ))
}
