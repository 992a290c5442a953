//! Identity and listing directory lookups
//!
//! Both directories are external collaborators: users are owned by the
//! identity service, listings by the listing service. This module only
//! reads what conversation creation and notifications need.

use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub struct DirectoryService;

impl DirectoryService {
    pub async fn user_exists(db: &Pool, user_id: Uuid) -> AppResult<bool> {
        let client = db.get().await?;
        let row = client
            .query_opt("SELECT 1 FROM users WHERE id = $1", &[&user_id])
            .await?;
        Ok(row.is_some())
    }

    pub async fn display_name(db: &Pool, user_id: Uuid) -> AppResult<String> {
        let client = db.get().await?;
        let row = client
            .query_opt("SELECT display_name FROM users WHERE id = $1", &[&user_id])
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(row.get("display_name"))
    }

    pub async fn listing_exists(db: &Pool, listing_id: Uuid) -> AppResult<bool> {
        let client = db.get().await?;
        let row = client
            .query_opt(
                "SELECT 1 FROM listings WHERE id = $1 AND is_active",
                &[&listing_id],
            )
            .await?;
        Ok(row.is_some())
    }
}
