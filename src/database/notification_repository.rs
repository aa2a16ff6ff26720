use crate::database::error::DatabaseError;
use crate::services::notification::NewNotification;
use sqlx::{Postgres, Transaction};

/// Writes user-facing rows to `notifications`.
pub struct NotificationRepository;

impl NotificationRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        notification: &NewNotification,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO notifications (user_id, title, message, type)
             VALUES ($1::uuid, $2, $3, $4)",
        )
        .bind(&notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.notification_type.as_str())
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}

impl Default for NotificationRepository {
    fn default() -> Self {
        Self::new()
    }
}
