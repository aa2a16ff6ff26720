use crate::database::error::DatabaseError;
use crate::payments::types::MpesaCredentials;
use sqlx::{FromRow, PgPool};

/// The active M-Pesa credential row, rotated out-of-band by an administrator.
#[derive(Clone, FromRow)]
pub struct ProviderConfig {
    pub id: String,
    pub short_code: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub passkey: String,
    pub callback_url: String,
    pub is_active: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProviderConfig {
    pub fn credentials(&self) -> MpesaCredentials {
        MpesaCredentials {
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("short_code", &self.short_code)
            .field("consumer_key", &"<redacted>")
            .field("consumer_secret", &"<redacted>")
            .field("passkey", &"<redacted>")
            .field("callback_url", &self.callback_url)
            .field("is_active", &self.is_active)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Read access to `mpesa_config`.
pub struct ProviderConfigRepository {
    pool: PgPool,
}

impl ProviderConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The single row flagged `is_active`; there is no fallback.
    pub async fn find_active(&self) -> Result<Option<ProviderConfig>, DatabaseError> {
        sqlx::query_as::<_, ProviderConfig>(
            "SELECT id::text AS id, short_code, consumer_key, consumer_secret, passkey,
                    callback_url, is_active, updated_at
             FROM mpesa_config
             WHERE is_active = true
             ORDER BY updated_at DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            id: "cfg_1".to_string(),
            short_code: "174379".to_string(),
            consumer_key: "ck_live".to_string(),
            consumer_secret: "cs_live".to_string(),
            passkey: "pk_live".to_string(),
            callback_url: "https://club.example/cb".to_string(),
            is_active: true,
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", config());
        assert!(rendered.contains("174379"));
        assert!(!rendered.contains("ck_live"));
        assert!(!rendered.contains("cs_live"));
        assert!(!rendered.contains("pk_live"));
    }

    #[test]
    fn credentials_copy_consumer_pair() {
        let credentials = config().credentials();
        assert_eq!(credentials.consumer_key, "ck_live");
        assert_eq!(credentials.consumer_secret, "cs_live");
    }
}
