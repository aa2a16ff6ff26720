//! Tracing setup and log-safe formatting helpers

use crate::config::{parse_log_format, LogFormat};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FORMAT=json` switches to
/// one JSON object per line for log shippers.
pub fn init_tracing() {
    let default_level = std::env::var("LOG_LEVEL")
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", default_level)));
    let format = parse_log_format(&std::env::var("LOG_FORMAT").unwrap_or_default());

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Plain => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init(),
    };

    // A second call (tests) leaves the first subscriber in place.
    if result.is_ok() {
        tracing::info!(format = ?format, "Logging initialized");
    }
}

/// Masks the middle of a phone number: `254712345678` becomes `2547****5678`.
pub fn mask_phone_number(phone: &str) -> String {
    let chars: Vec<char> = phone.trim().chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_kenyan_msisdn() {
        assert_eq!(mask_phone_number("254712345678"), "2547****5678");
    }

    #[test]
    fn short_values_are_fully_masked() {
        assert_eq!(mask_phone_number("0712"), "****");
        assert_eq!(mask_phone_number(""), "");
    }
}
