use crate::database::payment_request_repository::PaymentRequest;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Success,
    Error,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Success => "success",
            NotificationType::Error => "error",
        }
    }
}

/// A row destined for the member's in-app notification feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
}

/// Builds the notifications the callback paths write.
#[derive(Debug, Clone, Copy)]
pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        Self
    }

    pub fn payment_completed(
        &self,
        request: &PaymentRequest,
        amount: &BigDecimal,
        receipt: &str,
    ) -> NewNotification {
        info!(
            payment_request_id = %request.id,
            user_id = %request.user_id,
            receipt = %receipt,
            "🔔 NOTIFICATION: payment completed"
        );
        NewNotification {
            user_id: request.user_id.clone(),
            title: "Payment Successful".to_string(),
            message: format!(
                "Your {} payment of KES {} was received. M-Pesa receipt: {}",
                describe(&request.payment_type),
                amount,
                receipt
            ),
            notification_type: NotificationType::Success,
        }
    }

    pub fn payment_failed(&self, request: &PaymentRequest, result_desc: &str) -> NewNotification {
        warn!(
            payment_request_id = %request.id,
            user_id = %request.user_id,
            reason = %result_desc,
            "🔔 NOTIFICATION: payment failed"
        );
        let message = if result_desc.trim().is_empty() {
            "Your M-Pesa payment could not be completed.".to_string()
        } else {
            result_desc.to_string()
        };
        NewNotification {
            user_id: request.user_id.clone(),
            title: "Payment Failed".to_string(),
            message,
            notification_type: NotificationType::Error,
        }
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(payment_type: &str) -> String {
    let trimmed = payment_type.trim();
    if trimmed.is_empty() {
        "club".to_string()
    } else {
        trimmed.replace('_', " ")
    }
}
