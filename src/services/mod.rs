//! Services module for payment business logic

pub mod callback_processor;
pub mod notification;
pub mod payment_initiator;

pub use callback_processor::{CallbackError, CallbackOutcome, CallbackProcessor};
pub use payment_initiator::{InitiatePaymentRequest, InitiationOutcome, PaymentInitiator};
