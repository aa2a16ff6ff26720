//! M-Pesa Daraja integration: wire types, HTTP plumbing and the STK gateway.

pub mod error;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;
