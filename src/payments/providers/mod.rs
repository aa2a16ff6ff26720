pub mod mpesa;

pub use mpesa::{MpesaEnvironment, MpesaProvider, MpesaProviderConfig};
