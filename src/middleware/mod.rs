pub mod paywall;

pub use paywall::{paywall_layer, Paywall, PAYER_HEADER, PAYMENT_HEADER};
