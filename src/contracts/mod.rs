pub mod fiat_token;
pub mod identity_registry;

pub use fiat_token::*;
pub use identity_registry::*;
