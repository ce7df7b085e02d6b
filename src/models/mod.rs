pub mod authorization;
pub mod facilitator;
pub mod payment;
pub mod response;

pub use authorization::*;
pub use facilitator::*;
pub use payment::*;
pub use response::*;
