pub mod facilitator;
pub mod health;
pub mod payment;
pub mod settle;
pub mod stats;

pub use facilitator::*;
pub use health::*;
pub use payment::*;
pub use settle::*;
pub use stats::*;

use crate::services::{
    ChainClient, FacilitatorService, KeyValueStore, PaymentVerifier, SettlementService,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub chain: Arc<dyn ChainClient>,
    pub facilitators: Arc<FacilitatorService>,
    pub verifier: Arc<PaymentVerifier>,
    pub settlement: Arc<SettlementService>,
    pub started_at: Instant,
}
