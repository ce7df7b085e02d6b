pub mod ethereum;
pub mod facilitator;
pub mod replay_guard;
pub mod settlement;
pub mod store;
pub mod verifier;

pub use ethereum::{ChainClient, EthereumService};
pub use facilitator::FacilitatorService;
pub use replay_guard::ReplayGuard;
pub use settlement::SettlementService;
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use verifier::{PaymentVerifier, VerificationError, VerifierConfig};
