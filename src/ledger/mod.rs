pub mod contracts;
pub mod gateway;
pub mod pipeline;
pub mod subscription;

pub use contracts::{ContractBinding, ContractProxy, parse_address, transfer_filter};
pub use gateway::ChainGateway;
pub use pipeline::TransactionPipeline;
pub use subscription::{EventSubscription, SubscriptionState};
