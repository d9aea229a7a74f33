pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod ledger;
pub mod query;
pub mod repository;
pub mod retry;
pub mod rpc;
pub mod sync;

pub use error::IndexerError;
