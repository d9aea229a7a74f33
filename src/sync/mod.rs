pub mod engine;
pub mod scheduler;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{DEFAULT_WINDOW_BLOCKS, SkipReason, SyncOutcome, TokenSyncEngine};
pub use scheduler::{PassReport, SyncScheduler};
pub use source::TransferSource;
