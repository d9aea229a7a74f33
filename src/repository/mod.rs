pub mod balance_repository;
pub mod database;
pub mod models;
pub mod token_repository;
pub mod transfer_repository;

pub use balance_repository::BalanceRepository;
pub use database::Database;
pub use models::{HolderBalance, Token, TokenHolder, TokenInfo, TokenTransfer};
pub use token_repository::TokenRepository;
pub use transfer_repository::TransferRepository;
