use crate::error::IndexerError;
use crate::ledger::parse_address;
use crate::query::formatters::{OutputFormat, format_holders, format_token_info, format_tokens};
use crate::repository::{BalanceRepository, TokenRepository};
use alloy_primitives::Address;
use anyhow::Result;

pub const DEFAULT_TAKE: u64 = 100;

/// Rejects anything that is not a `0x`-prefixed 20-byte address before it
/// reaches the store.
pub fn validate_address(raw: &str) -> Result<Address, IndexerError> {
    parse_address(raw)
        .ok_or_else(|| IndexerError::Validation(format!("Invalid address format: {raw}")))
}

pub fn cmd_tokens(token_repo: &TokenRepository, format: &OutputFormat) -> Result<String> {
    let tokens = token_repo.get_all()?;
    Ok(format_tokens(&tokens, format))
}

pub fn cmd_token_info(
    token_repo: &TokenRepository,
    address: &str,
    format: &OutputFormat,
) -> Result<String> {
    let address = validate_address(address)?;
    let info = token_repo.get_info(&address)?;
    Ok(format_token_info(info.as_ref(), format))
}

pub struct HoldersQuery {
    pub address: String,
    pub skip: u64,
    pub take: u64,
}

pub fn cmd_holders(
    token_repo: &TokenRepository,
    balance_repo: &BalanceRepository,
    query: HoldersQuery,
    format: &OutputFormat,
) -> Result<String> {
    let address = validate_address(&query.address)?;

    let Some(token) = token_repo.get(&address)? else {
        return Ok(format_token_info(None, format));
    };
    let Some(standard) = token.standard() else {
        return Ok(format_holders(&[], query.skip, format));
    };

    let holders = balance_repo.get_holders(&address, standard, query.skip, query.take)?;
    Ok(format_holders(&holders, query.skip, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Token;
    use alloy_primitives::U256;
    use num_bigint::BigInt;
    use rusqlite::Connection;

    const NFT: &str = "0xa7060b2ac04c9b4d6bfc2d688953fc959ef07c6e";

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::repository::database::create_tables(&conn).unwrap();
        TokenRepository::new(&conn)
            .insert(&Token {
                address: validate_address(NFT).unwrap(),
                name: "ValidatorNodeFractionToken".to_string(),
                symbol: "VNFT".to_string(),
                token_type: "ERC721".to_string(),
                total_supply: "2".to_string(),
                total_holders: 1,
                synced_till_block: 0,
            })
            .unwrap();
        conn
    }

    #[test]
    fn malformed_addresses_are_validation_errors() {
        for raw in [
            "",
            "0x1234",
            "a7060b2ac04c9b4d6bfc2d688953fc959ef07c6e",
            "0xzz060b2ac04c9b4d6bfc2d688953fc959ef07c6e",
        ] {
            assert!(matches!(
                validate_address(raw),
                Err(IndexerError::Validation(_))
            ));
        }
        let checksummed = validate_address(NFT).unwrap().to_checksum(None);
        assert!(validate_address(&checksummed).is_ok());
        assert!(validate_address(&checksummed.to_uppercase().replacen("0X", "0x", 1)).is_ok());
    }

    #[test]
    fn invalid_address_never_reaches_the_store() {
        let conn = setup();
        let err = cmd_token_info(&TokenRepository::new(&conn), "nope", &OutputFormat::Json)
            .unwrap_err();
        assert!(matches!(
            IndexerError::find(&err),
            Some(IndexerError::Validation(_))
        ));
    }

    #[test]
    fn unknown_token_is_reported_as_not_found() {
        let conn = setup();
        let output = cmd_token_info(
            &TokenRepository::new(&conn),
            "0x0000000000000000000000000000000000000001",
            &OutputFormat::Table,
        )
        .unwrap();
        assert_eq!(output, "Token not found.");
    }

    #[test]
    fn holders_use_the_token_standard() {
        let conn = setup();
        let token = validate_address(NFT).unwrap();
        let owner = Address::repeat_byte(0x01);
        let balances = BalanceRepository::new(&conn);
        for id in [1u64, 2] {
            balances
                .transfer_ownership(&token, &U256::from(id), &Address::ZERO, &owner, 1)
                .unwrap();
        }
        // a stray fungible row for the same address must not show up
        balances
            .adjust_amount(&Address::repeat_byte(0x02), &token, &BigInt::from(5), 1)
            .unwrap();

        let output = cmd_holders(
            &TokenRepository::new(&conn),
            &balances,
            HoldersQuery {
                address: NFT.to_string(),
                skip: 0,
                take: DEFAULT_TAKE,
            },
            &OutputFormat::Csv,
        )
        .unwrap();

        assert_eq!(
            output,
            "rank,account,balance\n1,0x0101010101010101010101010101010101010101,2\n"
        );
    }
}
