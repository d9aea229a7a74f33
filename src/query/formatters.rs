use crate::repository::{Token, TokenHolder, TokenInfo};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

const TOKEN_COLUMNS: [&str; 7] = [
    "address",
    "name",
    "symbol",
    "type",
    "total_supply",
    "total_holders",
    "synced_till_block",
];

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn token_record(token: &Token) -> Vec<String> {
    vec![
        format!("{:?}", token.address),
        token.name.clone(),
        token.symbol.clone(),
        token.token_type.clone(),
        token.total_supply.clone(),
        token.total_holders.to_string(),
        token.synced_till_block.to_string(),
    ]
}

fn token_json(token: &Token) -> Value {
    json!({
        "address": format!("{:?}", token.address),
        "name": token.name,
        "symbol": token.symbol,
        "type": token.token_type,
        "totalSupply": token.total_supply,
        "totalHolders": token.total_holders,
        "syncedTillBlock": token.synced_till_block,
    })
}

fn csv_output(header: &[&str], records: impl IntoIterator<Item = Vec<String>>) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    let _ = wtr.write_record(header);
    for record in records {
        let _ = wtr.write_record(&record);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_tokens(tokens: &[Token], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if tokens.is_empty() {
                return "No tokens found.".to_string();
            }
            let mut table = new_table(vec![
                "Address",
                "Name",
                "Symbol",
                "Type",
                "Total Supply",
                "Holders",
                "Synced Till",
            ]);
            for token in tokens {
                table.add_row(token_record(token));
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_tokens: Vec<_> = tokens.iter().map(token_json).collect();
            serde_json::to_string_pretty(&json_tokens).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => csv_output(&TOKEN_COLUMNS, tokens.iter().map(token_record)),
    }
}

pub fn format_token_info(info: Option<&TokenInfo>, format: &OutputFormat) -> String {
    let Some(info) = info else {
        return match format {
            OutputFormat::Json => "null".to_string(),
            _ => "Token not found.".to_string(),
        };
    };

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            let labels = [
                "Address",
                "Name",
                "Symbol",
                "Type",
                "Total Supply",
                "Total Holders",
                "Synced Till Block",
            ];
            for (label, value) in labels.into_iter().zip(token_record(&info.token)) {
                table.add_row(vec![Cell::new(label), Cell::new(value)]);
            }
            table.add_row(vec![
                Cell::new("Total Transfers"),
                Cell::new(info.total_transfers),
            ]);
            table.to_string()
        }
        OutputFormat::Json => {
            let mut value = token_json(&info.token);
            value["totalTransfers"] = json!(info.total_transfers);
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut header = TOKEN_COLUMNS.to_vec();
            header.push("total_transfers");
            let mut record = token_record(&info.token);
            record.push(info.total_transfers.to_string());
            csv_output(&header, [record])
        }
    }
}

pub fn format_holders(holders: &[TokenHolder], skip: u64, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if holders.is_empty() {
                return "No holders found.".to_string();
            }
            let mut table = new_table(vec!["Rank", "Account", "Balance"]);
            for (i, holder) in holders.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(skip + i as u64 + 1),
                    Cell::new(format!("{:?}", holder.account)),
                    Cell::new(holder.balance.to_string()),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_holders: Vec<_> = holders
                .iter()
                .map(|holder| {
                    json!({
                        "account": format!("{:?}", holder.account),
                        "balance": holder.balance.to_string(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_holders).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => csv_output(
            &["rank", "account", "balance"],
            holders.iter().enumerate().map(|(i, holder)| {
                vec![
                    (skip + i as u64 + 1).to_string(),
                    format!("{:?}", holder.account),
                    holder.balance.to_string(),
                ]
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::HolderBalance;
    use alloy_primitives::Address;
    use num_bigint::BigInt;

    fn token() -> Token {
        Token {
            address: Address::repeat_byte(0xab),
            name: "Traveltor Token".to_string(),
            symbol: "TVTOR".to_string(),
            token_type: "ERC20".to_string(),
            total_supply: "50000000000000000000000000000".to_string(),
            total_holders: 2,
            synced_till_block: 120,
        }
    }

    #[test]
    fn json_token_info_includes_transfer_count() {
        let info = TokenInfo {
            token: token(),
            total_transfers: 9,
        };
        let output = format_token_info(Some(&info), &OutputFormat::Json);
        let value: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["totalTransfers"], 9);
        assert_eq!(value["type"], "ERC20");
        assert_eq!(value["totalSupply"], "50000000000000000000000000000");
        assert_eq!(format_token_info(None, &OutputFormat::Json), "null");
    }

    #[test]
    fn csv_holders_keep_rank_across_pages() {
        let holders = vec![TokenHolder {
            account: Address::repeat_byte(0x01),
            balance: HolderBalance::Amount(BigInt::from(42)),
        }];
        let output = format_holders(&holders, 10, &OutputFormat::Csv);
        let mut lines = output.lines();

        assert_eq!(lines.next(), Some("rank,account,balance"));
        assert_eq!(
            lines.next(),
            Some("11,0x0101010101010101010101010101010101010101,42")
        );
    }

    #[test]
    fn empty_tables_say_so() {
        assert_eq!(format_tokens(&[], &OutputFormat::Table), "No tokens found.");
        assert_eq!(format_holders(&[], 0, &OutputFormat::Table), "No holders found.");
        assert!(format_tokens(&[token()], &OutputFormat::Table).contains("TVTOR"));
    }
}
