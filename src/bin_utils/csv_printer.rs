use std::io::Write;

use anyhow::{Context, Result};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::account::AccountId;

/// One output line: the closing balances of an account.
#[derive(Debug, Serialize)]
pub struct AccountRow {
    pub account: AccountId,
    pub usd: Decimal,
    pub lbp: Decimal,
}

pub fn print_accounts<W>(output: &mut W, rows: impl IntoIterator<Item = AccountRow>) -> Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for row in rows {
        let account = row.account;
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write balances of account {account}"))?;
    }
    writer.flush().context("Failed to flush balances")
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn header_and_rows() {
        let mut output = Vec::new();
        print_accounts(
            &mut output,
            [
                AccountRow {
                    account: 1,
                    usd: dec!(372.50),
                    lbp: dec!(245000),
                },
                AccountRow {
                    account: 2,
                    usd: Decimal::ZERO,
                    lbp: Decimal::ZERO,
                },
            ],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "account,usd,lbp\n1,372.50,245000\n2,0,0\n"
        );
    }

    #[test]
    fn empty_ledger_prints_nothing() {
        let mut output = Vec::new();
        print_accounts(&mut output, []).unwrap();
        assert!(output.is_empty());
    }
}
