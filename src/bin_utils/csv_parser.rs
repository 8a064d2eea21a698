use std::io::Read;

use csv::{DeserializeRecordsIntoIter, Trim};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::account::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Open,
    Card,
    Freeze,
    Cancel,
    TopUp,
    Transfer,
    Authorize,
}

/// One row of the replay file. Which columns are required depends on
/// [`OperationKind`], the rest are left empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub account: Option<AccountId>,
    pub to: Option<AccountId>,
    pub card: Option<String>,
    pub amount: Option<Decimal>,
    /// Currency code, numeric for `authorize`.
    pub currency: Option<String>,
    pub reference: Option<String>,
}

/// Parses operation list in CSV format, yielding each row with the line it
/// was read from.
pub struct CsvOperationParser<R> {
    iter: DeserializeRecordsIntoIter<R, Operation>,
}

impl<R> CsvOperationParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvOperationParser<R>
where
    R: Read,
{
    type Item = (u64, Result<Operation, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}
