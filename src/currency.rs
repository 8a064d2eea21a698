use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::command::CommandError;

/// ISO 4217 numeric code the card network uses for US dollars.
pub const USD_NUMERIC_CODE: &str = "840";
/// ISO 4217 numeric code for Lebanese pounds.
pub const LBP_NUMERIC_CODE: &str = "422";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Lbp,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Lbp => "LBP",
        }
    }

    /// Resolves the numeric code carried by card authorization requests.
    ///
    /// The table is closed: `840` is USD and every other code, known or not,
    /// settles against the LBP balance.
    pub fn from_numeric_code(code: &str) -> Self {
        if code.trim() == USD_NUMERIC_CODE {
            Currency::Usd
        } else {
            Currency::Lbp
        }
    }

    pub fn numeric_code(&self) -> &'static str {
        match self {
            Currency::Usd => USD_NUMERIC_CODE,
            Currency::Lbp => LBP_NUMERIC_CODE,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "LBP" => Ok(Currency::Lbp),
            _ => Err(CommandError::InvalidCurrency {
                code: s.to_string(),
            }),
        }
    }
}
