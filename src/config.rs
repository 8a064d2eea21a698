//! Ledger settings
//!
//! Read from an optional JSON file, every key may be omitted:
//! ```json
//! { "recordDeclinedAuthorizations": true, "approvalCode": "123456" }
//! ```
//! Environment variables win over the file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const RECORD_DECLINES_ENV: &str = "WALLET_LEDGER_RECORD_DECLINES";
pub const APPROVAL_CODE_ENV: &str = "WALLET_LEDGER_APPROVAL_CODE";

const DEFAULT_APPROVAL_CODE: &str = "123456";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Keep a `failed` ledger row for every declined card authorization, so
    /// a retried decline replays as "previously declined".
    #[serde(default)]
    pub record_declined_authorizations: bool,

    /// Approval code returned to the card network on approval.
    #[serde(default = "default_approval_code")]
    pub approval_code: String,
}

fn default_approval_code() -> String {
    DEFAULT_APPROVAL_CODE.to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            record_declined_authorizations: false,
            approval_code: default_approval_code(),
        }
    }
}

impl LedgerConfig {
    /// A missing file means defaults, a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config `{}`", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config `{}`", path.display()))
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(RECORD_DECLINES_ENV) {
            self.record_declined_authorizations = parse_flag(&value)
                .with_context(|| format!("{RECORD_DECLINES_ENV} must be a boolean, got `{value}`"))?;
        }
        if let Some(code) = lookup(APPROVAL_CODE_ENV) {
            self.approval_code = code;
        }
        Ok(self)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_from_partial_json() {
        let config: LedgerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.approval_code, "123456");

        let config: LedgerConfig =
            serde_json::from_str(r#"{"recordDeclinedAuthorizations": true}"#).unwrap();
        assert!(config.record_declined_authorizations);
        assert_eq!(config.approval_code, "123456");
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = LedgerConfig::load(Path::new("/definitely/not/here.json")).unwrap();
        assert_eq!(config, LedgerConfig::default());
    }

    #[test]
    fn env_overrides() {
        let env = HashMap::from([
            (RECORD_DECLINES_ENV, "yes"),
            (APPROVAL_CODE_ENV, "654321"),
        ]);
        let config = LedgerConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert!(config.record_declined_authorizations);
        assert_eq!(config.approval_code, "654321");

        let err = LedgerConfig::default()
            .with_overrides(|key| (key == RECORD_DECLINES_ENV).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(RECORD_DECLINES_ENV));
    }
}
