//! Card network authorization messages.
//!
//! Field names follow the network's JSON. Fields the ledger does not act on
//! are carried through [`NetworkFields`] and echoed back unchanged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{command::AuthorizeCommand, store::LedgerStore};

use super::{ActionCode, AuthorizationDecision, CardAuthorizer};

pub const RESPONSE_MESSAGE_TYPE: &str = "2110";
pub const DECLINED_APPROVAL_CODE: &str = "000000";
/// Balance placeholder for declines, the real balance never leaves on a decline.
pub const ZERO_BALANCE_VALUE: &str = "000000000000";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cardholder_billing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_and_time_transmission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rate_cardholder_billing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systems_trace_audit_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_capture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_category_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquiring_institution_identification_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_reference_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_acceptor_terminal_identification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_acceptor_identification_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_acceptor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_acceptor_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_acceptor_country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub primary_account_number: String,
    pub amount_transaction: Decimal,
    /// ISO 4217 numeric code.
    pub currency_code: String,
    #[serde(rename = "idempotency_key", default)]
    pub idempotency_key: Option<String>,
    #[serde(flatten)]
    pub network: NetworkFields,
}

impl AuthorizationRequest {
    pub fn to_command(&self) -> AuthorizeCommand {
        AuthorizeCommand::parse(
            &self.primary_account_number,
            self.amount_transaction,
            &self.currency_code,
            self.idempotency_key.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalAmount {
    pub account_type: String,
    pub amount_type: String,
    pub currency_code: String,
    pub currency_minor_unit: String,
    pub amount_sign: String,
    /// Available balance in minor units, zero padded to 12 digits.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResponse {
    pub message_type: String,
    pub primary_account_number: String,
    pub amount_transaction: Decimal,
    #[serde(flatten)]
    pub network: NetworkFields,
    pub action_code: String,
    pub approval_code: String,
    pub additional_amounts: Vec<AdditionalAmount>,
}

impl AuthorizationResponse {
    pub fn new(
        request: &AuthorizationRequest,
        decision: &AuthorizationDecision,
        approval_code: &str,
    ) -> Self {
        let (approval_code, value) = match decision.action() {
            ActionCode::Approved => (approval_code.to_string(), minor_units(decision.balance())),
            ActionCode::Declined => (
                DECLINED_APPROVAL_CODE.to_string(),
                ZERO_BALANCE_VALUE.to_string(),
            ),
        };
        Self {
            message_type: RESPONSE_MESSAGE_TYPE.to_string(),
            primary_account_number: request.primary_account_number.clone(),
            amount_transaction: request.amount_transaction,
            network: request.network.clone(),
            action_code: decision.action().code().to_string(),
            approval_code,
            additional_amounts: vec![AdditionalAmount {
                account_type: "00".to_string(),
                amount_type: "02".to_string(),
                currency_code: request.currency_code.clone(),
                currency_minor_unit: "2".to_string(),
                amount_sign: "C".to_string(),
                value,
            }],
        }
    }
}

/// Whole cents, fractions of a cent are dropped. Zero padded to 12 digits,
/// wider when the amount needs more.
///
/// Units and cents are formatted separately, so no intermediate value can
/// exceed the range of [`Decimal`].
pub fn minor_units(amount: Decimal) -> String {
    let units = amount.trunc();
    let cents = ((amount - units) * Decimal::ONE_HUNDRED).trunc().to_string();
    let digits = if units.is_zero() {
        cents
    } else {
        format!("{units}{cents:0>2}")
    };
    format!("{digits:0>12}")
}

impl<S> CardAuthorizer<S>
where
    S: LedgerStore,
{
    /// Runs a network request through the state machine. The answer is
    /// always a response, declines included.
    pub fn handle_request(&self, request: &AuthorizationRequest) -> AuthorizationResponse {
        let decision = self.authorize(&request.to_command());
        AuthorizationResponse::new(request, &decision, self.approval_code())
    }
}
