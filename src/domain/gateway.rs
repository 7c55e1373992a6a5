//! Types exchanged with the payment gateway.

use super::correlation::CorrelationKey;
use super::money::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;

/// Body the gateway expects when a notification could not be applied.
pub const FAILURE_ACK: &str = "fail";

/// Unverified callback parameters as posted by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCallback {
    pub params: BTreeMap<String, String>,
}

impl RawCallback {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeStatus {
    WaitBuyerPay,
    Success,
    Finished,
    Closed,
    Other(String),
}

impl TradeStatus {
    /// Whether the trade reached a paid terminal state.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Finished)
    }
}

impl FromStr for TradeStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "WAIT_BUYER_PAY" => Self::WaitBuyerPay,
            "TRADE_SUCCESS" => Self::Success,
            "TRADE_FINISHED" => Self::Finished,
            "TRADE_CLOSED" => Self::Closed,
            other => Self::Other(other.to_string()),
        })
    }
}

/// A verified, normalized gateway callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPayload {
    pub trade_status: TradeStatus,
    /// Our correlation key, echoed back (`out_trade_no`).
    pub out_trade_no: String,
    /// The gateway's own transaction id.
    pub trade_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub correlation_key: CorrelationKey,
    pub amount: Amount,
    pub subject: String,
    pub return_url: String,
    pub notify_url: String,
}

/// What the browser should do to continue the checkout, typically an
/// auto-submitted form or a redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectDirective {
    pub method: String,
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckToken(pub String);

/// Response body sent back to the gateway for an asynchronous notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAck {
    /// The notification is handled; the gateway stops redelivering it.
    Success(AckToken),
    /// The notification was not applied; the gateway keeps redelivering it.
    Failure,
}

impl NotificationAck {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Success(token) => &token.0,
            Self::Failure => FAILURE_ACK,
        }
    }
}

/// User-facing outcome of the synchronous browser return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
    PaymentSucceeded,
    DataInvalid,
}

impl ReturnOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::PaymentSucceeded => "payment succeeded",
            Self::DataInvalid => "data invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_status_settled_values() {
        let settled: TradeStatus = "TRADE_SUCCESS".parse().unwrap();
        let finished: TradeStatus = "TRADE_FINISHED".parse().unwrap();
        let waiting: TradeStatus = "WAIT_BUYER_PAY".parse().unwrap();
        let unknown: TradeStatus = "SOMETHING_NEW".parse().unwrap();
        assert!(settled.is_settled());
        assert!(finished.is_settled());
        assert!(!waiting.is_settled());
        assert_eq!(unknown, TradeStatus::Other("SOMETHING_NEW".to_string()));
        assert!(!unknown.is_settled());
    }

    #[test]
    fn test_ack_bodies() {
        assert_eq!(NotificationAck::Success(AckToken("success".into())).body(), "success");
        assert_eq!(NotificationAck::Failure.body(), "fail");
    }
}
