//! Local stand-in for a form-post payment gateway.
//!
//! Requests and callbacks are flat key/value forms signed with HMAC-SHA256
//! over the canonical string `k1=v1&k2=v2&...` (keys sorted, empty values
//! and the `sign` field itself excluded), hex-encoded into `sign`. This is
//! enough to exercise initiation and both callback paths end to end without
//! a vendor SDK.

use crate::config::GatewaySettings;
use crate::domain::gateway::{
    AckToken, GatewayPayload, PaymentRequest, RawCallback, RedirectDirective, TradeStatus,
};
use crate::domain::ports::PaymentGateway;
use crate::error::{InstallmentError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::convert::Infallible;

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_FIELD: &str = "sign";
const SUCCESS_ACK: &str = "success";

pub struct SandboxGateway {
    settings: GatewaySettings,
}

impl SandboxGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.settings.secret.as_bytes())
            .map_err(|_| {
                InstallmentError::InternalError(Box::new(std::io::Error::other(
                    "gateway secret rejected as HMAC key",
                )))
            })
    }

    fn canonical(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .filter(|(key, value)| key.as_str() != SIGN_FIELD && !value.is_empty())
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Hex signature of `params` under the configured secret.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(Self::canonical(params).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Returns `raw` with a valid `sign` field, replacing any existing one.
    pub fn signed(&self, raw: &RawCallback) -> Result<RawCallback> {
        let mut params = raw.params.clone();
        params.remove(SIGN_FIELD);
        let sign = self.sign(&params)?;
        params.insert(SIGN_FIELD.to_string(), sign);
        Ok(RawCallback { params })
    }

    fn verify(&self, raw: &RawCallback) -> Result<GatewayPayload> {
        let sign = raw
            .get(SIGN_FIELD)
            .ok_or_else(|| InstallmentError::Verification("missing sign".to_string()))?;
        let sign = hex::decode(sign)
            .map_err(|_| InstallmentError::Verification("sign is not hex".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(Self::canonical(&raw.params).as_bytes());
        mac.verify_slice(&sign)
            .map_err(|_| InstallmentError::Verification("signature mismatch".to_string()))?;

        let field = |name: &str| {
            raw.get(name)
                .map(str::to_string)
                .ok_or_else(|| InstallmentError::Verification(format!("missing {name}")))
        };
        let trade_status = field("trade_status")?
            .parse::<TradeStatus>()
            .unwrap_or_else(|never: Infallible| match never {});

        Ok(GatewayPayload {
            trade_status,
            out_trade_no: field("out_trade_no")?,
            trade_no: field("trade_no")?,
        })
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn method_tag(&self) -> &str {
        &self.settings.method_tag
    }

    async fn initiate_payment(&self, request: PaymentRequest) -> Result<RedirectDirective> {
        let mut fields = BTreeMap::from([
            ("out_trade_no".to_string(), request.correlation_key.to_string()),
            ("total_amount".to_string(), request.amount.to_string()),
            ("subject".to_string(), request.subject),
            ("return_url".to_string(), request.return_url),
            ("notify_url".to_string(), request.notify_url),
        ]);
        let sign = self.sign(&fields)?;
        fields.insert(SIGN_FIELD.to_string(), sign);

        Ok(RedirectDirective {
            method: "POST".to_string(),
            url: self.settings.url.clone(),
            fields,
        })
    }

    fn verify_return(&self, raw: &RawCallback) -> Result<GatewayPayload> {
        self.verify(raw)
    }

    fn verify_notification(&self, raw: &RawCallback) -> Result<GatewayPayload> {
        self.verify(raw)
    }

    fn ack_success(&self) -> AckToken {
        AckToken(SUCCESS_ACK.to_string())
    }
}
