//! Payment adapter trait and HMAC-signed gateway implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use common::OrderId;
use domain::{Money, OrderHeader};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::error::PaymentError;

type HmacSha256 = Hmac<Sha256>;

const SIGN_FIELD: &str = "sign";
const SIGN_TYPE_FIELD: &str = "sign_type";
const SIGN_TYPE: &str = "HMAC-SHA256";

/// Trade statuses the gateway uses for a completed payment.
pub const SUCCESS_STATUSES: [&str; 2] = ["TRADE_SUCCESS", "TRADE_FINISHED"];

/// A notification whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    /// Our order id, echoed back as `out_trade_no`.
    pub order_id: OrderId,
    /// Gateway trade status, e.g. `TRADE_SUCCESS`.
    pub trade_status: String,
    /// Amount paid, if the gateway reported one.
    pub total_amount: Option<Money>,
    /// Gateway-side transaction number.
    pub trade_no: Option<String>,
    /// All verified fields.
    pub fields: BTreeMap<String, String>,
}

impl PaymentNotification {
    /// Returns true if the notification reports a completed payment.
    pub fn is_success(&self) -> bool {
        SUCCESS_STATUSES.contains(&self.trade_status.as_str())
    }
}

/// Payment gateway operations.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Builds the URL the user is redirected to in order to pay.
    async fn build_payment_url(&self, order: &OrderHeader) -> Result<String, PaymentError>;

    /// Checks the signature of a raw notification and extracts its fields.
    async fn verify_notification(&self, payload: &str) -> Result<PaymentNotification, PaymentError>;
}

#[async_trait]
impl<T: PaymentAdapter + ?Sized> PaymentAdapter for Arc<T> {
    async fn build_payment_url(&self, order: &OrderHeader) -> Result<String, PaymentError> {
        (**self).build_payment_url(order).await
    }

    async fn verify_notification(
        &self,
        payload: &str,
    ) -> Result<PaymentNotification, PaymentError> {
        (**self).verify_notification(payload).await
    }
}

/// Settings for [`HmacPaymentGateway`].
#[derive(Debug, Clone)]
pub struct PaymentGatewayConfig {
    pub gateway_url: Url,
    pub app_id: String,
    pub secret: String,
    pub notify_url: String,
    pub return_url: String,
}

/// Payment gateway speaking form-encoded, HMAC-SHA256 signed parameters.
///
/// The signature covers every non-empty parameter except `sign` and
/// `sign_type`, sorted by key and joined as `k=v` pairs with `&`, and is
/// transmitted base64-encoded.
#[derive(Debug, Clone)]
pub struct HmacPaymentGateway {
    config: PaymentGatewayConfig,
}

impl HmacPaymentGateway {
    /// Creates a new gateway adapter.
    pub fn new(config: PaymentGatewayConfig) -> Self {
        Self { config }
    }

    /// Computes the signature of a parameter set.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> Result<String, PaymentError> {
        let mac = self.mac_for(params)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Produces a signed form-encoded payload, as the gateway would send it.
    pub fn sign_payload(&self, fields: &[(&str, &str)]) -> Result<String, PaymentError> {
        let mut params: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let signature = self.sign(&params)?;
        params.insert(SIGN_TYPE_FIELD.to_string(), SIGN_TYPE.to_string());
        params.insert(SIGN_FIELD.to_string(), signature);

        Ok(url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish())
    }

    fn mac_for(&self, params: &BTreeMap<String, String>) -> Result<HmacSha256, PaymentError> {
        let canonical = params
            .iter()
            .filter(|(k, v)| {
                k.as_str() != SIGN_FIELD && k.as_str() != SIGN_TYPE_FIELD && !v.is_empty()
            })
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;
        mac.update(canonical.as_bytes());
        Ok(mac)
    }
}

#[async_trait]
impl PaymentAdapter for HmacPaymentGateway {
    async fn build_payment_url(&self, order: &OrderHeader) -> Result<String, PaymentError> {
        let mut params = BTreeMap::new();
        params.insert("app_id".to_string(), self.config.app_id.clone());
        params.insert("out_trade_no".to_string(), order.order_id.to_string());
        params.insert("total_amount".to_string(), order.payment_amount.to_string());
        params.insert("subject".to_string(), format!("Order {}", order.order_id));
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        params.insert("return_url".to_string(), self.config.return_url.clone());
        params.insert(
            "timestamp".to_string(),
            Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        let signature = self.sign(&params)?;

        let mut url = self.config.gateway_url.clone();
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair(SIGN_TYPE_FIELD, SIGN_TYPE)
            .append_pair(SIGN_FIELD, &signature);
        Ok(url.into())
    }

    async fn verify_notification(
        &self,
        payload: &str,
    ) -> Result<PaymentNotification, PaymentError> {
        let fields: BTreeMap<String, String> = url::form_urlencoded::parse(payload.as_bytes())
            .into_owned()
            .collect();

        let signature = fields
            .get(SIGN_FIELD)
            .ok_or_else(|| PaymentError::InvalidSignature("missing sign".to_string()))?;
        let signature = STANDARD
            .decode(signature)
            .map_err(|_| PaymentError::InvalidSignature("sign is not base64".to_string()))?;
        self.mac_for(&fields)?
            .verify_slice(&signature)
            .map_err(|_| PaymentError::InvalidSignature("signature mismatch".to_string()))?;

        if let Some(app_id) = fields.get("app_id")
            && app_id != &self.config.app_id
        {
            return Err(PaymentError::MalformedNotification(format!(
                "unexpected app_id {app_id}"
            )));
        }

        let order_id = fields
            .get("out_trade_no")
            .ok_or_else(|| PaymentError::MalformedNotification("missing out_trade_no".to_string()))?
            .parse::<OrderId>()
            .map_err(|e| PaymentError::MalformedNotification(format!("bad out_trade_no: {e}")))?;
        let trade_status = fields
            .get("trade_status")
            .cloned()
            .ok_or_else(|| {
                PaymentError::MalformedNotification("missing trade_status".to_string())
            })?;
        let total_amount = fields
            .get("total_amount")
            .map(|a| parse_amount(a))
            .transpose()?;
        let trade_no = fields.get("trade_no").cloned();

        Ok(PaymentNotification {
            order_id,
            trade_status,
            total_amount,
            trade_no,
            fields,
        })
    }
}

/// Parses a decimal amount such as `17998.00` into minor units.
pub fn parse_amount(raw: &str) -> Result<Money, PaymentError> {
    let malformed = || PaymentError::MalformedNotification(format!("bad amount {raw}"));

    let (major, minor) = match raw.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (raw, ""),
    };
    if major.is_empty()
        || minor.len() > 2
        || !major.bytes().all(|b| b.is_ascii_digit())
        || !minor.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(malformed());
    }

    let major: i64 = major.parse().map_err(|_| malformed())?;
    let minor: i64 = match minor.len() {
        0 => 0,
        1 => minor.parse::<i64>().map_err(|_| malformed())? * 10,
        _ => minor.parse().map_err(|_| malformed())?,
    };
    major
        .checked_mul(100)
        .and_then(|m| m.checked_add(minor))
        .map(Money::from_minor)
        .ok_or_else(malformed)
}

#[cfg(test)]
mod tests {
    use common::UserId;
    use domain::{OrderStatus, ShippingAddress};

    use super::*;

    fn gateway() -> HmacPaymentGateway {
        HmacPaymentGateway::new(PaymentGatewayConfig {
            gateway_url: Url::parse("https://pay.example.com/gateway").unwrap(),
            app_id: "app-001".to_string(),
            secret: "test-secret".to_string(),
            notify_url: "https://shop.example.com/payments/notify".to_string(),
            return_url: "https://shop.example.com/orders".to_string(),
        })
    }

    fn order() -> OrderHeader {
        let now = Utc::now();
        OrderHeader {
            order_id: OrderId::new(123_456),
            user_id: UserId::new(42),
            total_amount: Money::from_minor(1_799_800),
            shipping_fee: Money::zero(),
            payment_amount: Money::from_minor(1_799_800),
            status: OrderStatus::AwaitingPayment,
            shipping_address: ShippingAddress::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_payment_url_is_signed() {
        let gateway = gateway();
        let url = gateway.build_payment_url(&order()).await.unwrap();
        let url = Url::parse(&url).unwrap();
        assert_eq!(url.host_str(), Some("pay.example.com"));

        let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["out_trade_no"], "123456");
        assert_eq!(params["total_amount"], "17998.00");
        assert_eq!(params["sign_type"], SIGN_TYPE);

        let signature = params.remove("sign").unwrap();
        assert_eq!(gateway.sign(&params).unwrap(), signature);
    }

    #[tokio::test]
    async fn test_verify_round_trip() {
        let gateway = gateway();
        let payload = gateway
            .sign_payload(&[
                ("app_id", "app-001"),
                ("out_trade_no", "123456"),
                ("trade_status", "TRADE_SUCCESS"),
                ("total_amount", "17998.00"),
                ("trade_no", "2024010122001"),
            ])
            .unwrap();

        let notification = gateway.verify_notification(&payload).await.unwrap();
        assert_eq!(notification.order_id, OrderId::new(123_456));
        assert!(notification.is_success());
        assert_eq!(notification.total_amount, Some(Money::from_minor(1_799_800)));
        assert_eq!(notification.trade_no.as_deref(), Some("2024010122001"));
    }

    #[tokio::test]
    async fn test_tampered_payload_is_rejected() {
        let gateway = gateway();
        let payload = gateway
            .sign_payload(&[("out_trade_no", "123456"), ("trade_status", "WAIT_BUYER_PAY")])
            .unwrap();
        let tampered = payload.replace("WAIT_BUYER_PAY", "TRADE_SUCCESS");

        let result = gateway.verify_notification(&tampered).await;
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let other = HmacPaymentGateway::new(PaymentGatewayConfig {
            secret: "other-secret".to_string(),
            ..gateway().config
        });
        let payload = other
            .sign_payload(&[("out_trade_no", "1"), ("trade_status", "TRADE_SUCCESS")])
            .unwrap();

        let result = gateway().verify_notification(&payload).await;
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn test_missing_signature_is_rejected() {
        let result = gateway()
            .verify_notification("out_trade_no=1&trade_status=TRADE_SUCCESS")
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn test_signed_but_incomplete_is_malformed() {
        let gateway = gateway();
        let payload = gateway.sign_payload(&[("trade_status", "TRADE_SUCCESS")]).unwrap();
        let result = gateway.verify_notification(&payload).await;
        assert!(matches!(result, Err(PaymentError::MalformedNotification(_))));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("17998.00").unwrap(), Money::from_minor(1_799_800));
        assert_eq!(parse_amount("0.5").unwrap(), Money::from_minor(50));
        assert_eq!(parse_amount("12").unwrap(), Money::from_minor(1_200));
        assert!(parse_amount("-1.00").is_err());
        assert!(parse_amount("1.234").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount(".50").is_err());
    }
}
