use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use tripcar_core::payment::{parse_gateway_timestamp, ConfirmRequest, GatewayConfirmation, PaymentGateway};
use tripcar_core::{CoreError, CoreResult};

/// Client for the hosted-checkout gateway's confirm endpoint.
pub struct TossGateway {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody<'a> {
    payment_key: &'a str,
    order_id: &'a str,
    amount: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    payment_key: Option<String>,
    approved_at: Option<String>,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl TossGateway {
    pub fn new(base_url: &str, secret_key: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: basic_auth(secret_key),
        })
    }
}

/// The gateway authenticates with the secret key as the Basic username and an
/// empty password.
fn basic_auth(secret_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:", secret_key)))
}

#[async_trait]
impl PaymentGateway for TossGateway {
    async fn confirm(&self, request: &ConfirmRequest) -> CoreResult<GatewayConfirmation> {
        let url = format!("{}/v1/payments/confirm", self.base_url);
        let body = ConfirmBody {
            payment_key: &request.transaction_key,
            order_id: &request.order_ref,
            amount: request.amount,
        };

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gateway confirm transport error for {}: {}", request.order_ref, e);
                CoreError::Internal(format!("payment gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response
                .json::<GatewayErrorBody>()
                .await
                .ok()
                .map(|b| {
                    format!(
                        "{}: {}",
                        b.code.unwrap_or_else(|| status.as_str().to_string()),
                        b.message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| status.to_string());
            warn!("Gateway declined {}: {}", request.order_ref, detail);
            return Err(CoreError::PaymentDeclined(detail));
        }
        if !status.is_success() {
            error!("Gateway confirm for {} failed with {}", request.order_ref, status);
            return Err(CoreError::Internal(format!("payment gateway returned {}", status)));
        }

        let parsed: ConfirmResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("unreadable gateway response: {}", e)))?;

        info!("Gateway approved {}", request.order_ref);
        Ok(GatewayConfirmation {
            transaction_key: parsed.payment_key.unwrap_or_else(|| request.transaction_key.clone()),
            approved_at: parsed.approved_at.as_deref().and_then(parse_gateway_timestamp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_uses_secret_with_empty_password() {
        // "test_sk:" in base64
        assert_eq!(basic_auth("test_sk"), "Basic dGVzdF9zazo=");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let gateway = TossGateway::new("https://api.example.com/", "sk").unwrap();
        assert_eq!(gateway.base_url, "https://api.example.com");
    }
}
