use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{config::AppConfig, error::AppError};

/// Thin client for the hosted payment processor's payment-intent API.
/// The base URL is configurable so tests can point at a stub server.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    pub currency: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

impl PaymentClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.payment_api_base.trim_end_matches('/').to_string(),
            secret_key: config.payment_secret_key.clone(),
            currency: config.payment_currency.clone(),
        }
    }

    /// Create a payment intent sized in minor currency units.
    pub async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        user_id: Uuid,
    ) -> Result<PaymentIntent, AppError> {
        let url = format!("{}/v1/payment_intents", self.api_base);
        let amount_str = amount.to_string();
        let user_id_str = user_id.to_string();
        let params = [
            ("amount", amount_str.as_str()),
            ("currency", currency),
            ("metadata[user_id]", user_id_str.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("payment request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %text, "payment intent creation failed");
            return Err(AppError::Internal(anyhow::anyhow!(
                "payment processor returned {status}"
            )));
        }

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid payment response: {e}")))?;

        Ok(intent)
    }
}
