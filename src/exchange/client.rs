//! Signed REST client for the exchange.
//!
//! All authenticated calls go through [`ExchangeClient::execute`], the one place
//! where transport, status and parse failures are absorbed into `None`.

use crate::config::ExchangeConfig;
use crate::exchange::auth::{self, API_PREFIX, HEADER_API_KEY, HEADER_EXPIRES, HEADER_SIGNATURE};
use crate::exchange::error::ApiError;
use crate::exchange::traits::ExchangeApi;
use crate::exchange::types::*;
use crate::utils::decimal::decimal_from_json;
use crate::utils::RetryPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Authenticated client for the exchange's v2 REST API.
pub struct ExchangeClient {
    http: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    retry: RetryPolicy,
}

impl ExchangeClient {
    /// Create a new client from configuration.
    pub fn new(config: &ExchangeConfig, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Current unix time in seconds.
    fn timestamp() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Idempotent requests may be retried; order placement never is.
    fn is_idempotent(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::DELETE)
    }

    /// Execute a signed request, absorbing every failure into `None`.
    pub async fn execute(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Option<Value> {
        match self.try_execute(method.clone(), endpoint, body).await {
            Ok(value) => Some(value),
            Err(e) if e.is_auth_error() => {
                error!(%method, %endpoint, error = %e, "Request rejected: check API key and secret");
                None
            }
            Err(e) => {
                error!(%method, %endpoint, error = %e, "API request failed");
                None
            }
        }
    }

    /// Execute a signed request, retrying transient failures on idempotent methods.
    pub async fn try_execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let attempts = if Self::is_idempotent(&method) {
            self.retry.max_attempts()
        } else {
            1
        };

        let mut retry = 0;
        loop {
            match self.send_once(method.clone(), endpoint, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry + 1 < attempts => {
                    let delay = self.retry.delay_for(retry);
                    warn!(
                        %method,
                        %endpoint,
                        attempt = retry + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sign and send one request.
    async fn send_once(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let path = format!("{}{}", API_PREFIX, endpoint);
        let body_text = auth::canonical_body(body)?;
        let expires = auth::expires_at(Self::timestamp());
        let signature = auth::sign(&self.api_secret, method.as_str(), &path, expires, &body_text);

        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, expires, "Sending signed request");

        let mut request = self
            .http
            .request(method, &url)
            .header(HEADER_API_KEY, &self.api_key)
            .header(HEADER_SIGNATURE, signature)
            .header(HEADER_EXPIRES, expires.to_string())
            .header(CONTENT_TYPE, "application/json");

        if body.is_some() {
            debug!(body = %body_text, "Request body");
            request = request.body(body_text);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), response = %text, "Response received");

        if !status.is_success() {
            return Err(ApiError::from_status(status, text));
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    fn symbol_query(symbol: &str) -> String {
        format!("symbol={}", urlencoding::encode(symbol))
    }
}

/// Read a balance field, defaulting to zero when absent or unparseable.
fn balance_field(response: &Value, field: &str) -> Decimal {
    response
        .get(field)
        .and_then(decimal_from_json)
        .unwrap_or(Decimal::ZERO)
}

#[async_trait]
impl ExchangeApi for ExchangeClient {
    #[instrument(skip(self))]
    async fn get_balances(&self, instrument: &Instrument) -> Option<Balances> {
        let Some(response) = self.execute(Method::GET, "/user/balance", None).await else {
            error!("Failed to fetch balance");
            return None;
        };

        if !response.is_object() {
            error!(%response, "Balance response is not an object");
            return None;
        }

        let balances = Balances {
            base_available: balance_field(&response, &instrument.base_balance_field()),
            quote_available: balance_field(&response, &instrument.quote_balance_field()),
        };

        info!(
            base = %instrument.base,
            base_available = %balances.base_available,
            quote = %instrument.quote,
            quote_available = %balances.quote_available,
            "Current balance"
        );
        Some(balances)
    }

    #[instrument(skip(self))]
    async fn get_order_book(&self, symbol: &str) -> Option<OrderBook> {
        let endpoint = format!("/orderbook?{}", Self::symbol_query(symbol));
        let Some(response) = self.execute(Method::GET, &endpoint, None).await else {
            error!(%symbol, "Failed to get orderbook");
            return None;
        };

        let Some(book) = response.get(symbol) else {
            let err = ApiError::Malformed(format!("orderbook response has no \"{}\" key", symbol));
            error!(error = %err, "Failed to get orderbook");
            return None;
        };

        Some(OrderBook::from_json(book))
    }

    #[instrument(skip(self), fields(side = %order.side, price = %order.price, size = %order.size))]
    async fn place_order(&self, order: &OrderRequest) -> Option<OrderAck> {
        let body = match serde_json::to_value(order) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Failed to encode order");
                return None;
            }
        };

        let response = self.execute(Method::POST, "/order", Some(&body)).await;
        let id = response.as_ref().and_then(|r| r.get("id")).and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        match id {
            Some(id) => Some(OrderAck { id }),
            None => {
                error!(response = ?response, "Failed to place order");
                None
            }
        }
    }

    #[instrument(skip(self))]
    async fn cancel_all(&self, symbol: &str) -> bool {
        let endpoint = format!("/order/all?{}", Self::symbol_query(symbol));
        self.execute(Method::DELETE, &endpoint, None).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn test_client(server: &MockServer, max_attempts: u32) -> ExchangeClient {
        let config = ExchangeConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            ..ExchangeConfig::default()
        };
        let retry = RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5));
        ExchangeClient::new(&config, retry).unwrap()
    }

    fn instrument() -> Instrument {
        Instrument::new("usdt", "dop")
    }

    #[tokio::test]
    async fn test_balance_request_is_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/user/balance"))
            .and(header("api-key", "test-key"))
            .and(header_exists("api-signature"))
            .and(header_exists("api-expires"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usdt_available": 1500.5,
                "dop_available": "90000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, 1);
        let balances = client.get_balances(&instrument()).await.unwrap();
        assert_eq!(balances.base_available, dec!(1500.5));
        assert_eq!(balances.quote_available, dec!(90000));

        let requests = server.received_requests().await.unwrap();
        let request: &Request = &requests[0];
        let expires: i64 = request.headers["api-expires"].to_str().unwrap().parse().unwrap();
        let now = chrono::Utc::now().timestamp();
        assert!(expires > now && expires <= now + 61);

        let expected = auth::sign("test-secret", "GET", "/v2/user/balance", expires, "");
        assert_eq!(request.headers["api-signature"].to_str().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_missing_balance_fields_default_to_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/user/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"btc_available": 1})))
            .mount(&server)
            .await;

        let balances = test_client(&server, 1).get_balances(&instrument()).await.unwrap();
        assert_eq!(balances, Balances::default());
    }

    #[tokio::test]
    async fn test_order_body_is_sent_exactly_as_signed() {
        let server = MockServer::start().await;
        let body = r#"{"symbol":"usdt-dop","side":"sell","size":10.5,"type":"limit","price":63.22}"#;
        Mock::given(method("POST"))
            .and(path("/v2/order"))
            .and(body_string(body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, 3);
        let order = OrderRequest::limit("usdt-dop", OrderSide::Sell, dec!(63.22), dec!(10.5));
        let ack = client.place_order(&order).await.unwrap();
        assert_eq!(ack.id, "abc-1");

        let requests = server.received_requests().await.unwrap();
        let expires: i64 = requests[0].headers["api-expires"].to_str().unwrap().parse().unwrap();
        let expected = auth::sign("test-secret", "POST", "/v2/order", expires, body);
        assert_eq!(requests[0].headers["api-signature"].to_str().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_order_without_id_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .mount(&server)
            .await;

        let order = OrderRequest::limit("usdt-dop", OrderSide::Buy, dec!(52.78), dec!(1));
        assert!(test_client(&server, 1).place_order(&order).await.is_none());
    }

    #[tokio::test]
    async fn test_order_placement_is_never_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/order"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let order = OrderRequest::limit("usdt-dop", OrderSide::Buy, dec!(52.78), dec!(1));
        assert!(test_client(&server, 5).place_order(&order).await.is_none());
    }

    #[tokio::test]
    async fn test_idempotent_read_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/user/balance"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/user/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"usdt_available": 7})))
            .mount(&server)
            .await;

        let balances = test_client(&server, 3).get_balances(&instrument()).await.unwrap();
        assert_eq!(balances.base_available, dec!(7));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/user/balance"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid signature"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server, 3);
        let err = client
            .try_execute(Method::GET, "/user/balance", None)
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
        assert!(client.get_balances(&instrument()).await.is_none());
    }

    #[tokio::test]
    async fn test_non_json_success_is_absorbed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/user/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = test_client(&server, 1);
        assert!(client.execute(Method::GET, "/user/balance", None).await.is_none());
    }

    #[tokio::test]
    async fn test_order_book_parses_levels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orderbook"))
            .and(query_param("symbol", "usdt-dop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usdt-dop": {
                    "bids": [[57.9, 120], ["57.5", "10"]],
                    "asks": [[58.3, 40]]
                }
            })))
            .mount(&server)
            .await;

        let book = test_client(&server, 1).get_order_book("usdt-dop").await.unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.best_bid(), Some(dec!(57.9)));
        assert_eq!(book.best_ask(), Some(dec!(58.3)));
        assert_eq!(book.mid_price(), Some(dec!(58.1)));
    }

    #[tokio::test]
    async fn test_order_book_missing_symbol_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orderbook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"btc-dop": {}})))
            .mount(&server)
            .await;

        assert!(test_client(&server, 1).get_order_book("usdt-dop").await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_all_targets_symbol() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/order/all"))
            .and(query_param("symbol", "usdt-dop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "1"}])))
            .expect(1)
            .mount(&server)
            .await;

        assert!(test_client(&server, 1).cancel_all("usdt-dop").await);
    }

    #[tokio::test]
    async fn test_cancel_all_failure() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/order/all"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        assert!(!test_client(&server, 1).cancel_all("usdt-dop").await);
    }
}
