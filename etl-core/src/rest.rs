//! Historical-trades REST client

use crate::error::RestError;
use crate::resync::{RestTrade, TradeHistory};
use async_trait::async_trait;
use tracing::debug;

/// Client for the exchange's `GET /products/{product}/trades` endpoint.
pub struct CoinbaseRestClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoinbaseRestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn trades_url(&self, product: &str) -> String {
        // The API accepts the product id lowercased in the path.
        format!("{}/products/{}/trades", self.base_url, product.to_lowercase())
    }
}

#[async_trait]
impl TradeHistory for CoinbaseRestClient {
    async fn latest_trades(&self, product: &str, limit: u32) -> Result<Vec<RestTrade>, RestError> {
        let url = self.trades_url(product);
        debug!(%url, limit, "querying trade history");

        let response = self
            .http
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| RestError::Request {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<RestTrade>>()
            .await
            .map_err(|e| RestError::Body(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trades_url_lowercases_product_and_trims_base() {
        let client = CoinbaseRestClient::new("https://api.exchange.coinbase.com/");
        assert_eq!(
            client.trades_url("BTC-USD"),
            "https://api.exchange.coinbase.com/products/btc-usd/trades"
        );
    }
}
