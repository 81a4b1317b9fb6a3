use std::time::Duration;

use reqwest::Client;

use crate::{config::InfluxConfig, error::TransportError};

use super::{QueryResponse, TimeSeriesStore};

/// InfluxDB 1.x `/query` client.
pub struct InfluxClient {
    http: Client,
    query_url: String,
    credentials: Option<(String, String)>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl InfluxClient {
    pub fn new(cfg: &InfluxConfig) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(cfg.timeout()).build()?;
        let credentials = match (&cfg.username, &cfg.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };

        Ok(Self {
            http,
            query_url: format!("{}/query", cfg.base_url.trim_end_matches('/')),
            credentials,
            timeout: cfg.timeout(),
            max_retries: cfg.max_retries,
            retry_backoff: cfg.retry_backoff(),
        })
    }

    async fn query_once(&self, database: &str, query: &str) -> Result<QueryResponse, TransportError> {
        let mut req = self
            .http
            .get(&self.query_url)
            .query(&[("db", database), ("q", query)])
            .timeout(self.timeout);
        if let Some((user, pass)) = &self.credentials {
            req = req.query(&[("u", user.as_str()), ("p", pass.as_str())]);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: QueryResponse = response.json().await?;
        if let Some(err) = payload.error() {
            return Err(TransportError::Statement(err.to_string()));
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for InfluxClient {
    async fn query(&self, database: &str, query: &str) -> Result<QueryResponse, TransportError> {
        let mut attempt: u32 = 0;
        loop {
            metrics::counter!("influx_queries_total").increment(1);
            match self.query_once(database, query).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        database,
                        "influx query failed, retrying with backoff"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
