use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::SyncError,
    timeseries::{QueryResponse, TimeSeriesStore},
};

use super::{SkipReason, Skipped};

/// The winning candidate and the rows its probe returned.
#[derive(Debug, Clone)]
pub struct ProbeHit {
    pub key: String,
    pub response: QueryResponse,
}

/// Issues time-series queries for one operation.
///
/// Transport failures degrade to an empty result and are recorded in the
/// caller's skip list; only cancellation is returned as an error.
#[derive(Clone)]
pub struct TagProber {
    store: Arc<dyn TimeSeriesStore>,
    cancel: CancellationToken,
}

impl TagProber {
    pub fn new(store: Arc<dyn TimeSeriesStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn query(
        &self,
        database: &str,
        query: &str,
        skipped: &mut Vec<Skipped>,
    ) -> Result<QueryResponse, SyncError> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            res = self.store.query(database, query) => res,
        };

        match result {
            Ok(resp) => Ok(resp),
            Err(e) => {
                metrics::counter!("influx_query_errors_total").increment(1);
                tracing::warn!(error = %e, database, query, "time-series query failed, treating as empty");
                skipped.push(Skipped::new(query, SkipReason::Transport(e.to_string())));
                Ok(QueryResponse::default())
            }
        }
    }

    /// Tries `candidates` in order, building each discovery query with
    /// `probe`, and returns the first one with a non-empty result.
    pub async fn find_identity_tag<F>(
        &self,
        database: &str,
        measurement: &str,
        candidates: &[String],
        probe: F,
        skipped: &mut Vec<Skipped>,
    ) -> Result<Option<ProbeHit>, SyncError>
    where
        F: Fn(&str) -> String,
    {
        for key in candidates {
            let response = self.query(database, &probe(key), skipped).await?;
            if !response.is_empty() {
                tracing::debug!(measurement, tag = %key, "identity tag matched");
                return Ok(Some(ProbeHit {
                    key: key.clone(),
                    response,
                }));
            }
        }
        Ok(None)
    }
}
