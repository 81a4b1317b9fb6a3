//! Read-only access to the telemetry store.

pub mod influx;
pub mod influxql;

use serde::Deserialize;
use serde_json::Value;

use crate::error::TransportError;

pub use influx::InfluxClient;

#[async_trait::async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Runs one InfluxQL statement against `database`.
    async fn query(&self, database: &str, query: &str) -> Result<QueryResponse, TransportError>;
}

/// `results[].series[].values[]` as returned by `/query`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    pub series: Option<Vec<Series>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl Series {
    /// Index of the column holding tag values in `SHOW TAG VALUES` output.
    fn tag_value_column(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == "value")
            .or_else(|| self.columns.len().checked_sub(1))
    }
}

impl QueryResponse {
    /// First statement error in the payload, if any.
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }

    /// Absence of `results[0].series` means "no match".
    pub fn is_empty(&self) -> bool {
        self.series().all(|s| s.values.is_empty())
    }

    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.results.iter().flat_map(|r| r.series.iter().flatten())
    }

    /// Every raw row across all series, in response order.
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.series().flat_map(|s| s.values.iter().map(Vec::as_slice))
    }

    /// String values from `SHOW TAG VALUES` rows; blanks and non-strings are dropped.
    pub fn tag_values(&self) -> Vec<String> {
        let mut out = Vec::new();
        for series in self.series() {
            let Some(col) = series.tag_value_column() else {
                continue;
            };
            for row in &series.values {
                if let Some(v) = row.get(col).and_then(Value::as_str) {
                    if !v.is_empty() {
                        out.push(v.to_string());
                    }
                }
            }
        }
        out
    }
}
