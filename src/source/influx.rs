//! InfluxDB 1.x window source.
//!
//! Samples are written to InfluxDB by the serial-to-broker bridge. Each
//! pipeline cycle runs a short time-bounded query through the HTTP `/query`
//! endpoint and turns the returned series into ordered samples.

use crate::config::SourceConfig;
use crate::core::AXES;
use crate::source::types::{Sample, SourceError};
use crate::source::WindowSource;
use chrono::DateTime;
use serde::Deserialize;
use std::time::Duration;

/// Window source backed by the InfluxDB HTTP query API.
pub struct InfluxWindowSource {
    config: SourceConfig,
    client: reqwest::Client,
}

impl InfluxWindowSource {
    /// Create a new source. No request is made until the first fetch.
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        if config.fields.len() != AXES {
            return Err(SourceError::Config(format!(
                "expected {} axis fields, got {}",
                AXES,
                config.fields.len()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Get the query endpoint URL.
    pub fn query_url(&self) -> String {
        format!("{}/query", self.config.url.trim_end_matches('/'))
    }

    /// Build the InfluxQL statement for one window.
    pub fn build_query(&self, recency: Duration, max_samples: usize) -> String {
        let fields = self
            .config
            .fields
            .iter()
            .map(|f| format!("\"{f}\""))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "SELECT {} FROM \"{}\" WHERE time > now() - {}ms LIMIT {}",
            fields,
            self.config.measurement,
            recency.as_millis(),
            max_samples
        )
    }

    /// Ping the server. Used at startup to report reachability.
    pub async fn test_connection(&self) -> Result<bool, SourceError> {
        let url = format!("{}/ping", self.config.url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

impl WindowSource for InfluxWindowSource {
    async fn fetch_recent_window(
        &self,
        recency: Duration,
        max_samples: usize,
    ) -> Result<Vec<Sample>, SourceError> {
        let query = self.build_query(recency, max_samples);

        let mut request = self.client.get(self.query_url()).query(&[
            ("db", self.config.database.as_str()),
            ("q", query.as_str()),
            ("epoch", "ms"),
        ]);
        if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SourceError::Unavailable(format!("{status}: {body}")));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        let mut samples = parse_samples(&body, &self.config.fields)?;
        samples.truncate(max_samples);
        Ok(samples)
    }
}

/// Top-level `/query` response.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    pub error: Option<String>,
}

/// Result of a single InfluxQL statement.
#[derive(Debug, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub series: Vec<Series>,
    pub error: Option<String>,
}

/// One series of rows.
#[derive(Debug, Deserialize)]
pub struct Series {
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Convert a query response into samples.
///
/// Rows with a missing, non-numeric or out-of-range axis are skipped. A response without
/// any series is an empty window, not an error.
pub fn parse_samples(
    response: &QueryResponse,
    fields: &[String],
) -> Result<Vec<Sample>, SourceError> {
    if fields.len() != AXES {
        return Err(SourceError::Config(format!("expected {AXES} axis fields")));
    }
    if let Some(ref error) = response.error {
        return Err(SourceError::Unavailable(error.clone()));
    }

    let mut samples = Vec::new();

    for result in &response.results {
        if let Some(ref error) = result.error {
            return Err(SourceError::Unavailable(error.clone()));
        }

        for series in &result.series {
            let column = |name: &str| {
                series
                    .columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| SourceError::Malformed(format!("missing column '{name}'")))
            };

            let time_ix = column("time")?;
            let x_ix = column(fields[0].as_str())?;
            let y_ix = column(fields[1].as_str())?;
            let z_ix = column(fields[2].as_str())?;

            for row in &series.values {
                let axis = |ix: usize| {
                    row.get(ix)
                        .and_then(|v| v.as_f64())
                        .map(|v| v as f32)
                        .filter(|v| v.is_finite())
                };

                let timestamp = row
                    .get(time_ix)
                    .and_then(|v| v.as_i64())
                    .and_then(DateTime::from_timestamp_millis);

                if let (Some(timestamp), Some(x), Some(y), Some(z)) =
                    (timestamp, axis(x_ix), axis(y_ix), axis(z_ix))
                {
                    samples.push(Sample::new(timestamp, x, y, z));
                }
            }
        }
    }

    Ok(samples)
}
