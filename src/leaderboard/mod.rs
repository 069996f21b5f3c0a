//! Leaderboard source
//!
//! Fetches the published leaderboard from an HTTP endpoint or a local file
//! and hands the raw payload to the normalizer.

pub mod normalize;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::LeaderboardConfig;
use crate::models::ContributorRecord;

pub use normalize::{normalize, parse_contributor, Rejection, DEFAULT_CATEGORY};

/// Leaderboard fetch errors
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("No leaderboard source configured (set LEADERBOARD_API_URL or LEADERBOARD_DATA_FILE)")]
    NoSource,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Leaderboard API returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid leaderboard JSON: {0}")]
    Parse(String),
}

/// Where the leaderboard comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderboardSource {
    Api(String),
    File(PathBuf),
}

impl std::fmt::Display for LeaderboardSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaderboardSource::Api(url) => write!(f, "{}", url),
            LeaderboardSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

pub struct LeaderboardFetcher {
    source: LeaderboardSource,
    http: reqwest::Client,
}

impl LeaderboardFetcher {
    pub fn new(source: LeaderboardSource, timeout: Duration) -> Result<Self, LeaderboardError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LeaderboardError::Network(e.to_string()))?;
        Ok(Self { source, http })
    }

    /// API URL wins over the data file
    pub fn from_config(config: &LeaderboardConfig) -> Result<Self, LeaderboardError> {
        let source = match (&config.api_url, &config.data_file) {
            (Some(url), _) if !url.is_empty() => LeaderboardSource::Api(url.clone()),
            (_, Some(path)) => LeaderboardSource::File(path.clone()),
            _ => return Err(LeaderboardError::NoSource),
        };
        Self::new(source, Duration::from_secs(config.request_timeout_secs))
    }

    pub fn source(&self) -> &LeaderboardSource {
        &self.source
    }

    /// Fetch and normalize. Individual bad entries are dropped; a failed
    /// fetch yields no records at all.
    pub async fn fetch(&self) -> Result<Vec<ContributorRecord>, LeaderboardError> {
        info!(source = %self.source, "Fetching leaderboard");
        let payload = self.fetch_payload().await?;
        let records = normalize(&payload);
        info!(count = records.len(), "Parsed contributors from leaderboard");
        Ok(records)
    }

    async fn fetch_payload(&self) -> Result<Value, LeaderboardError> {
        match &self.source {
            LeaderboardSource::Api(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| LeaderboardError::Network(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(LeaderboardError::HttpStatus(status.as_u16()));
                }

                let body = response
                    .text()
                    .await
                    .map_err(|e| LeaderboardError::Network(e.to_string()))?;
                debug!(bytes = body.len(), "Leaderboard response received");
                serde_json::from_str(&body).map_err(|e| LeaderboardError::Parse(e.to_string()))
            }
            LeaderboardSource::File(path) => {
                let content =
                    tokio::fs::read_to_string(path)
                        .await
                        .map_err(|e| LeaderboardError::Io {
                            path: path.clone(),
                            reason: e.to_string(),
                        })?;
                serde_json::from_str(&content).map_err(|e| LeaderboardError::Parse(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(api_url: Option<&str>, data_file: Option<PathBuf>) -> LeaderboardConfig {
        LeaderboardConfig {
            api_url: api_url.map(str::to_string),
            data_file,
            ..Default::default()
        }
    }

    #[test]
    fn test_source_selection() {
        let fetcher =
            LeaderboardFetcher::from_config(&config(Some("http://lb.test/api"), Some("x.json".into())))
                .unwrap();
        assert_eq!(
            fetcher.source(),
            &LeaderboardSource::Api("http://lb.test/api".into())
        );

        let fetcher = LeaderboardFetcher::from_config(&config(Some(""), Some("x.json".into()))).unwrap();
        assert_eq!(fetcher.source(), &LeaderboardSource::File("x.json".into()));

        assert!(matches!(
            LeaderboardFetcher::from_config(&config(None, None)),
            Err(LeaderboardError::NoSource)
        ));
    }

    #[tokio::test]
    async fn test_fetch_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"leaderboard": [
                {{"username": "alice", "wallet": "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi", "xp": 10}},
                {{"username": "bob", "wallet": "not-a-wallet", "xp": 10}}
            ]}}"#
        )
        .unwrap();

        let fetcher = LeaderboardFetcher::from_config(&config(None, Some(file.path().into()))).unwrap();
        let records = fetcher.fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "alice");
    }

    #[tokio::test]
    async fn test_fetch_errors() {
        let fetcher =
            LeaderboardFetcher::from_config(&config(None, Some("/nonexistent/lb.json".into()))).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(LeaderboardError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let fetcher = LeaderboardFetcher::from_config(&config(None, Some(file.path().into()))).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(LeaderboardError::Parse(_))));
    }
}
