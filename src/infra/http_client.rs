use crate::app::ports::LogQueryPort;
use crate::constants::{LOGS_ENDPOINT, LOGS_PATH, STATS_ENDPOINT, STATS_PATH};
use crate::error::{DashboardError, Result};
use crate::query::QueryParameters;
use crate::types::{AggregateStats, LogEntry};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// `LogQueryPort` over HTTP using reqwest.
pub struct ReqwestLogQuery {
    client: reqwest::Client,
    logs_url: Url,
    stats_url: Url,
}

/// Join an endpoint path onto the base URL, keeping any path prefix the base
/// already has (`http://host/api` + `/logs` = `http://host/api/logs`).
pub fn endpoint_url(base: &str, path: &str) -> Result<Url> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

impl ReqwestLogQuery {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            logs_url: endpoint_url(api_url, LOGS_PATH)?,
            stats_url: endpoint_url(api_url, STATS_PATH)?,
        })
    }

    async fn get_json<T: DeserializeOwned + Default>(
        &self,
        endpoint: &'static str,
        base: &Url,
        query: &QueryParameters,
    ) -> Result<T> {
        let mut url = base.clone();
        query.apply_to(&mut url);
        debug!(%url, "Polling");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(endpoint, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DashboardError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await.map_err(|e| classify(endpoint, e))?;
        // The backend encodes an empty result set as `null`.
        let body: Option<T> = serde_json::from_slice(&bytes)?;
        Ok(body.unwrap_or_default())
    }
}

fn classify(endpoint: &'static str, err: reqwest::Error) -> DashboardError {
    if err.is_timeout() {
        DashboardError::Timeout { endpoint }
    } else {
        DashboardError::Http(err)
    }
}

#[async_trait]
impl LogQueryPort for ReqwestLogQuery {
    async fn fetch_logs(&self, query: &QueryParameters) -> Result<Vec<LogEntry>> {
        self.get_json(LOGS_ENDPOINT, &self.logs_url, query).await
    }

    async fn fetch_stats(&self, query: &QueryParameters) -> Result<AggregateStats> {
        self.get_json(STATS_ENDPOINT, &self.stats_url, query).await
    }
}
