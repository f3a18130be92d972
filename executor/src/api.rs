//! Fabric HTTP client: capability reporting, heartbeats, result delivery,
//! and opening the command stream. `reqwest` is already the teacher's HTTP
//! client of choice throughout `iam` and `compiler`; `reqwest-eventsource`
//! is its canonical SSE-client wrapper (spec.md §4.5, DESIGN NOTES).

use anyhow::{Context, Result};
use kubently_common::args::ExecutorArgs;
use kubently_common::types::{CapabilityRecord, ResultSubmission};
use reqwest::Client;
use reqwest_eventsource::EventSource;

#[derive(Clone)]
pub struct FabricClient {
    http: Client,
    args: ExecutorArgs,
}

impl FabricClient {
    pub fn new(args: ExecutorArgs) -> Self {
        Self {
            http: Client::new(),
            args,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.args.api_base_url.trim_end_matches('/'), path)
    }

    fn auth_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.args.executor_token)
            .header("X-Cluster-ID", &self.args.cluster_id)
    }

    /// Opens `GET /executor/stream` as a server-sent-events source. The
    /// caller drives reconnection; this just builds one attempt.
    pub fn open_stream(&self) -> Result<EventSource> {
        let request = self.auth_request(reqwest::Method::GET, "/executor/stream");
        EventSource::new(request).context("failed to build SSE request")
    }

    pub async fn post_capabilities(&self, record: &CapabilityRecord) -> Result<()> {
        let resp = self
            .auth_request(reqwest::Method::POST, "/executor/capabilities")
            .json(record)
            .send()
            .await
            .context("POST /executor/capabilities")?;
        check_status(resp).await
    }

    pub async fn post_heartbeat(&self) -> Result<()> {
        let resp = self
            .auth_request(reqwest::Method::POST, "/executor/heartbeat")
            .send()
            .await
            .context("POST /executor/heartbeat")?;
        check_status(resp).await
    }

    pub async fn post_result(&self, submission: &ResultSubmission) -> Result<()> {
        let resp = self
            .auth_request(reqwest::Method::POST, "/executor/results")
            .json(submission)
            .send()
            .await
            .context("POST /executor/results")?;
        check_status(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<()> {
    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("fabric returned {status}: {body}")
}
