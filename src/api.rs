// ABOUTME: HTTP client for the JobTrail REST API
// ABOUTME: Pulls a fresh bearer token from the provider before every request

use crate::auth::TokenProvider;
use crate::model::{Activity, Board, Job};
use crate::store::SecretStore;
use crate::util::truncate_str;
use crate::{Error, Result};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.jobtrail.app";

pub struct ApiClient<S: SecretStore> {
    http: reqwest::Client,
    base_url: String,
    provider: TokenProvider<S>,
}

impl<S: SecretStore> ApiClient<S> {
    pub fn new(provider: TokenProvider<S>, base_url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(ApiClient {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE.into()),
            provider,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        // Fresh token immediately before the call; never cached here
        let token = self.provider.token().await?;
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .http
            .get(&url)
            .query(query)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .header("User-Agent", "jobtrail/0.3 (Rust)")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint: endpoint.into(),
                status: status.as_u16(),
                message: truncate_str(&message, 100),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            eprintln!("Failed to parse response from {}: {}", endpoint, e);
            eprintln!(
                "Response body (first 500 chars): {}",
                truncate_str(&body, 500)
            );
            Error::Parse(e)
        })
    }

    pub async fn list_boards(&self) -> Result<Vec<Board>> {
        #[derive(serde::Deserialize)]
        struct Response {
            boards: Vec<Board>,
        }

        let resp: Response = self.get("/v1/boards", &[]).await?;
        Ok(resp.boards)
    }

    pub async fn list_jobs(&self, board_id: Option<&str>) -> Result<Vec<Job>> {
        #[derive(serde::Deserialize)]
        struct Response {
            jobs: Vec<Job>,
        }

        let mut query = Vec::new();
        if let Some(board_id) = board_id {
            query.push(("board_id", board_id.to_string()));
        }

        let resp: Response = self.get("/v1/jobs", &query).await?;
        Ok(resp.jobs)
    }

    pub async fn list_activities(
        &self,
        job_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Activity>> {
        #[derive(serde::Deserialize)]
        struct Response {
            activities: Vec<Activity>,
        }

        let mut query = Vec::new();
        if let Some(job_id) = job_id {
            query.push(("job_id", job_id.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let resp: Response = self.get("/v1/activities", &query).await?;
        Ok(resp.activities)
    }
}
