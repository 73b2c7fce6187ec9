//! API client for communicating with the policy advisor

use anyhow::{Context, Result};
use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Error body returned by the advisor API
#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// API client for the policy advisor
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<T, ()>(Method::GET, path, &[], None).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.send::<T, ()>(Method::GET, path, query, None).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    /// Make a PATCH request with JSON body
    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::PATCH, path, &[], Some(body)).await
    }

    /// Make a POST request without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<T, ()>(Method::POST, path, &[], None).await
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context("Failed to send request")?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => anyhow::bail!("API error ({}, {}): {}", status, err.code, err.error),
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_lib::PolicyRecord;
    use mockito::Server;

    #[tokio::test]
    async fn test_get_decodes_policy_list() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/policies")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": "p1", "name": "Web default", "target_workloads": ["web"]}]"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let policies: Vec<PolicyRecord> = client.get("policies").await.unwrap();

        mock.assert_async().await;
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].target_workloads, vec!["web".to_string()]);
    }

    #[tokio::test]
    async fn test_api_error_carries_code() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/jobs/j1/start")
            .with_status(409)
            .with_body(r#"{"error": "job j1 cannot move from running to running", "code": "invalid_transition"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post_empty::<serde_json::Value>("jobs/j1/start")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("409"));
        assert!(message.contains("invalid_transition"));
    }

    #[tokio::test]
    async fn test_query_parameters_are_sent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/jobs")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "3".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let jobs: Vec<serde_json::Value> = client
            .get_with_query("jobs", &[("limit", "3".to_string())])
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
