use super::request::{InterceptedRequest, InterceptedResponse, ResponseType};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<InterceptedResponse, FetchError>;
}

/// reqwest によるネットワークフェッチ。
///
/// アプリのオリジンと同じレスポンスは `Basic`、それ以外は `Cors` として扱う。
pub struct ReqwestFetcher {
    client: Client,
    origin: Url,
}

impl ReqwestFetcher {
    pub fn new(origin: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::from)?;
        Ok(Self { client, origin })
    }

    fn response_type_for(&self, url: &Url) -> ResponseType {
        if url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<InterceptedResponse, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let status = response.status();
        let response_type = self.response_type_for(response.url());
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(InterceptedResponse {
            status,
            response_type,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_origin_responses_are_basic() {
        let fetcher = ReqwestFetcher::new(
            Url::parse("http://localhost:3000").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();

        let local = Url::parse("http://localhost:3000/index.html").unwrap();
        let cdn = Url::parse("https://cdn.example.com/lib.js").unwrap();
        assert_eq!(fetcher.response_type_for(&local), ResponseType::Basic);
        assert_eq!(fetcher.response_type_for(&cdn), ResponseType::Cors);
    }
}
