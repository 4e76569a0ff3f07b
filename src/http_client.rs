use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::{CrawlConfig, CrawlTarget};

/// Raw body of a successfully fetched document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub body: String,
}

pub struct HttpClient {
    client: Client,
    max_response_size: usize,
}

impl HttpClient {
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            max_response_size: config.max_response_size,
        })
    }

    /// One GET per call, no retry. Any failure is reported with the target's URL.
    pub async fn fetch(&self, target: &CrawlTarget) -> Result<FetchedDocument, FetchError> {
        self.fetch_document(target)
            .await
            .map_err(|cause| FetchError {
                url: target.to_string(),
                cause,
            })
    }

    async fn fetch_document(&self, target: &CrawlTarget) -> Result<FetchedDocument, FetchFailure> {
        let response = self.client.get(target.url().clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::HttpError(status.as_u16()));
        }

        if let Some(content_type) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            let content_type_str = content_type.to_str().unwrap_or("");
            if !is_html(content_type_str) {
                return Err(FetchFailure::InvalidContentType(content_type_str.to_string()));
            }
        }

        if let Some(content_length) = response.content_length()
            && content_length > self.max_response_size as u64
        {
            return Err(FetchFailure::TooLarge(content_length));
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        if body.len() > self.max_response_size {
            return Err(FetchFailure::TooLarge(body.len() as u64));
        }

        debug!(url = %target, bytes = body.len(), "fetched document");
        Ok(FetchedDocument {
            url: target.to_string(),
            final_url,
            body,
        })
    }
}

fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}

#[derive(Debug, Error)]
#[error("failed to fetch {url}: {cause}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub cause: FetchFailure,
}

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("HTTP error: {0}")]
    HttpError(u16),
    #[error("invalid content type: {0}")]
    InvalidContentType(String),
    #[error("response too large: {0} bytes")]
    TooLarge(u64),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_content_types() {
        assert!(is_html("text/html"));
        assert!(is_html("text/html; charset=UTF-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/json"));
        assert!(!is_html(""));
    }

    #[test]
    fn test_error_carries_url() {
        let err = FetchError {
            url: "https://example.com/missing".to_string(),
            cause: FetchFailure::HttpError(404),
        };

        assert_eq!(
            err.to_string(),
            "failed to fetch https://example.com/missing: HTTP error: 404"
        );
    }
}
