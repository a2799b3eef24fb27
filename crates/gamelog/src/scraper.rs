use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::retry::{RetryPolicy, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Page not found: {0}")]
    NotFound(String),
    #[error("Giving up on {url} after {attempts} attempt(s): {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: TransportError,
    },
}

/// Where game-log pages come from.
pub trait GameLogSource {
    fn fetch_game_log(
        &self,
        player_id: &str,
        year: i32,
    ) -> impl Future<Output = Result<String, ScraperError>> + Send;
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl WebScraper {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, ScraperError> {
        Ok(Self {
            client: crate::http_client(timeout)?,
            base_url: crate::BASE_URL.to_string(),
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn game_log_url(&self, player_id: &str, year: i32) -> String {
        format!(
            "{}/players/gl.fcgi?id={}&t=b&year={}",
            self.base_url, player_id, year
        )
    }

    async fn get_html(&self, url: &str) -> Result<String, ScraperError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    return Err(ScraperError::NotFound(url.to_string()));
                }
                Ok(response) if response.status().is_success() => {
                    return Ok(response.text().await?);
                }
                Ok(response) => TransportError::from_status(response.status()),
                Err(e) => TransportError::from(e),
            };

            match &failure {
                TransportError::Timeout => {
                    log::warn!("Timed out fetching {} (attempt {})", url, attempt)
                }
                TransportError::RateLimited => {
                    log::warn!("Rate limited fetching {} (attempt {})", url, attempt)
                }
                other => log::warn!("Fetching {} failed (attempt {}): {}", url, attempt, other),
            }

            if attempt >= self.retry.max_attempts {
                return Err(ScraperError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: failure,
                });
            }
            self.retry.backoff(attempt).await;
        }
    }
}

impl GameLogSource for WebScraper {
    async fn fetch_game_log(&self, player_id: &str, year: i32) -> Result<String, ScraperError> {
        let url = self.game_log_url(player_id, year);
        log::info!("Fetching {} game log for {}...", year, player_id);
        self.get_html(&url).await
    }
}
