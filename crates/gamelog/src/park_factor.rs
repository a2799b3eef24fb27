//! Client for the park-factor normalization service. The service is
//! consumed as-is; nothing here computes park factors.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::retry::{RetryPolicy, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ParkFactorError {
    #[error("Normalization request failed after {attempts} attempt(s): {last}")]
    Transport {
        attempts: u32,
        last: TransportError,
    },
    #[error("Normalization service answered {0}")]
    Status(StatusCode),
    #[error("Malformed normalization response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeRequest {
    pub player_id: String,
    pub opponent_team_codes: Vec<String>,
    pub home_games: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkFactors {
    pub total_park_factor: f64,
    pub home_park_factor: f64,
    pub avg_away_park_factor: f64,
}

pub trait ParkFactorSource {
    fn normalize(
        &self,
        request: &NormalizeRequest,
    ) -> impl Future<Output = Result<ParkFactors, ParkFactorError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpParkFactorClient {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpParkFactorClient {
    pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: crate::http_client(timeout)?,
            url: url.to_string(),
            retry,
        })
    }
}

pub fn parse_park_factors(body: &str) -> Result<ParkFactors, ParkFactorError> {
    serde_json::from_str(body).map_err(|e| ParkFactorError::Malformed(e.to_string()))
}

impl ParkFactorSource for HttpParkFactorClient {
    async fn normalize(&self, request: &NormalizeRequest) -> Result<ParkFactors, ParkFactorError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            log::debug!(
                "Normalizing park factors for {} ({} away, {} home)",
                request.player_id,
                request.opponent_team_codes.len(),
                request.home_games
            );

            let failure = match self.client.post(&self.url).json(request).send().await {
                Ok(response) if response.status().is_success() => {
                    let body = response.text().await.map_err(|e| {
                        ParkFactorError::Malformed(format!("unreadable body: {e}"))
                    })?;
                    return parse_park_factors(&body);
                }
                Ok(response)
                    if response.status() == StatusCode::TOO_MANY_REQUESTS
                        || response.status().is_server_error() =>
                {
                    let e = TransportError::from_status(response.status());
                    if e == TransportError::RateLimited {
                        log::warn!("Normalization service rate limited (attempt {})", attempt);
                    } else {
                        log::warn!("Normalization service failed (attempt {}): {}", attempt, e);
                    }
                    e
                }
                Ok(response) => return Err(ParkFactorError::Status(response.status())),
                Err(e) => {
                    let e = TransportError::from(e);
                    log::warn!("Normalization request failed (attempt {}): {}", attempt, e);
                    e
                }
            };

            if attempt >= self.retry.max_attempts {
                return Err(ParkFactorError::Transport {
                    attempts: attempt,
                    last: failure,
                });
            }
            self.retry.backoff(attempt).await;
        }
    }
}
