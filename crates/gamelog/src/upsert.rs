use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use crate::payload::SplitPayload;
use crate::retry::{RetryPolicy, TransportError};
use crate::types::SplitType;

/// Natural key of a split record. Season-level splits are also keyed by
/// year and team.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SplitKey {
    pub player_id: String,
    pub split: SplitType,
    pub year: Option<i32>,
    pub team: Option<String>,
}

impl SplitKey {
    pub fn for_payload(payload: &SplitPayload) -> Self {
        let season = payload.split.is_season_level();
        Self {
            player_id: payload.player_id.clone(),
            split: payload.split,
            year: season.then_some(payload.year),
            team: if season { payload.team.clone() } else { None },
        }
    }

    /// `year` and `team` for season-level keys, empty otherwise.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(year) = self.year {
            pairs.push(("year", year.to_string()));
        }
        if let Some(team) = &self.team {
            pairs.push(("team", team.clone()));
        }
        pairs
    }
}

impl Display for SplitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.player_id, self.split)?;
        if let Some(year) = self.year {
            write!(f, "/{}", year)?;
        }
        if let Some(team) = &self.team {
            write!(f, "/{}", team)?;
        }
        Ok(())
    }
}

/// Status and body of one API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: String,
}

impl ApiReply {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The destination split-log endpoint.
pub trait SplitLogApi {
    fn fetch(&self, key: &SplitKey)
    -> impl Future<Output = Result<ApiReply, TransportError>> + Send;

    fn create(
        &self,
        payload: &SplitPayload,
    ) -> impl Future<Output = Result<ApiReply, TransportError>> + Send;

    fn update(
        &self,
        key: &SplitKey,
        payload: &SplitPayload,
    ) -> impl Future<Output = Result<ApiReply, TransportError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ApiSetupError {
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct HttpSplitLogApi {
    client: Client,
    base_url: Url,
}

impl HttpSplitLogApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiSetupError> {
        let invalid = |reason: String| ApiSetupError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }

        Ok(Self {
            client: crate::http_client(timeout)?,
            base_url: parsed,
        })
    }

    fn url_with_segments(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `{api}/split-logs`
    pub fn collection_url(&self) -> Url {
        self.url_with_segments(&["split-logs"])
    }

    /// `{api}/split-logs/{playerId}/{split}`, plus `?year=&team=` for
    /// season-level keys. Segments and query values are percent-encoded.
    pub fn record_url(&self, key: &SplitKey) -> Url {
        let mut url =
            self.url_with_segments(&["split-logs", key.player_id.as_str(), key.split.as_str()]);
        let pairs = key.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }

    async fn reply(response: reqwest::Response) -> Result<ApiReply, TransportError> {
        let status = response.status();
        let body = response.text().await?;
        Ok(ApiReply { status, body })
    }
}

impl SplitLogApi for HttpSplitLogApi {
    async fn fetch(&self, key: &SplitKey) -> Result<ApiReply, TransportError> {
        let response = self
            .client
            .get(self.record_url(key))
            .send()
            .await?;
        Self::reply(response).await
    }

    async fn create(&self, payload: &SplitPayload) -> Result<ApiReply, TransportError> {
        let response = self
            .client
            .post(self.collection_url())
            .json(payload)
            .send()
            .await?;
        Self::reply(response).await
    }

    async fn update(
        &self,
        key: &SplitKey,
        payload: &SplitPayload,
    ) -> Result<ApiReply, TransportError> {
        let response = self
            .client
            .put(self.record_url(key))
            .json(payload)
            .send()
            .await?;
        Self::reply(response).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertAction {
    Created,
    Updated,
}

impl Display for UpsertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertAction::Created => write!(f, "created"),
            UpsertAction::Updated => write!(f, "updated"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    #[error("Giving up on {key} after {attempts} attempt(s): {last}")]
    Exhausted {
        key: String,
        attempts: u32,
        last: TransportError,
    },
    #[error("Malformed response for {key}: {reason}")]
    Malformed { key: String, reason: String },
}

enum AttemptError {
    Retry(TransportError),
    Fatal(UpsertError),
}

impl From<TransportError> for AttemptError {
    fn from(e: TransportError) -> Self {
        AttemptError::Retry(e)
    }
}

/// Existence check, then create or update. Each attempt starts over from
/// the existence check.
#[derive(Debug, Clone)]
pub struct UpsertClient<A> {
    api: A,
    retry: RetryPolicy,
}

impl<A: SplitLogApi> UpsertClient<A> {
    pub fn new(api: A, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn upsert(&self, payload: &SplitPayload) -> Result<UpsertAction, UpsertError> {
        let key = SplitKey::for_payload(payload);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match self.attempt(&key, payload).await {
                Ok(action) => {
                    log::info!("Split {} {}", key, action);
                    return Ok(action);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retry(e)) => e,
            };

            match &failure {
                TransportError::RateLimited => {
                    log::warn!("Rate limited upserting {} (attempt {})", key, attempt)
                }
                TransportError::Timeout => {
                    log::warn!("Timed out upserting {} (attempt {})", key, attempt)
                }
                other => log::warn!("Upsert of {} failed (attempt {}): {}", key, attempt, other),
            }

            if attempt >= self.retry.max_attempts {
                return Err(UpsertError::Exhausted {
                    key: key.to_string(),
                    attempts: attempt,
                    last: failure,
                });
            }
            self.retry.backoff(attempt).await;
        }
    }

    async fn attempt(
        &self,
        key: &SplitKey,
        payload: &SplitPayload,
    ) -> Result<UpsertAction, AttemptError> {
        let existing = self.api.fetch(key).await?;
        let action = match existing.status {
            StatusCode::OK => {
                check_record(&existing.body).map_err(|reason| {
                    AttemptError::Fatal(UpsertError::Malformed {
                        key: key.to_string(),
                        reason,
                    })
                })?;
                UpsertAction::Updated
            }
            StatusCode::NOT_FOUND => UpsertAction::Created,
            status => return Err(TransportError::from_status(status).into()),
        };

        let written = match action {
            UpsertAction::Created => self.api.create(payload).await?,
            UpsertAction::Updated => self.api.update(key, payload).await?,
        };
        if !written.status.is_success() {
            return Err(TransportError::from_status(written.status).into());
        }
        Ok(action)
    }
}

/// An existing record must at least be a JSON object.
fn check_record(body: &str) -> Result<(), String> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(other) => Err(format!("expected a JSON object, got {}", other)),
        Err(e) => Err(e.to_string()),
    }
}
