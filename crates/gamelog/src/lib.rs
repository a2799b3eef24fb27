pub mod aggregate;
pub mod extractor;
pub mod fields;
pub mod locator;
pub mod park_factor;
pub mod payload;
pub mod pipeline;
pub mod retry;
pub mod scraper;
pub mod teams;
pub mod types;
pub mod upsert;

pub use aggregate::{AggregateResult, Window};
pub use locator::{TableLocator, TableNotFound};
pub use payload::{SplitPayload, SplitPayloadBuilder};
pub use pipeline::{Pipeline, PlayerRequest, RunReport};
pub use scraper::{ScraperError, WebScraper};
pub use upsert::UpsertClient;

use std::time::Duration;

pub(crate) const BASE_URL: &str = "https://www.baseball-reference.com";

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
}
