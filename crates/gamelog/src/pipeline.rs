//! Drives one player at a time from fetched page to published splits.
//!
//! Every (player, split) pair is an independent unit: a failure is logged
//! and counted, and the batch moves on.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use scraper::Html;
use serde::Serialize;

use crate::aggregate::{Window, plan_windows};
use crate::extractor::{FieldExtractor, GameLog, extract_game_log};
use crate::locator::{TableLocator, TableNotFound};
use crate::park_factor::{ParkFactorError, ParkFactorSource};
use crate::payload::{BuildError, SplitPayloadBuilder};
use crate::retry::Pacing;
use crate::scraper::{GameLogSource, ScraperError};
use crate::types::SplitType;
use crate::upsert::{SplitLogApi, UpsertAction, UpsertClient, UpsertError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRequest {
    pub player_id: String,
    pub year: i32,
    /// Team recorded on the season split; defaults to the most recent
    /// game's team.
    pub team: Option<String>,
}

impl PlayerRequest {
    pub fn new(player_id: &str, year: i32) -> Self {
        Self {
            player_id: player_id.to_string(),
            year,
            team: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    ParkFactor(#[from] ParkFactorError),
    #[error(transparent)]
    Upsert(#[from] UpsertError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum UnitStatus {
    Published(UpsertAction),
    Skipped(String),
    Failed(String),
}

/// What happened to one unit. `split` is `None` when the player failed
/// before any window was planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    pub player_id: String,
    pub split: Option<SplitType>,
    pub status: UnitStatus,
}

impl Display for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let split = self.split.map(|s| s.as_str()).unwrap_or("-");
        match &self.status {
            UnitStatus::Published(action) => {
                write!(f, "{:<12} {:<12} {}", self.player_id, split, action)
            }
            UnitStatus::Skipped(reason) => {
                write!(f, "{:<12} {:<12} skipped: {}", self.player_id, split, reason)
            }
            UnitStatus::Failed(reason) => {
                write!(f, "{:<12} {:<12} FAILED: {}", self.player_id, split, reason)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<UnitOutcome>,
}

impl RunReport {
    pub fn record(&mut self, player_id: &str, split: Option<SplitType>, status: UnitStatus) {
        match &status {
            UnitStatus::Published(_) => self.succeeded += 1,
            UnitStatus::Skipped(reason) => {
                log::info!(
                    "Skipping {} {}: {}",
                    player_id,
                    split.map(|s| s.as_str()).unwrap_or("player"),
                    reason
                );
                self.skipped += 1
            }
            UnitStatus::Failed(reason) => {
                log::error!(
                    "Failed {} {}: {}",
                    player_id,
                    split.map(|s| s.as_str()).unwrap_or("player"),
                    reason
                );
                self.failed += 1
            }
        }
        self.outcomes.push(UnitOutcome {
            player_id: player_id.to_string(),
            split,
            status,
        });
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome)?;
        }
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        writeln!(f, "  Succeeded: {}", self.succeeded)?;
        writeln!(f, "  Skipped:   {}", self.skipped)?;
        writeln!(f, "  Failed:    {}", self.failed)
    }
}

/// Finds the game-log table in a page and turns it into games.
#[derive(Debug, Clone, Default)]
pub struct GameLogReader {
    locator: TableLocator,
    extractor: FieldExtractor,
}

impl GameLogReader {
    pub fn new(locator: TableLocator, extractor: FieldExtractor) -> Self {
        Self { locator, extractor }
    }

    pub fn read(&self, html: &str) -> Result<GameLog, TableNotFound> {
        let document = Html::parse_document(html);
        let table = self.locator.locate(&document)?;
        log::debug!(
            "Table located via {:?} '{}' with {} row(s)",
            table.strategy,
            table.matched,
            table.rows.len()
        );
        Ok(extract_game_log(&table.rows, &self.extractor))
    }

    /// Every window the page would publish.
    pub fn windows(&self, html: &str) -> Result<Vec<Window>, TableNotFound> {
        Ok(plan_windows(&self.read(html)?))
    }
}

pub struct Pipeline<P, A> {
    reader: GameLogReader,
    park: P,
    upsert: UpsertClient<A>,
}

impl<P: ParkFactorSource, A: SplitLogApi> Pipeline<P, A> {
    pub fn new(park: P, upsert: UpsertClient<A>) -> Self {
        Self {
            reader: GameLogReader::default(),
            park,
            upsert,
        }
    }

    pub fn with_reader(mut self, reader: GameLogReader) -> Self {
        self.reader = reader;
        self
    }

    /// Fetches and publishes every player in turn, pausing between them.
    pub async fn run<S: GameLogSource>(
        &self,
        source: &S,
        players: &[PlayerRequest],
        pacing: Pacing,
    ) -> RunReport {
        let mut report = RunReport::default();

        for (i, request) in players.iter().enumerate() {
            if i > 0 {
                pacing.wait().await;
            }

            let html = match source.fetch_game_log(&request.player_id, request.year).await {
                Ok(html) => html,
                Err(ScraperError::NotFound(url)) => {
                    report.record(
                        &request.player_id,
                        None,
                        UnitStatus::Skipped(format!("no game-log page at {}", url)),
                    );
                    continue;
                }
                Err(e) => {
                    report.record(&request.player_id, None, UnitStatus::Failed(e.to_string()));
                    continue;
                }
            };

            self.process_document(request, &html, Utc::now(), &mut report)
                .await;
        }

        log::info!(
            "Run finished: {} succeeded, {} skipped, {} failed",
            report.succeeded,
            report.skipped,
            report.failed
        );
        report
    }

    /// Publishes every split of one fetched page into `report`.
    pub async fn process_document(
        &self,
        request: &PlayerRequest,
        html: &str,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        let log = match self.reader.read(html) {
            Ok(log) => log,
            Err(e) => {
                report.record(&request.player_id, None, UnitStatus::Skipped(e.to_string()));
                return;
            }
        };
        if log.games.is_empty() {
            report.record(
                &request.player_id,
                None,
                UnitStatus::Skipped("table has no game rows".to_string()),
            );
            return;
        }

        let builder = SplitPayloadBuilder::new(&request.player_id, request.year, now)
            .with_team(request.team.clone());

        for window in plan_windows(&log) {
            let status = match self.publish(&builder, &window).await {
                Ok(action) => UnitStatus::Published(action),
                Err(UnitError::Build(e)) => UnitStatus::Skipped(e.to_string()),
                Err(e) => UnitStatus::Failed(e.to_string()),
            };
            report.record(&request.player_id, Some(window.split()), status);
        }
    }

    async fn publish(
        &self,
        builder: &SplitPayloadBuilder,
        window: &Window,
    ) -> Result<UpsertAction, UnitError> {
        let request = builder.normalize_request(window)?;
        let factors = self.park.normalize(&request).await?;
        let payload = builder.build(window, &factors)?;
        Ok(self.upsert.upsert(&payload).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::park_factor::{NormalizeRequest, ParkFactors};
    use crate::payload::SplitPayload;
    use crate::retry::{RetryPolicy, TransportError};
    use crate::upsert::{ApiReply, SplitKey};
    use chrono::TimeZone;
    use reqwest::StatusCode;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FixedParkFactors {
        requests: Mutex<Vec<NormalizeRequest>>,
    }

    impl ParkFactorSource for FixedParkFactors {
        async fn normalize(
            &self,
            request: &NormalizeRequest,
        ) -> Result<ParkFactors, ParkFactorError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ParkFactors {
                total_park_factor: 100.5,
                home_park_factor: 102.0,
                avg_away_park_factor: 99.0,
            })
        }
    }

    /// Every record is new; writes for `failing_split` always time out.
    #[derive(Default)]
    struct MemoryApi {
        failing_split: Option<SplitType>,
        created: Mutex<Vec<SplitPayload>>,
    }

    impl SplitLogApi for MemoryApi {
        async fn fetch(&self, key: &SplitKey) -> Result<ApiReply, TransportError> {
            if Some(key.split) == self.failing_split {
                return Err(TransportError::Timeout);
            }
            Ok(ApiReply::new(StatusCode::NOT_FOUND, ""))
        }

        async fn create(&self, payload: &SplitPayload) -> Result<ApiReply, TransportError> {
            self.created.lock().unwrap().push(payload.clone());
            Ok(ApiReply::new(StatusCode::CREATED, "{}"))
        }

        async fn update(
            &self,
            _key: &SplitKey,
            _payload: &SplitPayload,
        ) -> Result<ApiReply, TransportError> {
            Ok(ApiReply::new(StatusCode::OK, "{}"))
        }
    }

    struct PagesByPlayer(Vec<(&'static str, Result<String, &'static str>)>);

    impl GameLogSource for PagesByPlayer {
        async fn fetch_game_log(&self, player_id: &str, _year: i32) -> Result<String, ScraperError> {
            match self.0.iter().find(|(id, _)| *id == player_id) {
                Some((_, Ok(html))) => Ok(html.clone()),
                Some((_, Err(reason))) => Err(ScraperError::Exhausted {
                    url: player_id.to_string(),
                    attempts: 3,
                    last: TransportError::Other(reason.to_string()),
                }),
                None => Err(ScraperError::NotFound(player_id.to_string())),
            }
        }
    }

    fn pipeline(api: MemoryApi) -> Pipeline<FixedParkFactors, MemoryApi> {
        Pipeline::new(
            FixedParkFactors::default(),
            UpsertClient::new(api, RetryPolicy::new(2, Duration::ZERO)),
        )
    }

    fn fixture() -> String {
        fs::read_to_string("fixtures/batting_gamelog.html").expect("Failed to read fixture")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 13, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_read_fixture_game_log() {
        let log = GameLogReader::default().read(&fixture()).expect("game log");
        assert_eq!(log.games.len(), 9);
        assert_eq!(log.games[0].date_text, "Mar 27");
        assert_eq!(log.games[3].opponent.as_deref(), Some("ARI"));
        assert!(log.games[3].is_away());
        assert!(!log.games[0].is_away());
        assert_eq!(log.games[2].wpa, -0.112);
        assert_eq!(
            log.companion.as_ref().map(|g| g.date_text.as_str()),
            Some("Apr 12 (1)")
        );
    }

    #[test]
    fn test_windows_from_fixture() {
        let windows = GameLogReader::default().windows(&fixture()).expect("windows");
        let sizes: Vec<(SplitType, usize)> =
            windows.iter().map(|w| (w.split(), w.games().len())).collect();
        assert_eq!(
            sizes,
            vec![
                (SplitType::Season, 9),
                (SplitType::Last7G, 7),
                (SplitType::SingleGame, 1),
                (SplitType::SingleGame2, 1),
            ]
        );

        let season = windows[0].aggregate();
        assert_eq!(season.counting.ab, 33);
        assert_eq!(season.counting.h, 10);
        assert_eq!(season.counting.hr, 3);
        assert_eq!(season.batting_order, 2);

        let last7 = windows[1].aggregate();
        assert_eq!(last7.counting.ab, 26);
        assert_eq!(last7.counting.h, 7);
    }

    #[tokio::test]
    async fn test_publishes_every_split_of_a_page() {
        let pipeline = pipeline(MemoryApi::default());
        let mut report = RunReport::default();
        let request = PlayerRequest::new("judgeaa01", 2025);

        pipeline
            .process_document(&request, &fixture(), now(), &mut report)
            .await;

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 0);
        assert!(!report.has_failures());

        let requests = pipeline.park.requests.lock().unwrap();
        assert_eq!(requests[0].opponent_team_codes, vec!["ARI", "ARI", "ARI", "PIT"]);
        assert_eq!(requests[0].home_games, 5);

        let created = pipeline.upsert.api().created.lock().unwrap();
        let season = created
            .iter()
            .find(|p| p.split == SplitType::Season)
            .expect("season payload");
        assert_eq!(season.team.as_deref(), Some("NYY"));
        assert_eq!(season.home_games, 5);
        assert_eq!(season.away_games, 4);
        assert_eq!(season.split_park_factor, 100.5);

        let second = created
            .iter()
            .find(|p| p.split == SplitType::SingleGame2)
            .expect("second game payload");
        assert_eq!(second.ab, 4);
        assert_eq!(second.home_games, 1);
        assert_eq!(second.away_games, 0);
    }

    #[tokio::test]
    async fn test_missing_table_is_skipped() {
        let pipeline = pipeline(MemoryApi::default());
        let mut report = RunReport::default();
        let request = PlayerRequest::new("nobody01", 2025);

        pipeline
            .process_document(
                &request,
                "<html><body><p>No games</p></body></html>",
                now(),
                &mut report,
            )
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.succeeded, 0);
        assert!(!report.has_failures());
        assert_eq!(report.outcomes[0].split, None);
    }

    #[tokio::test]
    async fn test_split_without_valid_data_is_never_published() {
        let html = r#"
            <div id="div_batting_gamelogs">
                <table>
                    <thead><tr><th>Rk</th><th>Date</th><th>Tm</th><th></th><th>Opp</th></tr></thead>
                    <tbody><tr>
                        <th data-stat="ranker">1</th>
                        <td data-stat="date_game">Apr 2</td>
                        <td data-stat="team_ID">NYY</td>
                        <td data-stat="team_homeORaway">@</td>
                        <td data-stat="opp_ID">XYZ</td>
                        <td data-stat="AB">4</td>
                        <td data-stat="H">1</td>
                    </tr></tbody>
                </table>
            </div>
        "#;
        let pipeline = pipeline(MemoryApi::default());
        let mut report = RunReport::default();
        let request = PlayerRequest::new("judgeaa01", 2025);

        pipeline
            .process_document(&request, html, now(), &mut report)
            .await;

        assert_eq!(report.skipped, 3);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 0);
        assert!(pipeline.park.requests.lock().unwrap().is_empty());
        assert!(pipeline.upsert.api().created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_split_does_not_stop_the_batch() {
        let pipeline = pipeline(MemoryApi {
            failing_split: Some(SplitType::Last7G),
            ..Default::default()
        });
        let source = PagesByPlayer(vec![
            ("broken01", Err("connection reset")),
            ("judgeaa01", Ok(fixture())),
        ]);
        let players = vec![
            PlayerRequest::new("broken01", 2025),
            PlayerRequest::new("missing01", 2025),
            PlayerRequest::new("judgeaa01", 2025),
        ];

        let report = pipeline.run(&source, &players, Pacing::none()).await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 2);
        assert!(report.has_failures());

        let failed: Vec<(&str, Option<SplitType>)> = report
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, UnitStatus::Failed(_)))
            .map(|o| (o.player_id.as_str(), o.split))
            .collect();
        assert_eq!(
            failed,
            vec![("broken01", None), ("judgeaa01", Some(SplitType::Last7G))]
        );
        assert!(report.to_string().contains("Failed:    2"));
    }
}
