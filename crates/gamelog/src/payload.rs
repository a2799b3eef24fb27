use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{OpponentTally, Window, rate};
use crate::extractor::game_day;
use crate::fields::{render_percent, round_to};
use crate::park_factor::{NormalizeRequest, ParkFactors};
use crate::types::{SplitType, Venue};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No valid data for {split} split (no home games and no away opponents)")]
    NoValidData { split: SplitType },
}

/// The record the destination API stores for one (player, split). Field
/// names are the API's, hence the explicit renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitPayload {
    pub player_id: String,
    pub split: SplitType,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub team: Option<String>,
    pub date: NaiveDate,
    pub date_updated: DateTime<Utc>,
    pub games: u32,
    pub pa: u32,
    pub ab: u32,
    pub r: u32,
    pub h: u32,
    pub doubles: u32,
    pub triples: u32,
    pub hr: u32,
    pub rbi: u32,
    pub bb: u32,
    pub ibb: u32,
    pub so: u32,
    pub hbp: u32,
    pub sh: u32,
    pub sf: u32,
    pub roe: u32,
    pub gdp: u32,
    pub sb: u32,
    pub cs: u32,
    pub ba: f64,
    pub obp: f64,
    pub slg: f64,
    pub ops: f64,
    pub wpa: f64,
    #[serde(rename = "cWPA")]
    pub cwpa: String,
    #[serde(rename = "rE24")]
    pub re24: f64,
    #[serde(rename = "aLI")]
    pub ali: f64,
    #[serde(rename = "acLI")]
    pub acli: f64,
    pub dfs_dk: f64,
    pub dfs_fd: f64,
    pub batting_order_position: u32,
    pub home_games: u32,
    pub away_games: u32,
    pub opponents: Vec<String>,
    pub split_park_factor: f64,
    pub home_park_factor: f64,
    pub away_park_factor_avg: f64,
}

/// Parses a game-log date cell (`"Mar 29"`, `"Jul 4 (1)"`, `"2025-03-29"`)
/// into a date in `year`.
pub fn parse_game_date(date_text: &str, year: i32) -> Option<NaiveDate> {
    let base = game_day(date_text);

    if let Ok(date) = NaiveDate::parse_from_str(&base, "%Y-%m-%d") {
        return Some(date);
    }
    let with_year = format!("{} {}", base, year);
    NaiveDate::parse_from_str(&with_year, "%b %d %Y")
        .or_else(|_| NaiveDate::parse_from_str(&with_year, "%B %d %Y"))
        .ok()
}

/// Builds payloads for one player. Holds the run's clock so two builds
/// from the same window serialize identically.
#[derive(Debug, Clone)]
pub struct SplitPayloadBuilder {
    player_id: String,
    year: i32,
    team: Option<String>,
    today: NaiveDate,
    updated_at: DateTime<Utc>,
}

impl SplitPayloadBuilder {
    pub fn new(player_id: &str, year: i32, now: DateTime<Utc>) -> Self {
        Self {
            player_id: player_id.to_string(),
            year,
            team: None,
            today: now.date_naive(),
            updated_at: now,
        }
    }

    pub fn with_team(mut self, team: Option<String>) -> Self {
        self.team = team;
        self
    }

    /// The tally for `window`, or `NoValidData` when there is nothing to
    /// publish.
    pub fn tally(&self, window: &Window) -> Result<OpponentTally, BuildError> {
        let tally = window.tally();
        if tally.is_empty() {
            return Err(BuildError::NoValidData {
                split: window.split(),
            });
        }
        Ok(tally)
    }

    pub fn normalize_request(&self, window: &Window) -> Result<NormalizeRequest, BuildError> {
        let tally = self.tally(window)?;
        Ok(NormalizeRequest {
            player_id: self.player_id.clone(),
            opponent_team_codes: tally.away_opponents,
            home_games: tally.home_games,
        })
    }

    pub fn build(&self, window: &Window, park: &ParkFactors) -> Result<SplitPayload, BuildError> {
        let tally = self.tally(window)?;
        let result = window.aggregate();
        let split = window.split();
        let c = result.counting;

        let (home_games, away_games) = if split.is_single_game() {
            match window.most_recent().map(|g| g.venue) {
                Some(Venue::Away) => (0, 1),
                _ => (1, 0),
            }
        } else {
            (tally.home_games, tally.away_games())
        };

        let leverage_places = if split.is_single_game() { 3 } else { 8 };

        let team = self
            .team
            .clone()
            .or_else(|| window.most_recent().and_then(|g| g.team.clone()));

        Ok(SplitPayload {
            player_id: self.player_id.clone(),
            split,
            year: self.year,
            team: split.is_season_level().then_some(team).flatten(),
            date: self.game_date(window),
            date_updated: self.updated_at,
            games: result.games as u32,
            pa: c.pa,
            ab: c.ab,
            r: c.r,
            h: c.h,
            doubles: c.doubles,
            triples: c.triples,
            hr: c.hr,
            rbi: c.rbi,
            bb: c.bb,
            ibb: c.ibb,
            so: c.so,
            hbp: c.hbp,
            sh: c.sh,
            sf: c.sf,
            roe: c.roe,
            gdp: c.gdp,
            sb: c.sb,
            cs: c.cs,
            ba: rate(result.ba),
            obp: rate(result.obp),
            slg: rate(result.slg),
            ops: rate(result.ops),
            wpa: round_to(result.wpa, 3),
            cwpa: render_percent(result.cwpa),
            re24: round_to(result.re24, 2),
            ali: round_to(result.ali, leverage_places),
            acli: round_to(result.acli, leverage_places),
            dfs_dk: round_to(result.dfs_dk, 1),
            dfs_fd: round_to(result.dfs_fd, 1),
            batting_order_position: result.batting_order,
            home_games,
            away_games,
            opponents: tally.away_opponents,
            split_park_factor: park.total_park_factor,
            home_park_factor: park.home_park_factor,
            away_park_factor_avg: park.avg_away_park_factor,
        })
    }

    fn game_date(&self, window: &Window) -> NaiveDate {
        let Some(game) = window.most_recent() else {
            return self.today;
        };
        parse_game_date(&game.date_text, self.today.year()).unwrap_or_else(|| {
            log::warn!(
                "Unparsable game date '{}', using {}",
                game.date_text,
                self.today
            );
            self.today
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::plan_windows;
    use crate::extractor::{GameLog, game_number};
    use crate::types::{CountingStats, GameRecord};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn game(date: &str, venue: Venue, opponent: &str, ab: u32, h: u32) -> GameRecord {
        GameRecord {
            date_text: date.into(),
            team: Some("NYY".into()),
            opponent: Some(opponent.into()),
            venue,
            counting: CountingStats {
                pa: ab,
                ab,
                h,
                ..Default::default()
            },
            batting_order: 2,
            ali: 1.234_567_891_2,
            cwpa: 0.0125,
            ..Default::default()
        }
    }

    fn park() -> ParkFactors {
        ParkFactors {
            total_park_factor: 101.0,
            home_park_factor: 103.5,
            avg_away_park_factor: 98.75,
        }
    }

    #[test]
    fn test_parse_game_date() {
        assert_eq!(
            parse_game_date("Mar 29", 2025),
            NaiveDate::from_ymd_opt(2025, 3, 29)
        );
        assert_eq!(
            parse_game_date("Jul 4 (1)", 2025),
            NaiveDate::from_ymd_opt(2025, 7, 4)
        );
        assert_eq!(
            parse_game_date("Sep 3(2)", 2024),
            NaiveDate::from_ymd_opt(2024, 9, 3)
        );
        assert_eq!(
            parse_game_date("2023-08-15", 2025),
            NaiveDate::from_ymd_opt(2023, 8, 15)
        );
        assert_eq!(parse_game_date("Totals", 2025), None);
    }

    #[test]
    fn test_wire_field_names() {
        let window = Window::new(
            SplitType::Season,
            &[game("Mar 29", Venue::Home, "BOS", 4, 1)],
        );
        let payload = SplitPayloadBuilder::new("judgeaa01", 2025, now())
            .with_team(Some("NYY".into()))
            .build(&window, &park())
            .unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        let object = json.as_object().unwrap();

        for key in [
            "playerId",
            "split",
            "dateUpdated",
            "doubles",
            "triples",
            "cWPA",
            "rE24",
            "aLI",
            "acLI",
            "battingOrderPosition",
            "homeGames",
            "awayGames",
            "splitParkFactor",
            "homeParkFactor",
            "awayParkFactorAvg",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(json["split"], "Season");
        assert_eq!(json["date"], "2025-03-29");
        assert_eq!(json["cWPA"], "1.25%");
        assert_eq!(json["team"], "NYY");
        assert_eq!(json["aLI"], 1.23456789);
    }

    #[test]
    fn test_season_counts_every_home_game() {
        let games = vec![
            game("Apr 1", Venue::Home, "BOS", 4, 1),
            game("Apr 2", Venue::Home, "BOS", 4, 2),
            game("Apr 4", Venue::Away, "TOR", 3, 0),
        ];
        let window = Window::new(SplitType::Season, &games);
        let payload = SplitPayloadBuilder::new("judgeaa01", 2025, now())
            .build(&window, &park())
            .unwrap();

        assert_eq!(payload.home_games, 2);
        assert_eq!(payload.away_games, 1);
        assert_eq!(payload.opponents, vec!["TOR"]);
        assert_eq!(payload.games, 3);
        assert_eq!(payload.ba, 0.273);
        assert_eq!(payload.date, NaiveDate::from_ymd_opt(2025, 4, 4).unwrap());
        assert_eq!(payload.split_park_factor, 101.0);
        assert_eq!(payload.home_park_factor, 103.5);
        assert_eq!(payload.away_park_factor_avg, 98.75);
    }

    #[test]
    fn test_single_game_is_one_or_the_other() {
        let games = vec![
            game("Apr 1", Venue::Home, "BOS", 4, 1),
            game("Apr 2", Venue::Away, "BOS", 4, 2),
        ];
        let builder = SplitPayloadBuilder::new("judgeaa01", 2025, now());
        let payload = builder
            .build(&Window::new(SplitType::SingleGame, &games), &park())
            .unwrap();
        assert_eq!((payload.home_games, payload.away_games), (0, 1));
        assert_eq!(payload.games, 1);
        assert_eq!(payload.ali, 1.235);
        assert!(payload.team.is_none());

        let payload = builder
            .build(&Window::new(SplitType::SingleGame, &games[..1]), &park())
            .unwrap();
        assert_eq!((payload.home_games, payload.away_games), (1, 0));
    }

    #[test]
    fn test_empty_window_has_no_valid_data() {
        let window = Window::new(SplitType::Last7G, &[]);
        let builder = SplitPayloadBuilder::new("judgeaa01", 2025, now());

        let err = builder.build(&window, &park()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::NoValidData {
                split: SplitType::Last7G
            }
        ));
        assert!(builder.normalize_request(&window).is_err());
    }

    #[test]
    fn test_build_is_idempotent() {
        let games = vec![
            game("Apr 1", Venue::Home, "BOS", 4, 1),
            game("Apr 2", Venue::Away, "TOR", 4, 2),
        ];
        let window = Window::new(SplitType::Last7G, &games);
        let builder = SplitPayloadBuilder::new("judgeaa01", 2025, now());

        let first = serde_json::to_string(&builder.build(&window, &park()).unwrap()).unwrap();
        let second = serde_json::to_string(&builder.build(&window, &park()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unparsable_date_falls_back_to_today() {
        let window = Window::new(
            SplitType::SingleGame,
            &[game("Opening Day", Venue::Home, "BOS", 4, 1)],
        );
        let payload = SplitPayloadBuilder::new("judgeaa01", 2025, now())
            .build(&window, &park())
            .unwrap();
        assert_eq!(payload.date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    }

    #[test]
    fn test_doubleheader_produces_second_single_game() {
        let games = vec![
            game("Jul 3", Venue::Home, "BOS", 4, 1),
            game("Jul 4", Venue::Away, "TOR", 4, 2),
            game("Jul 4 (1)", Venue::Away, "TOR", 3, 0),
        ];
        let companion = game_number(&games[2].date_text).map(|_| games[1].clone());
        let log = GameLog { games, companion };
        let builder = SplitPayloadBuilder::new("judgeaa01", 2025, now());

        let splits: Vec<SplitType> = plan_windows(&log)
            .iter()
            .map(|w| builder.build(w, &park()).unwrap().split)
            .collect();
        assert!(splits.contains(&SplitType::SingleGame));
        assert!(splits.contains(&SplitType::SingleGame2));

        let plain = GameLog {
            games: log.games[..2].to_vec(),
            companion: None,
        };
        let splits: Vec<SplitType> = plan_windows(&plain).iter().map(Window::split).collect();
        assert!(splits.contains(&SplitType::SingleGame));
        assert!(!splits.contains(&SplitType::SingleGame2));
    }
}
