use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;

use crate::extractor::GameLog;
use crate::fields::{render_percent, round_to};
use crate::types::{CountingStats, GameRecord, SplitType, Venue};

/// The games one split is computed over, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    split: SplitType,
    games: Vec<GameRecord>,
}

impl Window {
    /// Takes the trailing `split.window_size()` games (all of them for a
    /// season window).
    pub fn new(split: SplitType, games: &[GameRecord]) -> Self {
        Self {
            split,
            games: trailing(games, split.window_size()).to_vec(),
        }
    }

    pub fn doubleheader_companion(game: GameRecord) -> Self {
        Self {
            split: SplitType::SingleGame2,
            games: vec![game],
        }
    }

    pub fn split(&self) -> SplitType {
        self.split
    }

    pub fn games(&self) -> &[GameRecord] {
        &self.games
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn most_recent(&self) -> Option<&GameRecord> {
        self.games.last()
    }

    pub fn aggregate(&self) -> AggregateResult {
        aggregate(&self.games, None)
    }

    pub fn tally(&self) -> OpponentTally {
        OpponentTally::from_games(&self.games)
    }
}

/// Every window a game log publishes. `SingleGame2` only appears when the
/// log has a doubleheader companion.
pub fn plan_windows(log: &GameLog) -> Vec<Window> {
    let mut windows = vec![
        Window::new(SplitType::Season, &log.games),
        Window::new(SplitType::Last7G, &log.games),
        Window::new(SplitType::SingleGame, &log.games),
    ];
    if let Some(companion) = &log.companion {
        windows.push(Window::doubleheader_companion(companion.clone()));
    }
    windows
}

pub fn trailing(games: &[GameRecord], size: Option<usize>) -> &[GameRecord] {
    match size {
        Some(n) if n < games.len() => &games[games.len() - n..],
        _ => games,
    }
}

/// Sums and derived rates for a window. Rates are unrounded; rounding
/// happens when a payload is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateResult {
    pub games: usize,
    pub counting: CountingStats,
    pub ba: f64,
    pub obp: f64,
    pub slg: f64,
    pub ops: f64,
    pub batting_order: u32,
    pub ali: f64,
    pub acli: f64,
    pub wpa: f64,
    pub cwpa: f64,
    pub re24: f64,
    pub dfs_dk: f64,
    pub dfs_fd: f64,
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        0.0
    } else {
        values.sum::<f64>() / n as f64
    }
}

/// Most frequent non-zero value; the lowest value wins a tie.
pub fn mode_nonzero(values: impl IntoIterator<Item = u32>) -> u32 {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for value in values.into_iter().filter(|v| *v != 0) {
        *counts.entry(value).or_default() += 1;
    }

    let mut best: Option<(u32, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value).unwrap_or(0)
}

/// Folds the trailing `size` games (all when `None`) into one result.
pub fn aggregate(games: &[GameRecord], size: Option<usize>) -> AggregateResult {
    let games = trailing(games, size);
    let c: CountingStats = games.iter().map(|g| &g.counting).sum();

    let ba = ratio(c.h, c.ab);
    let obp = ratio(c.h + c.bb + c.hbp, c.ab + c.bb + c.hbp + c.sf);
    let slg = ratio(c.slugging_bases(), c.ab);

    AggregateResult {
        games: games.len(),
        counting: c,
        ba,
        obp,
        slg,
        ops: obp + slg,
        batting_order: mode_nonzero(games.iter().map(|g| g.batting_order)),
        ali: mean(games.iter().map(|g| g.ali)),
        acli: mean(games.iter().map(|g| g.acli)),
        wpa: games.iter().map(|g| g.wpa).sum(),
        cwpa: games.iter().map(|g| g.cwpa).sum(),
        re24: games.iter().map(|g| g.re24).sum(),
        dfs_dk: games.iter().map(|g| g.dfs_dk).sum(),
        dfs_fd: games.iter().map(|g| g.dfs_fd).sum(),
    }
}

impl Display for AggregateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.counting;
        writeln!(
            f,
            "  G {}  PA {}  AB {}  R {}  H {}  2B {}  3B {}  HR {}  RBI {}  BB {}  SO {}",
            self.games, c.pa, c.ab, c.r, c.h, c.doubles, c.triples, c.hr, c.rbi, c.bb, c.so
        )?;
        writeln!(
            f,
            "  BA {:.3}  OBP {:.3}  SLG {:.3}  OPS {:.3}",
            self.ba, self.obp, self.slg, self.ops
        )?;
        write!(
            f,
            "  BOP {}  aLI {:.3}  acLI {:.3}  WPA {:.3}  cWPA {}  RE24 {:.2}",
            self.batting_order,
            self.ali,
            self.acli,
            self.wpa,
            render_percent(self.cwpa),
            self.re24
        )
    }
}

/// Away opponents and home-game count for the park-factor collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OpponentTally {
    pub away_opponents: Vec<String>,
    pub home_games: u32,
}

impl OpponentTally {
    pub fn from_games(games: &[GameRecord]) -> Self {
        let mut tally = OpponentTally::default();
        for game in games {
            match game.venue {
                Venue::Home => tally.home_games += 1,
                Venue::Away => match &game.opponent {
                    Some(opponent) => tally.away_opponents.push(opponent.clone()),
                    None => log::debug!(
                        "Away game '{}' has no opponent code, left out of tally",
                        game.date_text
                    ),
                },
            }
        }
        tally
    }

    pub fn away_games(&self) -> u32 {
        self.away_opponents.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.away_opponents.is_empty() && self.home_games == 0
    }
}

/// Rounds a rate the way every payload prints it.
pub(crate) fn rate(value: f64) -> f64 {
    round_to(value, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(ab: u32, h: u32, bb: u32, doubles: u32, hr: u32) -> GameRecord {
        GameRecord {
            date_text: "Apr 1".into(),
            counting: CountingStats {
                ab,
                h,
                bb,
                doubles,
                hr,
                pa: ab + bb,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_three_game_window() {
        let games = vec![
            game(3, 1, 1, 0, 0),
            game(4, 2, 0, 1, 1),
            game(3, 0, 1, 0, 0),
        ];

        let result = aggregate(&games, None);
        assert_eq!(result.games, 3);
        assert_eq!(result.counting.ab, 10);
        assert_eq!(result.counting.h, 3);
        assert_eq!(result.counting.bb, 2);
        assert_eq!(rate(result.ba), 0.300);
        assert_eq!(rate(result.obp), 0.417);
        assert_eq!(rate(result.slg), 0.900);
        assert_eq!(rate(result.ops), 1.317);
        assert_eq!(result.ops, result.obp + result.slg);
    }

    #[test]
    fn test_rates_come_from_sums() {
        let games = vec![game(0, 0, 0, 0, 0), game(4, 2, 0, 0, 0)];
        let result = aggregate(&games, None);
        assert_eq!(result.ba, 0.5);
    }

    #[test]
    fn test_empty_window_is_all_zero() {
        let result = aggregate(&[], None);
        assert_eq!(result, AggregateResult::default());
    }

    #[test]
    fn test_trailing_window_reports_actual_game_count() {
        let games = vec![game(3, 1, 0, 0, 0); 3];
        assert_eq!(aggregate(&games, Some(7)).games, 3);

        let games: Vec<GameRecord> = (0..10).map(|i| game(4, i % 3, 0, 0, 0)).collect();
        let result = aggregate(&games, Some(7));
        assert_eq!(result.games, 7);
        assert_eq!(result.counting.ab, 28);
        assert_eq!(
            result.counting.h,
            games[3..].iter().map(|g| g.counting.h).sum::<u32>()
        );
    }

    #[test]
    fn test_mode_nonzero() {
        assert_eq!(mode_nonzero([3, 3, 4, 0, 0, 0]), 3);
        assert_eq!(mode_nonzero([5, 2, 5, 2]), 2);
        assert_eq!(mode_nonzero([0, 0]), 0);
        assert_eq!(mode_nonzero(Vec::<u32>::new()), 0);
    }

    #[test]
    fn test_advanced_metrics() {
        let mut a = game(4, 1, 0, 0, 0);
        a.ali = 1.0;
        a.acli = 0.5;
        a.wpa = 0.125;
        a.cwpa = 0.001;
        a.batting_order = 2;
        let mut b = game(4, 1, 0, 0, 0);
        b.ali = 2.0;
        b.acli = 1.5;
        b.wpa = -0.05;
        b.cwpa = 0.0005;
        b.batting_order = 2;

        let result = aggregate(&[a, b], None);
        assert_eq!(result.ali, 1.5);
        assert_eq!(result.acli, 1.0);
        assert!((result.wpa - 0.075).abs() < 1e-12);
        assert_eq!(render_percent(result.cwpa), "0.15%");
        assert_eq!(result.batting_order, 2);
    }

    #[test]
    fn test_opponent_tally() {
        let mut away = game(4, 1, 0, 0, 0);
        away.venue = Venue::Away;
        away.opponent = Some("NYY".into());
        let mut unknown_away = away.clone();
        unknown_away.opponent = None;
        let home = game(4, 1, 0, 0, 0);

        let tally = OpponentTally::from_games(&[away, home.clone(), unknown_away, home]);
        assert_eq!(tally.away_opponents, vec!["NYY"]);
        assert_eq!(tally.home_games, 2);
        assert!(!tally.is_empty());
        assert!(OpponentTally::from_games(&[]).is_empty());
    }

    #[test]
    fn test_plan_windows() {
        let games: Vec<GameRecord> = (0..9).map(|_| game(4, 1, 0, 0, 0)).collect();
        let log = GameLog {
            games: games.clone(),
            companion: None,
        };
        let windows = plan_windows(&log);
        let splits: Vec<SplitType> = windows.iter().map(Window::split).collect();
        assert_eq!(
            splits,
            vec![SplitType::Season, SplitType::Last7G, SplitType::SingleGame]
        );
        assert_eq!(windows[0].games().len(), 9);
        assert_eq!(windows[1].games().len(), 7);
        assert_eq!(windows[2].games().len(), 1);

        let log = GameLog {
            companion: Some(games[7].clone()),
            games,
        };
        let windows = plan_windows(&log);
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[3].split(), SplitType::SingleGame2);
    }
}
