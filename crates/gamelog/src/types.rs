use std::fmt::Display;
use std::iter::Sum;
use std::ops::AddAssign;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Invalid split '{0}'. Accepted values: 'Season', 'Last7G', 'SingleGame', 'SingleGame2'")]
pub struct SplitParseError(String);

/// The aggregation windows published as distinct records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SplitType {
    Season,
    Last7G,
    SingleGame,
    SingleGame2,
}

impl SplitType {
    pub const ALL: [SplitType; 4] = [
        SplitType::Season,
        SplitType::Last7G,
        SplitType::SingleGame,
        SplitType::SingleGame2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitType::Season => "Season",
            SplitType::Last7G => "Last7G",
            SplitType::SingleGame => "SingleGame",
            SplitType::SingleGame2 => "SingleGame2",
        }
    }

    /// Maximum number of games folded into this split; `None` is unbounded.
    pub fn window_size(&self) -> Option<usize> {
        match self {
            SplitType::Season => None,
            SplitType::Last7G => Some(7),
            SplitType::SingleGame | SplitType::SingleGame2 => Some(1),
        }
    }

    pub fn is_single_game(&self) -> bool {
        matches!(self, SplitType::SingleGame | SplitType::SingleGame2)
    }

    /// Season-level records are additionally keyed by year and team.
    pub fn is_season_level(&self) -> bool {
        matches!(self, SplitType::Season)
    }
}

impl FromStr for SplitType {
    type Err = SplitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Season" | "season" => Ok(SplitType::Season),
            "Last7G" | "last7g" => Ok(SplitType::Last7G),
            "SingleGame" | "singlegame" => Ok(SplitType::SingleGame),
            "SingleGame2" | "singlegame2" => Ok(SplitType::SingleGame2),
            _ => Err(SplitParseError(s.to_string())),
        }
    }
}

impl Display for SplitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    #[default]
    Home,
    Away,
}

/// Per-game counting statistics. Absent source values are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingStats {
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
}

impl CountingStats {
    /// Slugging numerator as the published records define it:
    /// `H + 2×2B + 3×3B + 4×HR`.
    pub fn slugging_bases(&self) -> u32 {
        self.h
            .saturating_add(self.doubles.saturating_mul(2))
            .saturating_add(self.triples.saturating_mul(3))
            .saturating_add(self.hr.saturating_mul(4))
    }
}

impl AddAssign<&CountingStats> for CountingStats {
    fn add_assign(&mut self, other: &CountingStats) {
        self.pa = self.pa.saturating_add(other.pa);
        self.ab = self.ab.saturating_add(other.ab);
        self.r = self.r.saturating_add(other.r);
        self.h = self.h.saturating_add(other.h);
        self.doubles = self.doubles.saturating_add(other.doubles);
        self.triples = self.triples.saturating_add(other.triples);
        self.hr = self.hr.saturating_add(other.hr);
        self.rbi = self.rbi.saturating_add(other.rbi);
        self.bb = self.bb.saturating_add(other.bb);
        self.ibb = self.ibb.saturating_add(other.ibb);
        self.so = self.so.saturating_add(other.so);
        self.hbp = self.hbp.saturating_add(other.hbp);
        self.sh = self.sh.saturating_add(other.sh);
        self.sf = self.sf.saturating_add(other.sf);
        self.roe = self.roe.saturating_add(other.roe);
        self.gdp = self.gdp.saturating_add(other.gdp);
        self.sb = self.sb.saturating_add(other.sb);
        self.cs = self.cs.saturating_add(other.cs);
    }
}

impl<'a> Sum<&'a CountingStats> for CountingStats {
    fn sum<I: Iterator<Item = &'a CountingStats>>(iter: I) -> Self {
        iter.fold(CountingStats::default(), |mut acc, stats| {
            acc += stats;
            acc
        })
    }
}

/// One game, normalized across every source schema variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Date cell exactly as the table shows it, e.g. `"Jul 4 (1)"`.
    pub date_text: String,
    pub team: Option<String>,
    pub opponent: Option<String>,
    pub venue: Venue,
    pub counting: CountingStats,
    pub batting_order: u32,
    pub wpa: f64,
    /// Championship WPA as a decimal (`0.0125` for `"1.25%"`).
    pub cwpa: f64,
    pub re24: f64,
    pub ali: f64,
    pub acli: f64,
    pub dfs_dk: f64,
    pub dfs_fd: f64,
}

impl GameRecord {
    pub fn is_away(&self) -> bool {
        self.venue == Venue::Away
    }
}

impl Display for GameRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let at = if self.is_away() { "@" } else { "vs" };
        write!(
            f,
            "{} {} {} - {}-for-{}",
            self.date_text,
            at,
            self.opponent.as_deref().unwrap_or("???"),
            self.counting.h,
            self.counting.ab
        )?;
        if self.counting.hr > 0 {
            write!(f, ", {} HR", self.counting.hr)?;
        }
        if self.counting.bb > 0 {
            write!(f, ", {} BB", self.counting.bb)?;
        }
        Ok(())
    }
}
