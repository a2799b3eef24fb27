use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

use crate::fields::{
    BATTING_FIELDS, Field, FieldKind, FieldSpec, coerce_count, coerce_decimal, coerce_percent,
    source_position,
};
use crate::teams;
use crate::types::{CountingStats, GameRecord, Venue};

static RE_GAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Z][a-z]{2,8}\.?\s+\d{1,2}|\d{4}-\d{2}-\d{2})")
        .expect("invalid regex: game date")
});

static RE_GAME_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*(\d)\s*\)").expect("invalid regex: game number"));

/// Row classes the source uses for repeated headers and separators.
const NON_GAME_ROW_CLASSES: &[&str] = &["thead", "spacer", "over_header", "partial_table"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowSection {
    #[default]
    Body,
    Footer,
}

/// One table row as found: cell texts in order plus every attribute-style
/// key that addresses a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub cells: Vec<String>,
    pub keyed: HashMap<String, String>,
    pub section: RowSection,
    pub class: Option<String>,
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl RawRow {
    /// Builds a row from a `<tr>`. Cells are keyed by their `data-stat`
    /// attribute and, where the table has one, by the column header label.
    pub fn from_element(row: ElementRef, headers: &[String], section: RowSection) -> Self {
        let mut cells = Vec::new();
        let mut keyed = HashMap::new();

        for cell in row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
        {
            let text = normalize_whitespace(&cell.text().collect::<String>());
            if let Some(stat) = cell.value().attr("data-stat") {
                keyed.insert(stat.to_string(), text.clone());
            }
            if let Some(label) = headers.get(cells.len())
                && !label.is_empty()
            {
                keyed.entry(label.clone()).or_insert_with(|| text.clone());
            }
            cells.push(text);
        }

        Self {
            cells,
            keyed,
            section,
            class: row.value().attr("class").map(str::to_string),
        }
    }

    /// A row addressable by position only.
    pub fn from_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.class
            .as_deref()
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }
}

/// Canonical key → first present, non-empty source value.
pub type ExtractedFields = BTreeMap<Field, String>;

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    specs: &'static [FieldSpec],
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(BATTING_FIELDS)
    }
}

impl FieldExtractor {
    pub fn new(specs: &'static [FieldSpec]) -> Self {
        Self { specs }
    }

    pub fn extract(&self, row: &RawRow) -> ExtractedFields {
        self.specs
            .iter()
            .filter_map(|spec| lookup(row, spec.sources).map(|value| (spec.field, value)))
            .collect()
    }

    /// Converts a row into a [`GameRecord`]. Missing or unparsable values
    /// become zero.
    pub fn game_record(&self, row: &RawRow) -> GameRecord {
        let fields = self.extract(row);
        let kind_of = |field: Field| {
            self.specs
                .iter()
                .find(|s| s.field == field)
                .map(|s| s.kind)
                .unwrap_or(FieldKind::Text)
        };
        let count = |field: Field| {
            fields
                .get(&field)
                .and_then(|v| coerce_count(v))
                .unwrap_or(0)
        };
        let decimal = |field: Field| {
            fields
                .get(&field)
                .and_then(|v| match kind_of(field) {
                    FieldKind::Percent => coerce_percent(v),
                    _ => coerce_decimal(v),
                })
                .unwrap_or(0.0)
        };

        let team = fields.get(&Field::Team).map(|t| t.to_uppercase());
        let (venue, opponent) = detect_venue_and_opponent(&fields, row, team.as_deref());

        GameRecord {
            date_text: fields.get(&Field::Date).cloned().unwrap_or_default(),
            team,
            opponent,
            venue,
            counting: CountingStats {
                pa: count(Field::Pa),
                ab: count(Field::Ab),
                r: count(Field::R),
                h: count(Field::H),
                doubles: count(Field::Doubles),
                triples: count(Field::Triples),
                hr: count(Field::Hr),
                rbi: count(Field::Rbi),
                bb: count(Field::Bb),
                ibb: count(Field::Ibb),
                so: count(Field::So),
                hbp: count(Field::Hbp),
                sh: count(Field::Sh),
                sf: count(Field::Sf),
                roe: count(Field::Roe),
                gdp: count(Field::Gdp),
                sb: count(Field::Sb),
                cs: count(Field::Cs),
            },
            batting_order: count(Field::BattingOrder),
            wpa: decimal(Field::Wpa),
            cwpa: decimal(Field::Cwpa),
            re24: decimal(Field::Re24),
            ali: decimal(Field::Ali),
            acli: decimal(Field::Acli),
            dfs_dk: decimal(Field::DfsDk),
            dfs_fd: decimal(Field::DfsFd),
        }
    }

    /// Whether a row describes a played game rather than a header repeat,
    /// separator or totals line.
    pub fn is_game_row(&self, row: &RawRow) -> bool {
        if row.section == RowSection::Footer {
            return false;
        }
        if NON_GAME_ROW_CLASSES.iter().any(|c| row.has_class(c)) {
            return false;
        }
        self.extract(row)
            .get(&Field::Date)
            .is_some_and(|date| RE_GAME_DATE.is_match(date))
    }
}

/// Attribute-keyed lookups for every source first, then positional ones.
fn lookup(row: &RawRow, sources: &[&str]) -> Option<String> {
    let non_empty = |v: &String| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    };

    sources
        .iter()
        .filter(|s| source_position(s).is_none())
        .find_map(|s| row.keyed.get(*s).and_then(non_empty))
        .or_else(|| {
            sources
                .iter()
                .filter_map(|s| source_position(s))
                .find_map(|i| row.cells.get(i).and_then(non_empty))
        })
}

/// Resolves home/away and the opponent code.
///
/// Tiers, in order: the dedicated location and opponent fields; a literal
/// `@` token anywhere in the row; a known team code anywhere in the row.
fn detect_venue_and_opponent(
    fields: &ExtractedFields,
    row: &RawRow,
    own_team: Option<&str>,
) -> (Venue, Option<String>) {
    let mut scanned_opponent = None;

    let venue = match fields.get(&Field::Location) {
        Some(location) if location.trim() == "@" => Venue::Away,
        Some(_) => Venue::Home,
        None => match scan_for_away_marker(row) {
            Some(opponent) => {
                log::debug!("No location field, found '@' marker in row cells");
                scanned_opponent = opponent;
                Venue::Away
            }
            None => Venue::Home,
        },
    };

    let opponent = fields
        .get(&Field::Opponent)
        .map(|o| o.trim().to_uppercase())
        .filter(|o| {
            let known = teams::is_team_code(o);
            if !known {
                log::debug!("Opponent field '{}' is not a known team code", o);
            }
            known
        })
        .or(scanned_opponent)
        .or_else(|| scan_for_team_code(row, own_team));

    (venue, opponent)
}

/// Looks for a cell that is `@` or `@XXX`. The inner option carries the
/// opponent code when it was attached to the marker.
fn scan_for_away_marker(row: &RawRow) -> Option<Option<String>> {
    row.cells.iter().find_map(|cell| {
        let rest = cell.trim().strip_prefix('@')?.trim();
        if rest.is_empty() {
            Some(None)
        } else if teams::is_team_code(rest) {
            Some(Some(rest.to_string()))
        } else {
            None
        }
    })
}

fn scan_for_team_code(row: &RawRow, own_team: Option<&str>) -> Option<String> {
    let found = row
        .cells
        .iter()
        .find_map(|cell| teams::find_team_code(cell, own_team))
        .map(str::to_string);
    if let Some(code) = &found {
        log::debug!("Recovered opponent '{}' by scanning row cells", code);
    }
    found
}

/// Game number inside a date cell, `Some(1)` for `"Jul 4 (1)"`.
pub fn game_number(date_text: &str) -> Option<u32> {
    RE_GAME_NUMBER
        .captures(date_text)
        .and_then(|caps| caps[1].parse().ok())
}

/// The date part of a date cell, without any game-number marker or
/// abbreviation dots: `"Jul. 4 (1)"` → `"Jul 4"`.
pub fn game_day(date_text: &str) -> String {
    let base = match date_text.find('(') {
        Some(pos) => &date_text[..pos],
        None => date_text,
    };
    base.replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every game row of a located table, oldest first, plus the doubleheader
/// companion of the most recent game when there is one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameLog {
    pub games: Vec<GameRecord>,
    pub companion: Option<GameRecord>,
}

impl GameLog {
    pub fn most_recent(&self) -> Option<&GameRecord> {
        self.games.last()
    }
}

pub fn extract_game_log(rows: &[RawRow], extractor: &FieldExtractor) -> GameLog {
    let games: Vec<GameRecord> = rows
        .iter()
        .filter(|row| extractor.is_game_row(row))
        .map(|row| extractor.game_record(row))
        .collect();

    let skipped = rows.len() - games.len();
    if skipped > 0 {
        log::debug!("Skipped {} non-game row(s)", skipped);
    }

    // The companion sits right before the most recent game, which puts it
    // two rows above the totals footer.
    let companion = match games.as_slice() {
        [.., previous, last]
            if game_number(&last.date_text).is_some()
                && game_day(&previous.date_text) == game_day(&last.date_text) =>
        {
            log::info!(
                "Doubleheader detected on '{}', companion game '{}'",
                last.date_text,
                previous.date_text
            );
            Some(previous.clone())
        }
        [.., last] if game_number(&last.date_text).is_some() => {
            log::debug!(
                "'{}' carries a game number but the previous game is on another day",
                last.date_text
            );
            None
        }
        _ => None,
    };

    GameLog { games, companion }
}
