//! Declarative mapping from canonical stat keys to the source keys each
//! schema variant uses, plus the single coercion path every value goes
//! through.
//!
//! A source key is either an attribute-style key (a `data-stat` value or a
//! column header label) or a decimal column position such as `"9"`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Date,
    Team,
    Location,
    Opponent,
    Pa,
    Ab,
    R,
    H,
    Doubles,
    Triples,
    Hr,
    Rbi,
    Bb,
    Ibb,
    So,
    Hbp,
    Sh,
    Sf,
    Roe,
    Gdp,
    Sb,
    Cs,
    BattingOrder,
    Ali,
    Wpa,
    Acli,
    Cwpa,
    Re24,
    DfsDk,
    DfsFd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Count,
    Decimal,
    /// Printed as a percentage, held as a decimal.
    Percent,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub kind: FieldKind,
    pub sources: &'static [&'static str],
}

const fn spec(field: Field, kind: FieldKind, sources: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        field,
        kind,
        sources,
    }
}

use FieldKind::{Count, Decimal, Percent, Text};

/// Batting game-log columns. Sources are listed legacy `data-stat` name
/// first, then the current `b_*` names, then the header label, then the
/// position in the legacy layout (`Rk` is column 0).
///
/// cWPA is the only percent-typed column. The leverage indices (aLI, acLI)
/// are plain decimals on the page and are published as numbers.
pub const BATTING_FIELDS: &[FieldSpec] = &[
    spec(Field::Date, Text, &["date_game", "date", "Date", "3"]),
    spec(Field::Team, Text, &["team_ID", "team_name_abbr", "Tm", "Team", "4"]),
    spec(
        Field::Location,
        Text,
        &["team_homeORaway", "game_location", "homeORaway", "5"],
    ),
    spec(Field::Opponent, Text, &["opp_ID", "opp_name_abbr", "Opp", "6"]),
    spec(Field::Pa, Count, &["PA", "b_pa", "9"]),
    spec(Field::Ab, Count, &["AB", "b_ab", "10"]),
    spec(Field::R, Count, &["R", "b_r", "11"]),
    spec(Field::H, Count, &["H", "b_h", "12"]),
    spec(Field::Doubles, Count, &["2B", "b_doubles", "13"]),
    spec(Field::Triples, Count, &["3B", "b_triples", "14"]),
    spec(Field::Hr, Count, &["HR", "b_hr", "15"]),
    spec(Field::Rbi, Count, &["RBI", "b_rbi", "16"]),
    spec(Field::Bb, Count, &["BB", "b_bb", "17"]),
    spec(Field::Ibb, Count, &["IBB", "b_ibb", "18"]),
    spec(Field::So, Count, &["SO", "b_so", "19"]),
    spec(Field::Hbp, Count, &["HBP", "b_hbp", "20"]),
    spec(Field::Sh, Count, &["SH", "b_sh", "21"]),
    spec(Field::Sf, Count, &["SF", "b_sf", "22"]),
    spec(Field::Roe, Count, &["ROE", "b_roe", "23"]),
    spec(Field::Gdp, Count, &["GIDP", "GDP", "b_gidp", "24"]),
    spec(Field::Sb, Count, &["SB", "b_sb", "25"]),
    spec(Field::Cs, Count, &["CS", "b_cs", "26"]),
    spec(
        Field::BattingOrder,
        Count,
        &["batting_order_position", "b_lineup_position", "BOP", "31"],
    ),
    spec(
        Field::Ali,
        Decimal,
        &["leverage_index_avg", "b_leverage_index_avg", "aLI", "32"],
    ),
    spec(Field::Wpa, Decimal, &["wpa_bat", "b_wpa", "WPA", "33"]),
    spec(Field::Acli, Decimal, &["cli_avg", "b_cli_avg", "acLI", "34"]),
    spec(Field::Cwpa, Percent, &["cwpa_bat", "b_cwpa", "cWPA", "35"]),
    spec(Field::Re24, Decimal, &["re24_bat", "b_re24", "RE24", "36"]),
    spec(
        Field::DfsDk,
        Decimal,
        &["draftkings_points", "b_draftkings_points", "DFS(DK)", "37"],
    ),
    spec(
        Field::DfsFd,
        Decimal,
        &["fanduel_points", "b_fanduel_points", "DFS(FD)", "38"],
    ),
];

/// Column position encoded in a source key, if it is positional.
pub fn source_position(source: &str) -> Option<usize> {
    if source.is_empty() || !source.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    source.parse().ok()
}

fn clean_numeric(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '%' | ',') && !c.is_whitespace())
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect()
}

/// No single-game counting stat comes close to this.
pub const MAX_GAME_COUNT: u32 = 999;

pub fn coerce_count(raw: &str) -> Option<u32> {
    let cleaned = clean_numeric(raw);
    match cleaned.parse::<u32>() {
        Ok(value) if value <= MAX_GAME_COUNT => Some(value),
        Ok(value) => {
            log::debug!("Implausible count {}, treating as absent", value);
            None
        }
        Err(_) => {
            if !cleaned.is_empty() {
                log::debug!("Unparsable count '{}', treating as absent", raw);
            }
            None
        }
    }
}

pub fn coerce_decimal(raw: &str) -> Option<f64> {
    let cleaned = clean_numeric(raw);
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            if !cleaned.is_empty() {
                log::debug!("Unparsable decimal '{}', treating as absent", raw);
            }
            None
        }
    }
}

/// `"1.25%"` → `0.0125`.
pub fn coerce_percent(raw: &str) -> Option<f64> {
    coerce_decimal(raw).map(|pct| pct / 100.0)
}

/// `0.0125` → `"1.25%"`.
pub fn render_percent(decimal: f64) -> String {
    let pct = decimal * 100.0;
    // avoid "-0.00%"
    let pct = if pct.abs() < 0.005 { 0.0 } else { pct };
    format!("{:.2}%", pct)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
