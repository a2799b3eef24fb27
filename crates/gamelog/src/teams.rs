/// Team abbreviations as the source site prints them, plus the historical and
/// alternate spellings that still show up in older logs.
pub const TEAM_CODES: &[&str] = &[
    "ANA", "ARI", "ATH", "ATL", "BAL", "BOS", "CHC", "CHW", "CIN", "CLE", "COL", "CWS", "DET",
    "FLA", "HOU", "KCR", "LAA", "LAD", "MIA", "MIL", "MIN", "MON", "NYM", "NYY", "OAK", "PHI",
    "PIT", "SDP", "SEA", "SFG", "STL", "TBD", "TBR", "TEX", "TOR", "WSH", "WSN",
];

pub fn is_team_code(token: &str) -> bool {
    TEAM_CODES.contains(&token)
}

/// Returns the first known team code appearing as a whole token in `text`,
/// ignoring `exclude` (normally the player's own team).
pub fn find_team_code(text: &str, exclude: Option<&str>) -> Option<&'static str> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| Some(*token) != exclude)
        .find_map(|token| TEAM_CODES.iter().copied().find(|code| *code == token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_three_or_four_uppercase_letters() {
        for code in TEAM_CODES {
            assert!((3..=4).contains(&code.len()), "bad length: {code}");
            assert!(code.chars().all(|c| c.is_ascii_uppercase()), "bad code: {code}");
        }
    }

    #[test]
    fn test_find_team_code_whole_tokens_only() {
        assert_eq!(find_team_code("@ NYY", None), Some("NYY"));
        assert_eq!(find_team_code("W 5-3", None), None);
        assert_eq!(find_team_code("BOSTON", None), None);
        assert_eq!(find_team_code("BOS @ NYY", Some("BOS")), Some("NYY"));
    }
}
