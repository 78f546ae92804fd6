//! football-data.co.uk division codes

use std::path::Path;

const LEAGUE_CODES: &[(&str, &str)] = &[
    ("SP1", "La Liga"),
    ("SP2", "La Liga 2"),
    ("E0", "Premier League"),
    ("E1", "Championship"),
    ("E2", "League One"),
    ("E3", "League Two"),
    ("D1", "Bundesliga"),
    ("D2", "Bundesliga 2"),
    ("I1", "Serie A"),
    ("I2", "Serie B"),
    ("F1", "Ligue 1"),
    ("F2", "Ligue 2"),
    ("N1", "Eredivisie"),
    ("P1", "Primeira Liga"),
];

/// League name for a division code such as "E0"
pub fn league_for_code(code: &str) -> Option<&'static str> {
    let code = code.trim().to_uppercase();
    LEAGUE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// League implied by a file name like `E0_2324.csv` or `SP1.csv`
pub fn league_from_filename(path: &Path) -> Option<&'static str> {
    let stem = path.file_stem()?.to_str()?.to_uppercase();
    stem.split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(league_for_code)
}
