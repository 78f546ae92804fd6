use chrono::{DateTime, NaiveDate};

/// Parse a historical match date.
///
/// Accepts ISO `YYYY-MM-DD`, RFC 3339 timestamps (date part kept), and the
/// football-data style `DD/MM/YYYY` / `DD/MM/YY` (two-digit years are 20YY).
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    // "2024-08-17T15:00:00" and "2024-08-17 15:00" without offsets
    if raw.len() > 10 && raw.is_char_boundary(10) {
        if let Ok(date) = NaiveDate::parse_from_str(&raw[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }

    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let year = match parts[2].len() {
        2 => format!("20{}", parts[2]),
        4 => parts[2].to_string(),
        _ => return None,
    };
    NaiveDate::parse_from_str(&format!("{}/{}/{}", parts[0], parts[1], year), "%d/%m/%Y").ok()
}

/// Convert decimal odds to implied probability. `None` for odds that cannot be priced.
pub fn odds_to_probability(odds: f64) -> Option<f64> {
    if !odds.is_finite() || odds <= 1.0 {
        return None;
    }
    Some(1.0 / odds)
}

/// Calculate Kelly criterion bet size
pub fn kelly_criterion(win_probability: f64, odds: f64) -> f64 {
    let b = odds - 1.0; // Net odds received on the wager
    if b <= 0.0 {
        return 0.0;
    }
    let p = win_probability;
    let q = 1.0 - p;

    let kelly = (b * p - q) / b;
    kelly.clamp(0.0, 0.25) // Cap at 25% of bankroll
}

/// Normalize probabilities to sum to 1.0; an all-zero input becomes uniform
pub fn normalize_probabilities(probs: &[f64]) -> Vec<f64> {
    let sum: f64 = probs.iter().filter(|p| p.is_finite()).sum();
    if sum <= 0.0 {
        let n = probs.len().max(1) as f64;
        return vec![1.0 / n; probs.len()];
    }
    probs
        .iter()
        .map(|p| if p.is_finite() { p / sum } else { 0.0 })
        .collect()
}

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Team names closest to `input`, best first
pub fn closest_names<'a, I>(input: &str, candidates: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = input.to_lowercase();
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|name| (strsim::jaro_winkler(&needle, &name.to_lowercase()), name))
        .filter(|(score, _)| *score >= 0.8)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_match_date() {
        let expected = NaiveDate::from_ymd_opt(2023, 8, 11);
        assert_eq!(parse_match_date("2023-08-11"), expected);
        assert_eq!(parse_match_date("11/08/2023"), expected);
        assert_eq!(parse_match_date("11/08/23"), expected);
        assert_eq!(parse_match_date("2023-08-11T19:00:00+00:00"), expected);
        assert_eq!(parse_match_date("2023-08-11 19:00"), expected);
        assert_eq!(parse_match_date(""), None);
        assert_eq!(parse_match_date("yesterday"), None);
        assert_eq!(parse_match_date("31/02/2023"), None);
    }

    #[test]
    fn test_odds_to_probability() {
        assert!((odds_to_probability(2.0).unwrap() - 0.5).abs() < 0.001);
        assert!((odds_to_probability(4.0).unwrap() - 0.25).abs() < 0.001);
        assert_eq!(odds_to_probability(1.0), None);
        assert_eq!(odds_to_probability(f64::NAN), None);
    }

    #[test]
    fn test_kelly_criterion() {
        // p=0.55 at 2.5: (1.5*0.55 - 0.45) / 1.5 = 0.25
        assert!((kelly_criterion(0.55, 2.5) - 0.25).abs() < 1e-9);
        assert_eq!(kelly_criterion(0.3, 2.0), 0.0);
        assert_eq!(kelly_criterion(0.9, 1.0), 0.0);
    }

    #[test]
    fn test_normalize_probabilities() {
        let normalized = normalize_probabilities(&[0.4, 0.3, 0.2]);
        let sum: f64 = normalized.iter().sum();
        assert!((sum - 1.0).abs() < 0.001);

        let uniform = normalize_probabilities(&[0.0, 0.0]);
        assert_eq!(uniform, vec![0.5, 0.5]);
    }

    #[test]
    fn test_closest_names() {
        let teams = ["Arsenal", "Aston Villa", "Chelsea"];
        let suggestions = closest_names("arsenall", teams.iter().copied(), 3);
        assert_eq!(suggestions.first().map(String::as_str), Some("Arsenal"));
        assert!(closest_names("Real Madrid", teams.iter().copied(), 3).is_empty());
    }
}
