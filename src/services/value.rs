use crate::models::{OddsMap, OutcomePrediction, OutcomeProbabilities, PredictionResult};
use crate::utils::{kelly_criterion, odds_to_probability};

/// Attach odds, edge and the value flag to a market's probabilities.
///
/// An outcome is value when the model probability beats `1 / odds`.
/// Without odds nothing is ever flagged. Unusable odds are skipped.
pub fn assess(
    probabilities: &OutcomeProbabilities,
    odds: Option<&OddsMap>,
    low_confidence: bool,
) -> PredictionResult {
    let outcomes: Vec<OutcomePrediction> = probabilities
        .probabilities
        .iter()
        .map(|&(outcome, probability)| {
            let offered = odds.and_then(|o| o.get(&outcome)).copied();
            let priced = offered.and_then(|decimal| match odds_to_probability(decimal) {
                Some(implied) => Some((decimal, implied)),
                None => {
                    tracing::warn!("Ignoring unusable odds {} for {}", decimal, outcome);
                    None
                }
            });

            match priced {
                Some((decimal, implied)) => {
                    let is_value = probability > implied;
                    OutcomePrediction {
                        outcome,
                        label: outcome.label().to_string(),
                        probability,
                        decimal_odds: Some(decimal),
                        implied_probability: Some(implied),
                        edge: Some(probability - implied),
                        kelly_fraction: is_value.then(|| kelly_criterion(probability, decimal)),
                        is_value,
                    }
                }
                None => OutcomePrediction {
                    outcome,
                    label: outcome.label().to_string(),
                    probability,
                    decimal_odds: None,
                    implied_probability: None,
                    edge: None,
                    kelly_fraction: None,
                    is_value: false,
                },
            }
        })
        .collect();

    PredictionResult {
        market: probabilities.market,
        is_value_bet: outcomes.iter().any(|o| o.is_value),
        outcomes,
        low_confidence,
    }
}
