use serde::{Deserialize, Serialize};

use crate::models::{Market, Outcome};

const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub outcome: Outcome,
    pub precision: f64,
    pub recall: f64,
    pub support: usize,
}

/// Held-out performance of one market model. Reporting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub market: Market,
    pub samples: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub brier: f64,
    pub per_class: Vec<ClassMetrics>,
}

impl Evaluation {
    /// Score `(probabilities, true class)` pairs. Probabilities follow
    /// `market.outcomes()` order.
    pub fn from_predictions(market: Market, predictions: &[(Vec<f64>, usize)]) -> Self {
        let outcomes = market.outcomes();
        let k = outcomes.len();
        let n = predictions.len();

        let mut predicted_counts = vec![0usize; k];
        let mut true_positives = vec![0usize; k];
        let mut support = vec![0usize; k];
        let mut correct = 0usize;
        let mut log_loss = 0.0;
        let mut brier = 0.0;

        for (probs, actual) in predictions {
            let predicted = argmax(probs);
            predicted_counts[predicted] += 1;
            support[*actual] += 1;
            if predicted == *actual {
                correct += 1;
                true_positives[predicted] += 1;
            }

            let p_true = probs.get(*actual).copied().unwrap_or(0.0);
            log_loss -= p_true.clamp(LOG_LOSS_EPS, 1.0).ln();
            brier += probs
                .iter()
                .enumerate()
                .map(|(class, p)| {
                    let target = if class == *actual { 1.0 } else { 0.0 };
                    (p - target).powi(2)
                })
                .sum::<f64>();
        }

        let per_class = outcomes
            .iter()
            .enumerate()
            .map(|(class, outcome)| ClassMetrics {
                outcome: *outcome,
                precision: ratio(true_positives[class], predicted_counts[class]),
                recall: ratio(true_positives[class], support[class]),
                support: support[class],
            })
            .collect();

        Self {
            market,
            samples: n,
            accuracy: ratio(correct, n),
            log_loss: if n == 0 { 0.0 } else { log_loss / n as f64 },
            brier: if n == 0 { 0.0 } else { brier / n as f64 },
            per_class,
        }
    }
}

/// Index of the largest value; ties go to the lower index
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
