// Confidence scoring
// Blends the model's self-reported confidence with how closely the error
// matches previously analyzed ones. Pure: no clock, no randomness.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// pull towards 1.0 proportional to the best history similarity
    pub history_weight: f32,
    /// relative reduction when the index answered but had nothing similar
    pub no_match_penalty: f32,
    /// relative reduction when the index could not be queried at all
    pub unavailable_penalty: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            history_weight: 0.3,
            no_match_penalty: 0.1,
            unavailable_penalty: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer {
    weights: ScoringWeights,
}

impl ConfidenceScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights: ScoringWeights {
                history_weight: weights.history_weight.clamp(0.0, 1.0),
                no_match_penalty: weights.no_match_penalty.clamp(0.0, 1.0),
                unavailable_penalty: weights.unavailable_penalty.clamp(0.0, 1.0),
            },
        }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Final confidence in [0, 1].
    ///
    /// `similarities` is `None` when the history index was unreachable and
    /// `Some(&[])` when it answered with no matches.
    pub fn score(&self, model_confidence: f32, similarities: Option<&[f32]>) -> f32 {
        let m = if model_confidence.is_finite() {
            model_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let score = match similarities {
            None => m * (1.0 - self.weights.unavailable_penalty),
            Some(sims) => {
                let best = sims
                    .iter()
                    .copied()
                    .filter(|s| s.is_finite())
                    .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));
                match best {
                    None => m * (1.0 - self.weights.no_match_penalty),
                    Some(best) => {
                        let best = best.clamp(0.0, 1.0);
                        m + self.weights.history_weight * best * (1.0 - m)
                    }
                }
            }
        };

        score.clamp(0.0, 1.0)
    }
}
