use anyhow::Result;
use serde::Serialize;

use crate::data::model::Split;
use crate::error::ReportError;

/// Goodness of fit of one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SplitAccuracy {
    pub split: Split,
    /// Squared Pearson correlation of a least-squares fit, in `[0, 1]`.
    pub r_squared: f64,
}

impl SplitAccuracy {
    pub fn percent(&self) -> f64 {
        self.r_squared * 100.0
    }

    /// `Training Accuracy: 87.12%`
    pub fn line(&self) -> String {
        format!("{} Accuracy: {:.2}%", self.split.heading(), self.percent())
    }
}

/// R² of the simple linear regression of `predicted` on `target`.
///
/// Fails when there are fewer than two points or every target is equal,
/// since no regression line exists. A constant `predicted` column yields 0.
pub fn r_squared(split: Split, target: &[f64], predicted: &[f64]) -> Result<f64> {
    let degenerate = |reason: String| ReportError::DegenerateRegression { split, reason };

    if target.len() != predicted.len() {
        return Err(degenerate(format!(
            "{} targets but {} predictions",
            target.len(),
            predicted.len()
        ))
        .into());
    }
    let n = target.len();
    if n < 2 {
        return Err(degenerate(format!("{n} points")).into());
    }

    if target.iter().all(|&t| t == target[0]) {
        return Err(degenerate("all target values are identical".to_string()).into());
    }
    if predicted.iter().all(|&p| p == predicted[0]) {
        return Ok(0.0);
    }

    let n_f = n as f64;
    let mean_t = target.iter().sum::<f64>() / n_f;
    let mean_p = predicted.iter().sum::<f64>() / n_f;

    let (mut ss_t, mut ss_p, mut ss_tp) = (0.0, 0.0, 0.0);
    for (&t, &p) in target.iter().zip(predicted) {
        let dt = t - mean_t;
        let dp = p - mean_p;
        ss_t += dt * dt;
        ss_p += dp * dp;
        ss_tp += dt * dp;
    }

    let r = (ss_tp / (ss_t * ss_p).sqrt()).clamp(-1.0, 1.0);
    Ok(r * r)
}

pub fn stats_banner(run_name: &str, best_model: &str, out_feature: &str) -> String {
    format!(
        "\n __________________ Stats for {run_name} {best_model} {out_feature} _________________________ \n"
    )
}

pub const SAVED_BANNER: &str = "\n __________________ Saved _________________________ \n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_linear_relation_scores_one() {
        let target = [1.0, 2.0, 3.0, 4.0];
        let predicted = [3.0, 5.0, 7.0, 9.0];
        let r2 = r_squared(Split::Train, &target, &predicted).unwrap();
        assert!((r2 - 1.0).abs() < 1e-12);

        let inverted = [4.0, 3.0, 2.0, 1.0];
        let r2 = r_squared(Split::Train, &target, &inverted).unwrap();
        assert!((r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn matches_hand_computed_value() {
        // r = 0.8 for this set
        let target = [1.0, 2.0, 3.0, 4.0, 5.0];
        let predicted = [2.0, 1.0, 4.0, 3.0, 5.0];
        let r2 = r_squared(Split::Eval, &target, &predicted).unwrap();
        assert!((r2 - 0.64).abs() < 1e-12);
    }

    #[test]
    fn constant_predictions_score_zero() {
        let r2 = r_squared(Split::Test, &[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]).unwrap();
        assert_eq!(r2, 0.0);
    }

    #[test]
    fn degenerate_inputs_fail() {
        let err = r_squared(Split::Test, &[2.0, 2.0], &[1.0, 3.0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::DegenerateRegression { split: Split::Test, .. })
        ));
        assert!(r_squared(Split::Train, &[1.0], &[1.0]).is_err());
        assert!(r_squared(Split::Train, &[], &[]).is_err());
    }

    #[test]
    fn inexact_constant_targets_fail() {
        // sums of these do not round back to n * value
        for value in [0.1, 0.3048] {
            let err = r_squared(Split::Train, &[value; 7], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0])
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<ReportError>(),
                Some(ReportError::DegenerateRegression { split: Split::Train, .. })
            ));
        }
        let err = r_squared(Split::Eval, &[0.1, 0.1, 0.1], &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(err.downcast_ref::<ReportError>().is_some());
    }

    #[test]
    fn inexact_constant_predictions_score_zero() {
        let r2 = r_squared(Split::Test, &[1.0, 2.0, 3.0], &[0.1, 0.1, 0.1]).unwrap();
        assert_eq!(r2, 0.0);
    }

    #[test]
    fn accuracy_serializes_with_split_label() {
        let acc = SplitAccuracy {
            split: Split::Train,
            r_squared: 0.5,
        };
        let json = serde_json::to_value(acc).unwrap();
        assert_eq!(json, serde_json::json!({"split": "train", "r_squared": 0.5}));
    }

    #[test]
    fn accuracy_line_formats_percentage() {
        let acc = SplitAccuracy {
            split: Split::Eval,
            r_squared: 0.87654,
        };
        assert_eq!(acc.line(), "Validation Accuracy: 87.65%");
    }
}
