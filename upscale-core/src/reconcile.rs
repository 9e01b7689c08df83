//! Result reconciliation
//!
//! Turns the per-method result set of a successful job into the "best method
//! for each metric" selections and the metric rankings that every view
//! renders. Pure functions over the result set; no I/O.
//!
//! Ties always resolve to the method the service reported first. Rankings
//! use a stable sort, so equal values keep their reported order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::domain::method::{MethodResult, Psnr, ResultSet, compare_metric};

/// Whether larger or smaller values win
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// Quality metric reported for every method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Psnr,
    Ssim,
    Mse,
    GradientDiff,
    ProcessingTime,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Psnr,
        Metric::Ssim,
        Metric::Mse,
        Metric::GradientDiff,
        Metric::ProcessingTime,
    ];

    pub fn direction(&self) -> Direction {
        match self {
            Metric::Psnr | Metric::Ssim => Direction::Maximize,
            Metric::Mse | Metric::GradientDiff | Metric::ProcessingTime => Direction::Minimize,
        }
    }

    /// Column label for tables
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Psnr => "PSNR (dB)",
            Metric::Ssim => "SSIM",
            Metric::Mse => "MSE",
            Metric::GradientDiff => "Gradient Diff",
            Metric::ProcessingTime => "Time (s)",
        }
    }

    /// Formats this metric's value for display
    pub fn format(&self, scores: &MethodScores) -> String {
        match self {
            Metric::Psnr => scores.psnr.to_string(),
            Metric::Ssim => format!("{:.3}", scores.ssim),
            Metric::Mse => format!("{:.2}", scores.mse),
            Metric::GradientDiff => format!("{:.2}", scores.gradient_diff),
            Metric::ProcessingTime => format!("{:.2}", scores.processing_time_seconds),
        }
    }

    /// Orders two methods so that the better one comes first
    pub fn compare(&self, a: &MethodScores, b: &MethodScores) -> Ordering {
        let natural = match self {
            Metric::Psnr => a.psnr.total_cmp(&b.psnr),
            Metric::Ssim => compare_metric(a.ssim, b.ssim),
            Metric::Mse => compare_metric(a.mse, b.mse),
            Metric::GradientDiff => compare_metric(a.gradient_diff, b.gradient_diff),
            Metric::ProcessingTime => {
                compare_metric(a.processing_time_seconds, b.processing_time_seconds)
            }
        };

        match self.direction() {
            Direction::Maximize => natural.reverse(),
            Direction::Minimize => natural,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Psnr => "psnr",
            Metric::Ssim => "ssim",
            Metric::Mse => "mse",
            Metric::GradientDiff => "gradient-diff",
            Metric::ProcessingTime => "time",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "psnr" => Ok(Metric::Psnr),
            "ssim" => Ok(Metric::Ssim),
            "mse" => Ok(Metric::Mse),
            "gradient-diff" | "gradient" => Ok(Metric::GradientDiff),
            "time" | "processing-time" => Ok(Metric::ProcessingTime),
            other => Err(format!(
                "unknown metric '{}' (expected psnr, ssim, mse, gradient-diff or time)",
                other
            )),
        }
    }
}

/// The metric values of one method, without its artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodScores {
    pub name: String,
    pub psnr: Psnr,
    pub ssim: f64,
    pub mse: f64,
    pub gradient_diff: f64,
    pub processing_time_seconds: f64,
}

impl MethodScores {
    pub fn from_result(name: &str, result: &MethodResult) -> Self {
        Self {
            name: name.to_string(),
            psnr: result.psnr,
            ssim: result.ssim,
            mse: result.mse,
            gradient_diff: result.gradient_diff,
            processing_time_seconds: result.processing_time_seconds,
        }
    }
}

/// Name of the winning method for each metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestMethods {
    pub psnr: String,
    pub ssim: String,
    pub mse: String,
    pub gradient_diff: String,
    pub processing_time: String,
}

impl BestMethods {
    pub fn for_metric(&self, metric: Metric) -> &str {
        match metric {
            Metric::Psnr => &self.psnr,
            Metric::Ssim => &self.ssim,
            Metric::Mse => &self.mse,
            Metric::GradientDiff => &self.gradient_diff,
            Metric::ProcessingTime => &self.processing_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("result set is empty")]
    EmptyResultSet,
}

/// Reconciled view of a successful job's results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Scores in the order the service reported them
    scores: Vec<MethodScores>,
    best: BestMethods,
}

impl Reconciliation {
    pub fn best(&self) -> &BestMethods {
        &self.best
    }

    /// Methods in reported order
    pub fn scores(&self) -> &[MethodScores] {
        &self.scores
    }

    pub fn is_best(&self, method: &str, metric: Metric) -> bool {
        self.best.for_metric(metric) == method
    }

    /// Methods ordered best-first by `metric`
    pub fn ranking(&self, metric: Metric) -> Vec<&MethodScores> {
        let mut ranked: Vec<&MethodScores> = self.scores.iter().collect();
        ranked.sort_by(|a, b| metric.compare(a, b));
        ranked
    }
}

/// Reconciles a result set.
///
/// Fails only for an empty set, which a successful job never carries.
pub fn reconcile(results: &ResultSet) -> Result<Reconciliation, ReconcileError> {
    let scores: Vec<MethodScores> = results
        .iter()
        .map(|(name, result)| MethodScores::from_result(name, result))
        .collect();

    let winner = |metric: Metric| -> Result<String, ReconcileError> {
        best_of(&scores, metric)
            .map(|s| s.name.clone())
            .ok_or(ReconcileError::EmptyResultSet)
    };

    let best = BestMethods {
        psnr: winner(Metric::Psnr)?,
        ssim: winner(Metric::Ssim)?,
        mse: winner(Metric::Mse)?,
        gradient_diff: winner(Metric::GradientDiff)?,
        processing_time: winner(Metric::ProcessingTime)?,
    };

    Ok(Reconciliation { scores, best })
}

/// Name of the best method for a single metric
pub fn best_method(results: &ResultSet, metric: Metric) -> Option<&str> {
    let mut best: Option<(&str, MethodScores)> = None;
    for (name, result) in results {
        let scores = MethodScores::from_result(name, result);
        let replace = match &best {
            None => true,
            Some((_, current)) => metric.compare(&scores, current) == Ordering::Less,
        };
        if replace {
            best = Some((name.as_str(), scores));
        }
    }
    best.map(|(name, _)| name)
}

/// Method names ordered best-first by `metric`, ties in reported order
pub fn rank_by(results: &ResultSet, metric: Metric) -> Vec<&str> {
    let mut ranked: Vec<(&str, MethodScores)> = results
        .iter()
        .map(|(name, result)| (name.as_str(), MethodScores::from_result(name, result)))
        .collect();
    ranked.sort_by(|(_, a), (_, b)| metric.compare(a, b));
    ranked.into_iter().map(|(name, _)| name).collect()
}

/// First strictly-better method wins; later ties never replace it
fn best_of(scores: &[MethodScores], metric: Metric) -> Option<&MethodScores> {
    scores.iter().fold(None, |best, candidate| match best {
        Some(current) if metric.compare(candidate, current) != Ordering::Less => Some(current),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::method::{Artifacts, Dimensions};

    fn method(psnr: Psnr, ssim: f64, mse: f64, gradient_diff: f64, time: f64) -> MethodResult {
        MethodResult {
            psnr,
            ssim,
            mse,
            gradient_diff,
            processing_time_seconds: time,
            output_dimensions: Dimensions {
                width: 64,
                height: 64,
            },
            artifacts: Artifacts::default(),
            message: None,
        }
    }

    fn results(entries: Vec<(&str, MethodResult)>) -> ResultSet {
        entries
            .into_iter()
            .map(|(name, result)| (name.to_string(), result))
            .collect()
    }

    fn scenario_a() -> ResultSet {
        results(vec![
            ("bilinear", method(Psnr::Finite(30.5), 0.91, 12.3, 5.0, 0.12)),
            ("bicubic", method(Psnr::Finite(32.1), 0.94, 9.8, 4.1, 0.20)),
            ("lanczos", method(Psnr::Infinite, 1.0, 0.0, 0.0, 0.35)),
        ])
    }

    #[test]
    fn test_scenario_best_methods() {
        let reconciled = reconcile(&scenario_a()).unwrap();
        let best = reconciled.best();

        assert_eq!(best.psnr, "lanczos");
        assert_eq!(best.ssim, "lanczos");
        assert_eq!(best.mse, "lanczos");
        assert_eq!(best.gradient_diff, "lanczos");
        assert_eq!(best.processing_time, "bilinear");
    }

    #[test]
    fn test_sentinel_wins_psnr_in_any_position() {
        for position in 0..4 {
            let mut entries = vec![
                ("a", method(Psnr::Finite(45.0), 0.9, 1.0, 1.0, 1.0)),
                ("b", method(Psnr::Finite(1.0e9), 0.9, 1.0, 1.0, 1.0)),
                ("c", method(Psnr::Finite(0.0), 0.9, 1.0, 1.0, 1.0)),
            ];
            entries.insert(position, ("exact", method(Psnr::Infinite, 1.0, 0.0, 0.0, 1.0)));
            let set = results(entries);

            assert_eq!(best_method(&set, Metric::Psnr), Some("exact"));
            assert_eq!(reconcile(&set).unwrap().best().psnr, "exact");
        }
    }

    #[test]
    fn test_two_sentinels_first_wins() {
        let set = results(vec![
            ("nearest", method(Psnr::Finite(20.0), 0.8, 1.0, 1.0, 1.0)),
            ("first", method(Psnr::Infinite, 1.0, 0.0, 0.0, 1.0)),
            ("second", method(Psnr::Infinite, 1.0, 0.0, 0.0, 1.0)),
        ]);

        assert_eq!(best_method(&set, Metric::Psnr), Some("first"));
        assert_eq!(rank_by(&set, Metric::Psnr), vec!["first", "second", "nearest"]);
    }

    #[test]
    fn test_ties_resolve_to_first_reported() {
        let set = results(vec![
            ("slow", method(Psnr::Finite(30.0), 0.9, 5.0, 2.0, 0.5)),
            ("fast", method(Psnr::Finite(30.0), 0.9, 5.0, 2.0, 0.1)),
            ("fast_too", method(Psnr::Finite(30.0), 0.9, 5.0, 2.0, 0.1)),
        ]);

        let best = reconcile(&set).unwrap();
        assert_eq!(best.best().psnr, "slow");
        assert_eq!(best.best().mse, "slow");
        assert_eq!(best.best().processing_time, "fast");
        assert_eq!(
            rank_by(&set, Metric::ProcessingTime),
            vec!["fast", "fast_too", "slow"]
        );
        assert_eq!(rank_by(&set, Metric::Ssim), vec!["slow", "fast", "fast_too"]);
    }

    #[test]
    fn test_signed_zero_is_a_tie() {
        let set = results(vec![
            ("first", method(Psnr::Finite(0.0), 0.0, 0.0, 0.0, 0.0)),
            ("second", method(Psnr::Finite(-0.0), -0.0, -0.0, -0.0, -0.0)),
        ]);

        let best = reconcile(&set).unwrap();
        assert_eq!(best.best().psnr, "first");
        assert_eq!(best.best().ssim, "first");
        assert_eq!(best.best().mse, "first");
        assert_eq!(best.best().gradient_diff, "first");
        assert_eq!(best.best().processing_time, "first");
        assert_eq!(rank_by(&set, Metric::Mse), vec!["first", "second"]);
        assert_eq!(rank_by(&set, Metric::Ssim), vec!["first", "second"]);
    }

    #[test]
    fn test_ranking_directions() {
        let set = scenario_a();
        assert_eq!(
            rank_by(&set, Metric::Psnr),
            vec!["lanczos", "bicubic", "bilinear"]
        );
        assert_eq!(
            rank_by(&set, Metric::Mse),
            vec!["lanczos", "bicubic", "bilinear"]
        );
        assert_eq!(
            rank_by(&set, Metric::ProcessingTime),
            vec!["bilinear", "bicubic", "lanczos"]
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let set = scenario_a();
        let first = reconcile(&set).unwrap();
        let second = reconcile(&set).unwrap();
        assert_eq!(first, second);

        for metric in Metric::ALL {
            let once: Vec<&str> = first
                .ranking(metric)
                .into_iter()
                .map(|s| s.name.as_str())
                .collect();
            let twice: Vec<&str> = second
                .ranking(metric)
                .into_iter()
                .map(|s| s.name.as_str())
                .collect();
            assert_eq!(once, twice);
            assert_eq!(once, rank_by(&set, metric));
        }
    }

    #[test]
    fn test_empty_result_set_is_rejected() {
        assert_eq!(
            reconcile(&ResultSet::new()).unwrap_err(),
            ReconcileError::EmptyResultSet
        );
        assert_eq!(best_method(&ResultSet::new(), Metric::Psnr), None);
        assert!(rank_by(&ResultSet::new(), Metric::Psnr).is_empty());
    }

    #[test]
    fn test_metric_parsing_and_format() {
        assert_eq!("gradient_diff".parse::<Metric>().unwrap(), Metric::GradientDiff);
        assert_eq!("TIME".parse::<Metric>().unwrap(), Metric::ProcessingTime);
        assert!("sharpness".parse::<Metric>().is_err());

        let reconciled = reconcile(&scenario_a()).unwrap();
        let lanczos = &reconciled.scores()[2];
        assert_eq!(Metric::Psnr.format(lanczos), "∞");
        assert_eq!(Metric::Ssim.format(lanczos), "1.000");
        assert!(reconciled.is_best("bilinear", Metric::ProcessingTime));
    }
}
