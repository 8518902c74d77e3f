//! S-curve fitting of efficiency histograms.
//!
//! Model:
//!
//! ```text
//! efficiency(t) = 0.5 * max_efficiency * (1 + erf((t - mean) / (std_dev * sqrt(2))))
//! ```
//!
//! The chi-square is minimised with argmin's Nelder-Mead solver. A solver
//! that stops without converging still yields its best parameters, paired
//! with a [`FitConvergenceWarning`].

use crate::{AdaptiveBinner, EfficiencyHistogram, Error, Result};
use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use cbcscan_core::{DetectorCurves, ThresholdCurve};
use rayon::prelude::*;
use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Evaluates the S-curve model at `threshold`.
#[must_use]
pub fn s_curve(threshold: f64, max_efficiency: f64, std_dev: f64, mean: f64) -> f64 {
    0.5 * max_efficiency * (1.0 + erf((threshold - mean) / (std_dev * SQRT_2)))
}

/// Fit settings.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitConfig {
    /// Maximum number of solver iterations.
    pub max_iterations: u64,
    /// Stop once the chi-square values across the simplex have a standard
    /// deviation below this.
    pub tolerance: f64,
    /// Starting value for the width parameter.
    pub initial_std_dev: f64,
    /// Starting (or fixed) value for the plateau efficiency.
    pub initial_max_efficiency: f64,
    /// Let the plateau efficiency float instead of holding it fixed.
    pub float_max_efficiency: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-8,
            initial_std_dev: 1.0 / 6.0,
            initial_max_efficiency: 1.0,
            float_max_efficiency: false,
        }
    }
}

impl FitConfig {
    /// Sets the iteration limit.
    #[must_use]
    pub fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the starting width.
    #[must_use]
    pub fn with_initial_std_dev(mut self, std_dev: f64) -> Self {
        self.initial_std_dev = std_dev;
        self
    }

    /// Lets the plateau efficiency float.
    #[must_use]
    pub fn with_float_max_efficiency(mut self, float: bool) -> Self {
        self.float_max_efficiency = float;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be positive".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.initial_std_dev.is_finite() && self.initial_std_dev > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "initial_std_dev must be positive, got {}",
                self.initial_std_dev
            )));
        }
        if !self.initial_max_efficiency.is_finite() {
            return Err(Error::InvalidConfig(
                "initial_max_efficiency must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Fitted S-curve parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitParameters {
    /// Chi-square at the best parameters.
    pub chi2: f64,
    /// Populated bins minus free parameters.
    pub ndf: u32,
    /// Plateau efficiency.
    pub max_efficiency: f64,
    /// Width of the turn-on.
    pub std_dev: f64,
    /// Threshold at half of the plateau.
    pub mean: f64,
}

impl FitParameters {
    /// Evaluates the fitted model at `threshold`.
    #[must_use]
    pub fn evaluate(&self, threshold: f64) -> f64 {
        s_curve(threshold, self.max_efficiency, self.std_dev, self.mean)
    }
}

/// Non-fatal diagnostic for a fit that stopped before converging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitConvergenceWarning {
    /// Iterations performed.
    pub iterations: u64,
    /// Termination reason reported by the solver.
    pub reason: String,
}

impl fmt::Display for FitConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fit did not converge after {} iterations: {}",
            self.iterations, self.reason
        )
    }
}

/// Result of fitting one curve.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    /// Best parameters found.
    pub parameters: FitParameters,
    /// Solver iterations performed.
    pub iterations: u64,
    /// Set when the solver stopped without converging.
    pub warning: Option<FitConvergenceWarning>,
}

impl FitOutcome {
    /// Returns true if the solver reported convergence.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.warning.is_none()
    }
}

impl fmt::Display for FitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.parameters;
        write!(
            f,
            "FitOutcome(chi2={:.4}, ndf={}, max_efficiency={:.4}, std_dev={:.4}, mean={:.4}, converged={})",
            p.chi2,
            p.ndf,
            p.max_efficiency,
            p.std_dev,
            p.mean,
            self.is_converged()
        )
    }
}

/// Fit result for one strip of a curve tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    /// FED index.
    pub fed: usize,
    /// FED channel index.
    pub channel: usize,
    /// Strip index.
    pub strip: usize,
    /// Fit result.
    pub outcome: FitOutcome,
}

/// One populated bin used in the chi-square.
#[derive(Debug, Clone, Copy)]
struct FitPoint {
    threshold: f64,
    efficiency: f64,
    variance: f64,
}

impl FitPoint {
    /// Uses a smoothed binomial variance so bins at 0% or 100% still carry
    /// a finite weight.
    #[allow(clippy::cast_precision_loss)]
    fn new(threshold: f64, passed: u64, total: u64) -> Self {
        let n = total as f64;
        let smoothed = (passed as f64 + 0.5) / (n + 1.0);
        Self {
            threshold,
            efficiency: passed as f64 / n,
            variance: smoothed * (1.0 - smoothed) / n,
        }
    }
}

/// Parameter vector layout: `[std_dev, mean]`, plus `max_efficiency` when
/// it floats.
#[derive(Debug, Clone, Copy)]
struct Layout {
    fixed_max_efficiency: Option<f64>,
}

impl Layout {
    fn free_parameters(self) -> usize {
        if self.fixed_max_efficiency.is_some() {
            2
        } else {
            3
        }
    }

    fn unpack(self, params: &[f64]) -> (f64, f64, f64) {
        let max_efficiency = self
            .fixed_max_efficiency
            .unwrap_or_else(|| params.get(2).copied().unwrap_or(1.0));
        (max_efficiency, params[0], params[1])
    }
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params
        .iter()
        .zip(bounds)
        .map(|(&value, &(low, high))| value.clamp(low, high))
        .collect()
}

#[derive(Clone, Copy)]
struct ChiSquare<'a> {
    points: &'a [FitPoint],
    layout: Layout,
    bounds: &'a [(f64, f64)],
}

impl ChiSquare<'_> {
    fn value(&self, params: &[f64]) -> f64 {
        let (max_efficiency, std_dev, mean) = self.layout.unpack(params);
        self.points
            .iter()
            .map(|point| {
                let residual = s_curve(point.threshold, max_efficiency, std_dev, mean) - point.efficiency;
                residual * residual / point.variance
            })
            .sum()
    }
}

impl CostFunction for ChiSquare<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.value(&clamp_params(params, self.bounds)))
    }
}

/// Seeds the mean by bisecting the bins for the first crossing of 50%
/// efficiency.
#[must_use]
pub fn initial_mean(histogram: &EfficiencyHistogram) -> f64 {
    let mut low = 0;
    let mut high = histogram.bin_count() - 1;
    while high - low > 1 {
        let mid = (low + high) / 2;
        if histogram.efficiency(mid) > 0.5 {
            high = mid;
        } else {
            low = mid;
        }
    }
    histogram.bin(low).map_or(histogram.low_edge(), |bin| bin.center())
}

/// Fits the S-curve model to threshold curves.
#[derive(Debug, Clone, Default)]
pub struct CurveFitter {
    config: FitConfig,
    binner: AdaptiveBinner,
}

impl CurveFitter {
    /// Creates a fitter with the given configuration.
    #[must_use]
    pub fn new(config: FitConfig) -> Self {
        Self {
            config,
            binner: AdaptiveBinner::default(),
        }
    }

    /// Sets the binner used to histogram curves.
    #[must_use]
    pub fn with_binner(mut self, binner: AdaptiveBinner) -> Self {
        self.binner = binner;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Bins and fits one curve.
    ///
    /// # Errors
    /// Returns [`Error::EmptyCurve`] for a curve without entries (callers
    /// are expected to skip those), or [`Error::InvalidConfig`].
    pub fn fit_curve(&self, curve: &ThresholdCurve) -> Result<FitOutcome> {
        let histogram = EfficiencyHistogram::from_curve(curve, &self.binner)?;
        self.fit_histogram(&histogram)
    }

    /// Fits a histogram over the range of its populated bins.
    ///
    /// # Errors
    /// Returns [`Error::EmptyCurve`] if no bin is populated, or
    /// [`Error::InvalidConfig`].
    pub fn fit_histogram(&self, histogram: &EfficiencyHistogram) -> Result<FitOutcome> {
        self.config.validate()?;
        let points: Vec<FitPoint> = histogram
            .bins()
            .filter(|bin| !bin.is_empty())
            .map(|bin| FitPoint::new(bin.center(), bin.passed, bin.total))
            .collect();
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(Error::EmptyCurve);
        };

        let scale = (last.threshold - first.threshold).max(self.config.initial_std_dev);
        let layout = Layout {
            fixed_max_efficiency: (!self.config.float_max_efficiency)
                .then_some(self.config.initial_max_efficiency),
        };
        let mut bounds = vec![
            (scale * 1e-6, scale * 10.0),
            (first.threshold - scale, last.threshold + scale),
        ];
        let mut seed = vec![self.config.initial_std_dev, initial_mean(histogram)];
        if layout.fixed_max_efficiency.is_none() {
            bounds.push((0.0, 2.0));
            seed.push(self.config.initial_max_efficiency);
        }
        let seed = clamp_params(&seed, &bounds);

        let problem = ChiSquare {
            points: &points,
            layout,
            bounds: &bounds,
        };
        let free = layout.free_parameters();
        let ndf = u32::try_from(points.len().saturating_sub(free)).unwrap_or(u32::MAX);

        let (best, iterations, warning) = self.minimize(problem, &seed)?;
        let (max_efficiency, std_dev, mean) = layout.unpack(&best);
        let outcome = FitOutcome {
            parameters: FitParameters {
                chi2: problem.value(&best),
                ndf,
                max_efficiency,
                std_dev,
                mean,
            },
            iterations,
            warning,
        };
        if let Some(warning) = &outcome.warning {
            log::debug!("{warning}");
        }
        Ok(outcome)
    }

    fn minimize(
        &self,
        problem: ChiSquare<'_>,
        seed: &[f64],
    ) -> Result<(Vec<f64>, u64, Option<FitConvergenceWarning>)> {
        // Initial simplex: the seed plus one step along each parameter.
        let steps = [0.5 * seed[0], self.config.initial_std_dev, 0.05];
        let mut simplex = vec![seed.to_vec()];
        for (index, step) in steps.iter().enumerate().take(seed.len()) {
            let mut vertex = seed.to_vec();
            vertex[index] += step;
            simplex.push(clamp_params(&vertex, problem.bounds));
        }

        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(self.config.tolerance)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let run = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.config.max_iterations))
            .run();

        let res = match run {
            Ok(res) => res,
            Err(err) => {
                return Ok((
                    seed.to_vec(),
                    0,
                    Some(FitConvergenceWarning {
                        iterations: 0,
                        reason: format!("solver failed: {err}"),
                    }),
                ))
            }
        };

        let state = res.state();
        let best = state
            .get_best_param()
            .map_or_else(|| seed.to_vec(), |params| clamp_params(params, problem.bounds));
        let iterations = state.get_iter();
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            )
        );
        let warning = (!converged).then(|| FitConvergenceWarning {
            iterations,
            reason: termination.to_string(),
        });
        Ok((best, iterations, warning))
    }

    /// Fits every populated curve of `curves` in parallel.
    ///
    /// Empty curves are skipped. Curves that fail to fit are logged and
    /// left out. Results follow the tree's FED, channel, strip order.
    #[must_use]
    pub fn fit_tree(&self, curves: &DetectorCurves) -> Vec<CurveFit> {
        let work: Vec<_> = curves
            .curves()
            .filter(|(_, _, _, curve)| !curve.is_empty())
            .collect();

        work.into_par_iter()
            .filter_map(|(fed, channel, strip, curve)| match self.fit_curve(curve) {
                Ok(outcome) => Some(CurveFit {
                    fed,
                    channel,
                    strip,
                    outcome,
                }),
                Err(err) => {
                    log::warn!("FED {fed} channel {channel} strip {strip}: fit failed: {err}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_model_midpoint_and_plateau() {
        assert_relative_eq!(s_curve(2.0, 1.0, 0.3, 2.0), 0.5);
        assert_relative_eq!(s_curve(2.0, 0.8, 0.3, 2.0), 0.4);
        assert!(s_curve(10.0, 1.0, 0.3, 2.0) > 0.999_999);
        assert!(s_curve(-10.0, 1.0, 0.3, 2.0) < 1e-6);
    }

    #[test]
    fn test_initial_mean_bisects_crossing() {
        let mut histogram =
            EfficiencyHistogram::with_edges((0..=10).map(f64::from).collect()).unwrap();
        for bin in 0..10u32 {
            let passed = if bin >= 6 { 10 } else { 0 };
            histogram.fill(f64::from(bin) + 0.5, passed, 10);
        }
        // Last bin at or below 50% is bin 5.
        assert_relative_eq!(initial_mean(&histogram), 5.5);
    }

    #[test]
    fn test_empty_histogram_not_fit() {
        let histogram = EfficiencyHistogram::with_edges(vec![0.0, 1.0, 2.0]).unwrap();
        let result = CurveFitter::default().fit_histogram(&histogram);
        assert!(matches!(result, Err(Error::EmptyCurve)));
    }

    #[test]
    fn test_invalid_config() {
        let mut curve = ThresholdCurve::new();
        curve.record(0.5, true);
        let fitter = CurveFitter::new(FitConfig::default().with_initial_std_dev(0.0));
        assert!(matches!(
            fitter.fit_curve(&curve),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_iteration_limit_reports_warning() {
        let mut curve = ThresholdCurve::new();
        for i in 0..20u32 {
            let threshold = f64::from(i) * 0.1;
            let entry = curve.entry_mut(threshold);
            for event in 0..100u32 {
                entry.record(f64::from(event) < 100.0 * s_curve(threshold, 1.0, 0.3, 1.1));
            }
        }
        let fitter = CurveFitter::new(FitConfig::default().with_max_iterations(2));
        let outcome = fitter.fit_curve(&curve).unwrap();
        let warning = outcome.warning.as_ref().expect("two iterations cannot converge");
        assert!(!outcome.is_converged());
        assert!(warning.iterations <= 2);
        assert!(outcome.parameters.std_dev > 0.0);
        assert_eq!(outcome.parameters.ndf, 18);
    }
}
