/*! Null score distribution fitting.

Two families are supported:

- The extreme value (Gumbel) distribution, fit by maximum likelihood with a
  Newton-Raphson search for the scale parameter $`\lambda`$.
- The three-parameter Weibull distribution, fit by linear regression on the
  Weibull plot of the upper tail for each of a grid of location shifts,
  keeping the shift with the best correlation.

All fits accept scores in any [`Float`] type and compute in `f64`.
*/
use num_traits::Float;
use tracing::{debug, trace};

use crate::error::MatchCollectionError;
use crate::score_kind::ScoreKind;

/// The largest number of Newton-Raphson steps taken by [`fit_evd`]
pub const MAX_EVD_ITERATIONS: usize = 10_000;

/// The convergence threshold on the likelihood derivative in [`fit_evd`]
pub const EVD_TOLERANCE: f64 = 1e-3;

/// The smallest number of matches a Weibull fit should be attempted on
pub const MIN_WEIBULL_MATCHES: usize = 40;

/// The lowest acceptable correlation for a three-parameter Weibull fit
pub const CORR_THRESHOLD: f64 = 0.0;

/// How far the correlation may fall below the best seen before the shift
/// search stops
const CORRELATION_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvdParameters {
    /// Location
    pub mu: f64,
    /// Inverse scale
    pub lambda: f64,
}

/// The parameters of a three-parameter Weibull fit.
///
/// `shift` is added to a score before evaluating the two-parameter
/// distribution, so the location of the fitted distribution is `-shift`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeibullParameters {
    /// Scale
    pub eta: f64,
    /// Shape
    pub beta: f64,
    pub shift: f64,
    /// The Pearson correlation of the Weibull plot regression
    pub correlation: f64,
}

impl WeibullParameters {
    pub fn is_fit(&self) -> bool {
        self.eta != 0.0
    }
}

/// The grid of shifts searched by [`fit_three_parameter_weibull`], walked
/// from `max` down to (but excluding) `min`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShiftSearch {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ShiftSearch {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub const fn xcorr() -> Self {
        Self::new(-5.0, 5.0, 0.05)
    }

    pub const fn sp() -> Self {
        Self::new(-100.0, 300.0, 5.0)
    }

    pub fn for_kind(kind: ScoreKind) -> Self {
        match kind.sort_kind() {
            ScoreKind::Sp => Self::sp(),
            _ => Self::xcorr(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> {
        let n_steps = ((self.max - self.min) / self.step).round().max(0.0) as usize;
        let (max, step) = (self.max, self.step);
        (0..n_steps).map(move |i| max - (i as f64) * step)
    }
}

/// How many of the top scores to fit a Weibull distribution to
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitFraction {
    /// A fraction of all scores, rounded down
    Fraction(f64),
    /// A fixed number of scores, or all of them if there are fewer
    Count(usize),
    All,
}

impl Default for FitFraction {
    fn default() -> Self {
        Self::Fraction(0.55)
    }
}

impl FitFraction {
    pub fn fit_count(&self, n: usize) -> usize {
        match self {
            Self::Fraction(f) => ((n as f64) * f.clamp(0.0, 1.0)).floor() as usize,
            Self::Count(c) => (*c).min(n),
            Self::All => n,
        }
    }
}

#[inline]
fn as_f64<T: Float>(x: &T) -> f64 {
    x.to_f64().unwrap_or(f64::NAN)
}

/// Fit an extreme value distribution to `scores` by maximum likelihood.
///
/// Solves
/// ```math
/// f(\lambda) = \frac{1}{\lambda} - \bar{s} + \frac{\sum_i s_i e^{-\lambda s_i}}{\sum_i e^{-\lambda s_i}} = 0
/// ```
/// with Newton-Raphson starting from $`\lambda = 1`$, then
/// $`\mu = -\frac{1}{\lambda}\ln\left(\frac{1}{n}\sum_i e^{-\lambda s_i}\right)`$.
///
/// # Errors
/// [`MatchCollectionError::NonConvergence`] if `scores` is empty, if the
/// iteration diverges, or if it does not converge within
/// [`MAX_EVD_ITERATIONS`].
pub fn fit_evd<T: Float>(scores: &[T]) -> Result<EvdParameters, MatchCollectionError> {
    if scores.is_empty() {
        return Err(MatchCollectionError::NonConvergence { iterations: 0 });
    }
    let n = scores.len() as f64;
    let mean = scores.iter().map(as_f64).sum::<f64>() / n;

    let mut lambda = 1.0f64;
    for iteration in 0..MAX_EVD_ITERATIONS {
        let mut exp_sum = 0.0;
        let mut score_exp_sum = 0.0;
        let mut score_sq_exp_sum = 0.0;
        for s in scores.iter().map(as_f64) {
            let e = (-lambda * s).exp();
            exp_sum += e;
            score_exp_sum += s * e;
            score_sq_exp_sum += s * s * e;
        }

        let f = 1.0 / lambda - mean + score_exp_sum / exp_sum;
        if f.abs() < EVD_TOLERANCE {
            let mu = -(exp_sum / n).ln() / lambda;
            debug!("EVD fit converged after {iteration} iterations: mu={mu}, lambda={lambda}");
            return Ok(EvdParameters { mu, lambda });
        }

        let f_prime = (score_exp_sum * score_exp_sum) / (exp_sum * exp_sum)
            - score_sq_exp_sum / exp_sum
            - 1.0 / (lambda * lambda);
        lambda -= f / f_prime;
        trace!("EVD iteration {iteration}: f={f}, lambda={lambda}");
        if !lambda.is_finite() {
            return Err(MatchCollectionError::NonConvergence {
                iterations: iteration + 1,
            });
        }
    }
    Err(MatchCollectionError::NonConvergence {
        iterations: MAX_EVD_ITERATIONS,
    })
}

fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        sxy / denom
    }
}

/// Least squares `(slope, intercept)` of `ys` against `xs`
fn fit_line(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        sxy += (x - x_mean) * (y - y_mean);
        sxx += (x - x_mean) * (x - x_mean);
    }
    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    (slope, y_mean - slope * x_mean)
}

/// Fit a two-parameter Weibull distribution to the `fit_n` largest of
/// `data_desc` after adding `shift`, using the Weibull plot of median ranks
/// against a population of `total_n` scores.
///
/// `data_desc` must be sorted in descending order. Points are consumed until
/// a shifted score is not positive. With fewer than two usable points the
/// returned correlation is zero.
pub fn fit_two_parameter_weibull<T: Float>(
    data_desc: &[T],
    fit_n: usize,
    total_n: usize,
    shift: f64,
) -> WeibullParameters {
    let total = total_n as f64;
    let mut xs = Vec::with_capacity(fit_n);
    let mut ys = Vec::with_capacity(fit_n);
    for (i, s) in data_desc.iter().take(fit_n).map(as_f64).enumerate() {
        let shifted = s + shift;
        if shifted <= 0.0 || shifted.is_nan() {
            break;
        }
        let f = (total - i as f64 - 0.3) / (total + 0.4);
        xs.push(shifted.ln());
        ys.push((-(1.0 - f).ln()).ln());
    }

    if xs.len() < 2 {
        return WeibullParameters {
            shift,
            ..Default::default()
        };
    }

    let (slope, intercept) = fit_line(&xs, &ys);
    let beta = slope;
    let eta = (-intercept / beta).exp();
    let correlation = pearson_correlation(&xs, &ys);
    WeibullParameters {
        eta,
        beta,
        shift,
        correlation,
    }
}

/// Fit a three-parameter Weibull distribution by searching `search` for the
/// shift whose two-parameter fit correlates best.
///
/// The search stops early once a fit's correlation falls more than 0.1 below
/// the best seen. If no fit reaches [`CORR_THRESHOLD`], every parameter is
/// zero.
pub fn fit_three_parameter_weibull<T: Float>(
    data_desc: &[T],
    fit_n: usize,
    total_n: usize,
    search: ShiftSearch,
) -> WeibullParameters {
    let mut best = WeibullParameters::default();
    for shift in search.iter() {
        let params = fit_two_parameter_weibull(data_desc, fit_n, total_n, shift);
        trace!(
            "Weibull shift {shift}: eta={}, beta={}, correlation={}",
            params.eta,
            params.beta,
            params.correlation
        );
        if params.correlation > best.correlation {
            best = params;
        } else if params.correlation < best.correlation - CORRELATION_TOLERANCE {
            break;
        }
    }

    if best.correlation < CORR_THRESHOLD || !best.eta.is_finite() {
        return WeibullParameters::default();
    }
    debug!(
        "Weibull fit on {fit_n} of {total_n} scores: eta={}, beta={}, shift={}, correlation={}",
        best.eta, best.beta, best.shift, best.correlation
    );
    best
}
