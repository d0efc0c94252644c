//! Conversion of raw scores into p-values and log-probabilities under a
//! fitted null distribution.
use crate::score_kind::ScoreValue;

const BONFERRONI_P_CUTOFF: f64 = 1e-4;
const BONFERRONI_PN_CUTOFF: f64 = 0.01;

/// Bonferroni-correct `p` for `n` tests.
///
/// Uses the exact `1 - (1 - p)^n`, falling back to the first order `p * n`
/// when both terms are small enough that the exact form loses precision.
pub fn bonferroni_correction(p: f64, n: usize) -> f64 {
    let n_f = n as f64;
    if p > BONFERRONI_P_CUTOFF || p * n_f > BONFERRONI_PN_CUTOFF {
        1.0 - (1.0 - p).powf(n_f)
    } else {
        p * n_f
    }
}

/// The upper tail probability of `score` under an extreme value distribution
/// with location `mu` and inverse scale `lambda`, guarded against underflow
/// in both tails
pub fn compute_evd_pvalue(score: f64, mu: f64, lambda: f64) -> f64 {
    let x = lambda * (score - mu);
    if x <= -(-f64::EPSILON.ln()).ln() {
        return 1.0;
    }
    if x >= 2.3 * 308.0 {
        return 0.0;
    }
    let p = (-x).exp();
    if p < 1e-7 {
        p
    } else {
        1.0 - (-p).exp()
    }
}

#[inline]
fn neg_ln(p: f64) -> ScoreValue {
    (-p.ln()) as ScoreValue
}

pub fn score_logp_evd(score: ScoreValue, mu: f64, lambda: f64) -> ScoreValue {
    neg_ln(compute_evd_pvalue(score as f64, mu, lambda))
}

pub fn score_logp_bonf_evd(
    score: ScoreValue,
    mu: f64,
    lambda: f64,
    num_tests: usize,
) -> ScoreValue {
    let p = compute_evd_pvalue(score as f64, mu, lambda);
    neg_ln(bonferroni_correction(p, num_tests))
}

/// The upper tail probability of `score` under a three-parameter Weibull
/// distribution. Returns NaN for an unfit distribution (`eta == 0`).
pub fn compute_weibull_pvalue(score: f64, eta: f64, beta: f64, shift: f64) -> f64 {
    if eta == 0.0 {
        return f64::NAN;
    }
    let shifted = score + shift;
    if shifted <= 0.0 {
        return 1.0;
    }
    (-(shifted / eta).powf(beta)).exp()
}

/// `-ln` of the Weibull p-value, which reduces to `((s + shift) / eta)^beta`.
///
/// Zero when the score falls below the distribution's support or the
/// distribution is unfit.
pub fn score_logp_weibull(score: ScoreValue, eta: f64, beta: f64, shift: f64) -> ScoreValue {
    let shifted = score as f64 + shift;
    if shifted <= 0.0 || eta == 0.0 {
        return 0.0;
    }
    (shifted / eta).powf(beta) as ScoreValue
}

pub fn score_logp_bonf_weibull(
    score: ScoreValue,
    eta: f64,
    beta: f64,
    shift: f64,
    num_tests: usize,
) -> ScoreValue {
    if score as f64 + shift <= 0.0 || eta == 0.0 {
        return 0.0;
    }
    let p = compute_weibull_pvalue(score as f64, eta, beta, shift);
    neg_ln(bonferroni_correction(p, num_tests))
}

/// `-ln` of the exponential tail probability of a score already offset by the
/// base score, given the mean of the offset top scores
pub fn score_logp_exp_sp(offset_score: ScoreValue, mean: f64) -> ScoreValue {
    if mean <= 0.0 {
        return 0.0;
    }
    (offset_score as f64 / mean) as ScoreValue
}

pub fn score_logp_bonf_exp_sp(offset_score: ScoreValue, mean: f64, num_tests: usize) -> ScoreValue {
    if mean <= 0.0 {
        return 0.0;
    }
    let p = (-(offset_score as f64) / mean).exp().min(1.0);
    neg_ln(bonferroni_correction(p, num_tests))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bonferroni() {
        assert!((bonferroni_correction(1e-6, 100) - 1e-4).abs() < 1e-12);
        let exact = 1.0 - (1.0f64 - 0.01).powf(10.0);
        assert!((bonferroni_correction(0.01, 10) - exact).abs() < 1e-12);
        assert_eq!(bonferroni_correction(1.0, 5), 1.0);
    }

    #[test]
    fn test_evd_pvalue_guards() {
        assert_eq!(compute_evd_pvalue(-100.0, 0.0, 1.0), 1.0);
        assert_eq!(compute_evd_pvalue(1000.0, 0.0, 1.0), 0.0);
        let p = compute_evd_pvalue(1.0, 0.0, 1.0);
        assert!((p - (1.0 - (-(-1.0f64).exp()).exp())).abs() < 1e-12);
        let p = compute_evd_pvalue(20.0, 0.0, 1.0);
        assert!((p - (-20.0f64).exp()).abs() < 1e-20);
        assert!(score_logp_evd(20.0, 0.0, 1.0) > 19.9);
    }

    #[test]
    fn test_weibull() {
        assert!(compute_weibull_pvalue(1.0, 0.0, 1.0, 0.0).is_nan());
        assert_eq!(compute_weibull_pvalue(-2.0, 1.0, 1.0, 1.0), 1.0);
        assert_eq!(score_logp_weibull(-2.0, 1.0, 1.0, 1.0), 0.0);
        assert_eq!(score_logp_bonf_weibull(-2.0, 1.0, 1.0, 1.0, 10), 0.0);
        assert_eq!(score_logp_weibull(3.0, 0.0, 1.0, 1.0), 0.0);
        let logp = score_logp_weibull(3.0, 2.0, 2.0, 1.0);
        assert!((logp - 4.0).abs() < 1e-6);
        let p = compute_weibull_pvalue(3.0, 2.0, 2.0, 1.0);
        assert!((-(p.ln()) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_exp_sp() {
        assert_eq!(score_logp_exp_sp(6.0, 2.0), 3.0);
        assert_eq!(score_logp_exp_sp(6.0, 0.0), 0.0);
        let bonf = score_logp_bonf_exp_sp(6.0, 2.0, 1);
        assert!((bonf - 3.0).abs() < 1e-5);
    }
}
