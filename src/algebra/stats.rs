//! Scalar moment helpers for `max(X, 0)` of a Normal variable.
//!
//! All of the Clark-style machinery in this crate bottoms out in three
//! functions of the normalized shift `s = -mu/sigma`:
//!
//! - [`mean_max`]: `E[max(X,0)] = mu + sigma * mean_max(s)`
//! - [`mean_max2`]: `Var[max(X,0)] = sigma^2 * (mean_max2(s) - mean_max(s)^2)`
//! - [`mean_phi_max`]: the covariance multiplier for one `max0` operand
//!
//! The CDF goes through `erfc` so both tails stay accurate, and `mean_max`
//! switches to the Mills-ratio expansion deep in the left tail where the
//! direct form cancels.

use statrs::function::erf::erfc;

use std::f64::consts::FRAC_1_SQRT_2;

/// 1 / sqrt(2*pi)
pub const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Shift beyond which `mean_max` uses the asymptotic expansion.
const TAIL_SHIFT: f64 = -12.0;

/// Standard normal density.
pub fn phi(s: f64) -> f64 {
    INV_SQRT_2PI * (-0.5 * s * s).exp()
}

/// Standard normal CDF via the complementary error function.
pub fn cap_phi(s: f64) -> f64 {
    0.5 * erfc(-s * FRAC_1_SQRT_2)
}

/// `(E[max(X,0)] - mu) / sigma` as a function of `s = -mu/sigma`.
///
/// Equivalent to `phi(s) + s*Phi(s)`; for `s` far into the left tail that
/// form loses digits to cancellation, so the Mills-ratio expansion
/// `phi(s) * (1/s^2 - 3/s^4 + 15/s^6)` is used instead.
pub fn mean_max(s: f64) -> f64 {
    if s < TAIL_SHIFT {
        let s2 = s * s;
        return phi(s) * (1.0 / s2 - 3.0 / (s2 * s2) + 15.0 / (s2 * s2 * s2));
    }
    phi(s) + s * cap_phi(s)
}

/// `E[max(X,0)^2] / sigma^2` shifted so that
/// `Var[max(X,0)] = sigma^2 * (mean_max2(s) - mean_max(s)^2)`.
pub fn mean_max2(s: f64) -> f64 {
    1.0 + s * phi(s) + (s * s - 1.0) * cap_phi(s)
}

/// Covariance multiplier for a `max0` operand:
/// `cov(X, max0(Z)) = cov(X, Z) * mean_phi_max(-mu_Z/sigma_Z)`.
pub fn mean_phi_max(s: f64) -> f64 {
    phi(s) + s * (1.0 - cap_phi(s))
}
