//! Pairwise covariance of random-variable nodes.
//!
//! `covariance` answers `cov(a, b)` for any two nodes by structural
//! decomposition, memoizing every pair it touches in the context's cache.
//! The cache key is the unordered id pair, so symmetry and query-order
//! invariance hold by construction: computing the full matrix first and a
//! submatrix later (or the other way round) yields identical values.
//!
//! Decomposition rules, tried in order (the first applicable fires):
//!
//!  1. cache hit
//!  2. same node: `cov = var`
//!  3. either side `ADD(l, r)`: `cov(l, x) + cov(r, x)`
//!  4. either side `SUB(l, r)`: `cov(l, x) - cov(r, x)`
//!  5. either side `MAX` with helper `z`: `cov(z, x) + cov(left, x)`
//!  6. both `MAX0` over the same child: `cov = var`
//!  7. `MAX0(MAX0(y))` nesting: recurse into the child
//!  8. exactly one `MAX0(z)`: `cov(x, z) * mean_phi_max(-mu_z/sigma_z)`
//!  9. both `MAX0`, different children: decompose the higher-level side;
//!     on a level tie compute both directions and average
//! 10. two distinct Normal leaves: independent, `cov = 0`
//! 11. anything else is unreachable and reported as an internal error
//!
//! After computing, the result is clamped so `|corr| <= 1` and stored.
//! `covariance_expr` is the symbolic twin over the expression pool, used to
//! assemble `std_expr` for sensitivity analysis.

use crate::algebra::expr::{ExprId, ZERO};
use crate::algebra::rv::{Ctx, RvId, RvKind, EPSILON};
use crate::algebra::stats;
use crate::error::{Error, Result};

fn ordered(a: RvId, b: RvId) -> (RvId, RvId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

pub fn covariance(ctx: &mut Ctx, a: RvId, b: RvId) -> Result<f64> {
    let key = ordered(a, b);
    if let Some(&c) = ctx.cov_cache.get(&key) {
        return Ok(c);
    }
    let cov = decompose(ctx, a, b)?;
    let cov = check_covariance(ctx, cov, a, b)?;
    ctx.cov_cache.insert(key, cov);
    Ok(cov)
}

fn decompose(ctx: &mut Ctx, a: RvId, b: RvId) -> Result<f64> {
    if a == b {
        return ctx.variance(a);
    }

    if let RvKind::Add { left, right } = ctx.kind(a) {
        return Ok(covariance(ctx, left, b)? + covariance(ctx, right, b)?);
    }
    if let RvKind::Add { left, right } = ctx.kind(b) {
        return Ok(covariance(ctx, a, left)? + covariance(ctx, a, right)?);
    }

    if let RvKind::Sub { left, right } = ctx.kind(a) {
        return Ok(covariance(ctx, left, b)? - covariance(ctx, right, b)?);
    }
    if let RvKind::Sub { left, right } = ctx.kind(b) {
        return Ok(covariance(ctx, a, left)? - covariance(ctx, a, right)?);
    }

    if let RvKind::Max { left, max0, .. } = ctx.kind(a) {
        return Ok(covariance(ctx, max0, b)? + covariance(ctx, left, b)?);
    }
    if let RvKind::Max { left, max0, .. } = ctx.kind(b) {
        return Ok(covariance(ctx, max0, a)? + covariance(ctx, left, a)?);
    }

    // Rule 6: two max0 views of the same difference are the same variable.
    if let (RvKind::Max0 { arg: x }, RvKind::Max0 { arg: y }) = (ctx.kind(a), ctx.kind(b)) {
        if x == y {
            return ctx.variance(a);
        }
    }

    // Rule 7: max0(max0(y)) is max0(y); collapse the degenerate nesting.
    if let RvKind::Max0 { arg } = ctx.kind(a) {
        if matches!(ctx.kind(arg), RvKind::Max0 { .. }) {
            return covariance(ctx, arg, b);
        }
    }
    if let RvKind::Max0 { arg } = ctx.kind(b) {
        if matches!(ctx.kind(arg), RvKind::Max0 { .. }) {
            return covariance(ctx, a, arg);
        }
    }

    match (ctx.kind(a), ctx.kind(b)) {
        (RvKind::Max0 { .. }, RvKind::Max0 { .. }) => {
            // Rule 9: decompose the higher-level side; average on a tie so
            // the result cannot depend on argument order.
            let (la, lb) = (ctx.level(a), ctx.level(b));
            if la < lb {
                cov_with_max0(ctx, a, b)
            } else if lb < la {
                cov_with_max0(ctx, b, a)
            } else {
                let c0 = cov_with_max0(ctx, a, b)?;
                let c1 = cov_with_max0(ctx, b, a)?;
                Ok((c0 + c1) * 0.5)
            }
        }
        (RvKind::Max0 { .. }, _) => cov_with_max0(ctx, b, a),
        (_, RvKind::Max0 { .. }) => cov_with_max0(ctx, a, b),
        (RvKind::Normal { .. }, RvKind::Normal { .. }) => Ok(0.0),
        _ => Err(Error::internal("unreachable covariance decomposition")),
    }
}

/// Rule 8: `cov(x, max0(z)) = cov(x, z) * mean_phi_max(-mu_z/sigma_z)`.
fn cov_with_max0(ctx: &mut Ctx, x: RvId, y: RvId) -> Result<f64> {
    let z = match ctx.kind(y) {
        RvKind::Max0 { arg } => arg,
        _ => return Err(Error::internal("cov_with_max0 on a non-MAX0 node")),
    };
    let c = covariance(ctx, x, z)?;
    let mu = ctx.mean(z)?;
    let sz = ctx.variance(z)?.sqrt();
    let s = -mu / sz;
    let cov = c * stats::mean_phi_max(s);
    if cov.is_nan() {
        return Err(Error::unstable("covariance is NaN"));
    }
    Ok(cov)
}

/// Clamp so that `|corr| <= 1`; degenerate pairs fall back to zero.
fn check_covariance(ctx: &mut Ctx, cov: f64, a: RvId, b: RvId) -> Result<f64> {
    if cov.is_nan() {
        return Err(Error::unstable("covariance is NaN"));
    }
    let v0 = ctx.variance(a)?;
    let v1 = ctx.variance(b)?;
    let max_cov = (v0 * v1).sqrt();
    if max_cov < EPSILON {
        if cov >= EPSILON {
            return Ok(0.0);
        }
        return Ok(cov);
    }
    let corr = cov / max_cov;
    if corr.abs() > 1.0 {
        return Ok(corr.signum() * max_cov);
    }
    Ok(cov)
}

/// Correlation coefficient, for reporting and tests.
pub fn correlation(ctx: &mut Ctx, a: RvId, b: RvId) -> Result<f64> {
    let v0 = ctx.variance(a)?;
    let v1 = ctx.variance(b)?;
    let c = covariance(ctx, a, b)?;
    Ok(c / (v0 * v1).sqrt())
}

//// symbolic twin ////

pub fn covariance_expr(ctx: &mut Ctx, a: RvId, b: RvId) -> Result<ExprId> {
    let key = ordered(a, b);
    if let Some(&e) = ctx.cov_expr_cache.get(&key) {
        return Ok(e);
    }
    let e = decompose_expr(ctx, a, b)?;
    ctx.cov_expr_cache.insert(key, e);
    Ok(e)
}

fn decompose_expr(ctx: &mut Ctx, a: RvId, b: RvId) -> Result<ExprId> {
    if a == b {
        return ctx.var_expr(a);
    }

    if let RvKind::Add { left, right } = ctx.kind(a) {
        let cl = covariance_expr(ctx, left, b)?;
        let cr = covariance_expr(ctx, right, b)?;
        return Ok(ctx.exprs.add(cl, cr));
    }
    if let RvKind::Add { left, right } = ctx.kind(b) {
        let cl = covariance_expr(ctx, a, left)?;
        let cr = covariance_expr(ctx, a, right)?;
        return Ok(ctx.exprs.add(cl, cr));
    }

    if let RvKind::Sub { left, right } = ctx.kind(a) {
        let cl = covariance_expr(ctx, left, b)?;
        let cr = covariance_expr(ctx, right, b)?;
        return Ok(ctx.exprs.sub(cl, cr));
    }
    if let RvKind::Sub { left, right } = ctx.kind(b) {
        let cl = covariance_expr(ctx, a, left)?;
        let cr = covariance_expr(ctx, a, right)?;
        return Ok(ctx.exprs.sub(cl, cr));
    }

    if let RvKind::Max { left, max0, .. } = ctx.kind(a) {
        let cz = covariance_expr(ctx, max0, b)?;
        let cl = covariance_expr(ctx, left, b)?;
        return Ok(ctx.exprs.add(cz, cl));
    }
    if let RvKind::Max { left, max0, .. } = ctx.kind(b) {
        let cz = covariance_expr(ctx, max0, a)?;
        let cl = covariance_expr(ctx, left, a)?;
        return Ok(ctx.exprs.add(cz, cl));
    }

    if let (RvKind::Max0 { arg: x }, RvKind::Max0 { arg: y }) = (ctx.kind(a), ctx.kind(b)) {
        if x == y {
            return ctx.var_expr(a);
        }
    }

    if let RvKind::Max0 { arg } = ctx.kind(a) {
        if matches!(ctx.kind(arg), RvKind::Max0 { .. }) {
            return covariance_expr(ctx, arg, b);
        }
    }
    if let RvKind::Max0 { arg } = ctx.kind(b) {
        if matches!(ctx.kind(arg), RvKind::Max0 { .. }) {
            return covariance_expr(ctx, a, arg);
        }
    }

    match (ctx.kind(a), ctx.kind(b)) {
        (RvKind::Max0 { .. }, RvKind::Max0 { .. }) => {
            let (la, lb) = (ctx.level(a), ctx.level(b));
            if la < lb {
                cov_with_max0_expr(ctx, a, b)
            } else if lb < la {
                cov_with_max0_expr(ctx, b, a)
            } else {
                let e0 = cov_with_max0_expr(ctx, a, b)?;
                let e1 = cov_with_max0_expr(ctx, b, a)?;
                let sum = ctx.exprs.add(e0, e1);
                let half = ctx.exprs.constant(0.5);
                Ok(ctx.exprs.mul(half, sum))
            }
        }
        (RvKind::Max0 { .. }, _) => cov_with_max0_expr(ctx, b, a),
        (_, RvKind::Max0 { .. }) => cov_with_max0_expr(ctx, a, b),
        (RvKind::Normal { .. }, RvKind::Normal { .. }) => Ok(ZERO),
        _ => Err(Error::internal("unreachable covariance decomposition")),
    }
}

fn cov_with_max0_expr(ctx: &mut Ctx, x: RvId, y: RvId) -> Result<ExprId> {
    let z = match ctx.kind(y) {
        RvKind::Max0 { arg } => arg,
        _ => return Err(Error::internal("cov_with_max0 on a non-MAX0 node")),
    };
    let c = covariance_expr(ctx, x, z)?;
    let mu = ctx.mean_expr(z)?;
    let sg = ctx.std_expr(z)?;
    let s = ctx.shift_expr(mu, sg)?;
    let m = ctx.mean_phi_max_expr(s)?;
    Ok(ctx.exprs.mul(c, m))
}
