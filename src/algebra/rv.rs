//! The random-variable DAG and its owning context.
//!
//! Arrival times are nodes in a shared DAG held by [`Ctx`]: `Normal` leaves
//! plus `Add`, `Sub`, `Max` and `Max0` combinators. A `Max` node carries the
//! auxiliary child `max0(right - left)` built at construction, so that
//! `MAX(a, b) = a + max0(b - a)`, the identity the whole moment algebra
//! hangs on.
//!
//! `mean()` and `variance()` are computed once and memoized; every variance
//! observable by a caller is at least [`EPSILON`]. Each node can also
//! produce symbolic `mean_expr`/`std_expr` twins over the expression pool,
//! which is what the sensitivity analyzer differentiates.

use std::collections::BTreeMap;

use crate::algebra::cov;
use crate::algebra::expr::{ExprId, ExprPool, ONE};
use crate::algebra::stats;
use crate::error::{Error, Result};

/// Variance floor: no caller ever observes a variance below this.
pub const EPSILON: f64 = 1e-6;

/// Slope of the logistic CDF surrogate used in symbolic moments; the
/// expression op set has no `Phi`, so gradients flow through
/// `1/(1 + exp(-1.702 s))` instead.
const LOGISTIC_SLOPE: f64 = 1.702;

/// Index of a random-variable node in its context.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RvId(u32);

impl RvId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug)]
pub enum RvKind {
    Normal {
        mean: f64,
        variance: f64,
        mean_var: ExprId,
        std_var: ExprId,
    },
    Add {
        left: RvId,
        right: RvId,
    },
    Sub {
        left: RvId,
        right: RvId,
    },
    Max {
        left: RvId,
        right: RvId,
        max0: RvId,
    },
    Max0 {
        arg: RvId,
    },
}

#[derive(Debug)]
struct RvNode {
    kind: RvKind,
    name: Option<String>,
    level: u32,
    mean: Option<f64>,
    variance: Option<f64>,
    mean_expr: Option<ExprId>,
    var_expr: Option<ExprId>,
    std_expr: Option<ExprId>,
}

impl RvNode {
    fn new(kind: RvKind, level: u32) -> Self {
        Self {
            kind,
            name: None,
            level,
            mean: None,
            variance: None,
            mean_expr: None,
            var_expr: None,
            std_expr: None,
        }
    }
}

/// Owning context for one analysis run: the RV arena, the expression pool,
/// and the covariance caches. There are no process-wide singletons; drop the
/// context and everything goes with it.
#[derive(Debug)]
pub struct Ctx {
    nodes: Vec<RvNode>,
    pub exprs: ExprPool,
    pub(crate) cov_cache: BTreeMap<(RvId, RvId), f64>,
    pub(crate) cov_expr_cache: BTreeMap<(RvId, RvId), ExprId>,
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}

impl Ctx {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            exprs: ExprPool::new(),
            cov_cache: BTreeMap::new(),
            cov_expr_cache: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, kind: RvKind, level: u32) -> RvId {
        let id = RvId(self.nodes.len() as u32);
        self.nodes.push(RvNode::new(kind, level));
        id
    }

    /// A fresh Normal leaf. Two calls with identical parameters produce
    /// independent variables; only reusing the returned id keeps
    /// correlation.
    pub fn normal(&mut self, mean: f64, variance: f64) -> Result<RvId> {
        if variance < 0.0 {
            return Err(Error::math("Normal: negative variance"));
        }
        let mean_var = self.exprs.variable();
        self.exprs.set_value(mean_var, mean);
        let std_var = self.exprs.variable();
        self.exprs.set_value(std_var, variance.max(EPSILON).sqrt());
        Ok(self.push(
            RvKind::Normal {
                mean,
                variance,
                mean_var,
                std_var,
            },
            0,
        ))
    }

    /// Deep copy of a Normal leaf: a fresh, uncorrelated variable with its
    /// own expression variables. Only leaves can be cloned; composite nodes
    /// share by id.
    pub fn clone_normal(&mut self, id: RvId) -> Result<RvId> {
        match self.kind(id) {
            RvKind::Normal { mean, variance, .. } => self.normal(mean, variance),
            _ => Err(Error::internal("clone of a non-Normal node")),
        }
    }

    pub fn add(&mut self, a: RvId, b: RvId) -> RvId {
        let level = self.level(a).max(self.level(b));
        self.push(RvKind::Add { left: a, right: b }, level)
    }

    pub fn sub(&mut self, a: RvId, b: RvId) -> RvId {
        let level = self.level(a).max(self.level(b));
        self.push(RvKind::Sub { left: a, right: b }, level)
    }

    pub fn max0(&mut self, arg: RvId) -> RvId {
        let level = self.level(arg) + 1;
        self.push(RvKind::Max0 { arg }, level)
    }

    /// `MAX(a, b)`, decomposed at construction as `a + max0(b - a)`.
    pub fn max(&mut self, a: RvId, b: RvId) -> RvId {
        let diff = self.sub(b, a);
        let z = self.max0(diff);
        let level = self.level(a).max(self.level(b)) + 1;
        self.push(
            RvKind::Max {
                left: a,
                right: b,
                max0: z,
            },
            level,
        )
    }

    pub fn kind(&self, id: RvId) -> RvKind {
        self.nodes[id.idx()].kind
    }

    pub fn level(&self, id: RvId) -> u32 {
        self.nodes[id.idx()].level
    }

    pub fn name(&self, id: RvId) -> Option<&str> {
        self.nodes[id.idx()].name.as_deref()
    }

    pub fn set_name(&mut self, id: RvId, name: impl Into<String>) {
        self.nodes[id.idx()].name = Some(name.into());
    }

    /// The raw leaf variance, unclamped. `None` for composite nodes.
    pub fn leaf_variance(&self, id: RvId) -> Option<f64> {
        match self.kind(id) {
            RvKind::Normal { variance, .. } => Some(variance),
            _ => None,
        }
    }

    /// The `(mu, sigma)` expression variables of a Normal leaf.
    pub fn normal_vars(&self, id: RvId) -> Option<(ExprId, ExprId)> {
        match self.kind(id) {
            RvKind::Normal {
                mean_var, std_var, ..
            } => Some((mean_var, std_var)),
            _ => None,
        }
    }

    pub fn mean(&mut self, id: RvId) -> Result<f64> {
        if let Some(m) = self.nodes[id.idx()].mean {
            return Ok(m);
        }
        let m = match self.kind(id) {
            RvKind::Normal { mean, .. } => mean,
            RvKind::Add { left, right } => self.mean(left)? + self.mean(right)?,
            RvKind::Sub { left, right } => self.mean(left)? - self.mean(right)?,
            RvKind::Max { left, max0, .. } => self.mean(left)? + self.mean(max0)?,
            RvKind::Max0 { arg } => {
                let mu = self.mean(arg)?;
                let sg = self.variance(arg)?.sqrt();
                let s = -mu / sg;
                mu + sg * stats::mean_max(s)
            }
        };
        if m.is_nan() {
            return Err(Error::unstable("mean is NaN"));
        }
        self.nodes[id.idx()].mean = Some(m);
        Ok(m)
    }

    pub fn variance(&mut self, id: RvId) -> Result<f64> {
        if let Some(v) = self.nodes[id.idx()].variance {
            return Ok(v);
        }
        let v = match self.kind(id) {
            RvKind::Normal { variance, .. } => variance,
            RvKind::Add { left, right } => {
                let vl = self.variance(left)?;
                let vr = self.variance(right)?;
                let c = cov::covariance(self, left, right)?;
                vl + 2.0 * c + vr
            }
            RvKind::Sub { left, right } => {
                let vl = self.variance(left)?;
                let vr = self.variance(right)?;
                let c = cov::covariance(self, left, right)?;
                vl - 2.0 * c + vr
            }
            RvKind::Max { left, max0, .. } => {
                let vl = self.variance(left)?;
                let vz = self.variance(max0)?;
                let c = cov::covariance(self, left, max0)?;
                vl + 2.0 * c + vz
            }
            RvKind::Max0 { arg } => {
                let mu = self.mean(arg)?;
                let va = self.variance(arg)?;
                let sg = va.sqrt();
                let s = -mu / sg;
                let m = stats::mean_max(s);
                va * (stats::mean_max2(s) - m * m)
            }
        };
        let v = check_variance(v)?;
        self.nodes[id.idx()].variance = Some(v);
        Ok(v)
    }

    pub fn std_dev(&mut self, id: RvId) -> Result<f64> {
        Ok(self.variance(id)?.sqrt())
    }

    //// symbolic moments ////

    pub fn mean_expr(&mut self, id: RvId) -> Result<ExprId> {
        if let Some(e) = self.nodes[id.idx()].mean_expr {
            return Ok(e);
        }
        let e = match self.kind(id) {
            RvKind::Normal { mean_var, .. } => mean_var,
            RvKind::Add { left, right } => {
                let l = self.mean_expr(left)?;
                let r = self.mean_expr(right)?;
                self.exprs.add(l, r)
            }
            RvKind::Sub { left, right } => {
                let l = self.mean_expr(left)?;
                let r = self.mean_expr(right)?;
                self.exprs.sub(l, r)
            }
            RvKind::Max { left, max0, .. } => {
                let l = self.mean_expr(left)?;
                let z = self.mean_expr(max0)?;
                self.exprs.add(l, z)
            }
            RvKind::Max0 { arg } => {
                // mu + sigma * M(-mu/sigma)
                let mu = self.mean_expr(arg)?;
                let sg = self.std_expr(arg)?;
                let s = self.shift_expr(mu, sg)?;
                let m = self.mean_max_expr(s)?;
                let sgm = self.exprs.mul(sg, m);
                self.exprs.add(mu, sgm)
            }
        };
        self.nodes[id.idx()].mean_expr = Some(e);
        Ok(e)
    }

    pub fn var_expr(&mut self, id: RvId) -> Result<ExprId> {
        if let Some(e) = self.nodes[id.idx()].var_expr {
            return Ok(e);
        }
        let e = match self.kind(id) {
            RvKind::Normal { std_var, .. } => self.exprs.mul(std_var, std_var),
            RvKind::Add { left, right } => {
                let c = cov::covariance_expr(self, left, right)?;
                self.combine_var_expr(left, right, c, false)?
            }
            RvKind::Sub { left, right } => {
                let c = cov::covariance_expr(self, left, right)?;
                self.combine_var_expr(left, right, c, true)?
            }
            RvKind::Max { left, max0, .. } => {
                let c = cov::covariance_expr(self, left, max0)?;
                self.combine_var_expr(left, max0, c, false)?
            }
            RvKind::Max0 { arg } => {
                // sigma^2 * (M2(s) - M(s)^2)
                let mu = self.mean_expr(arg)?;
                let sg = self.std_expr(arg)?;
                let s = self.shift_expr(mu, sg)?;
                let m = self.mean_max_expr(s)?;
                let m2 = self.mean_max2_expr(s)?;
                let mm = self.exprs.mul(m, m);
                let spread = self.exprs.sub(m2, mm);
                let sg2 = self.exprs.mul(sg, sg);
                self.exprs.mul(sg2, spread)
            }
        };
        self.nodes[id.idx()].var_expr = Some(e);
        Ok(e)
    }

    pub fn std_expr(&mut self, id: RvId) -> Result<ExprId> {
        if let Some(e) = self.nodes[id.idx()].std_expr {
            return Ok(e);
        }
        let v = self.var_expr(id)?;
        let half = self.exprs.constant(0.5);
        let e = self.exprs.pow(v, half)?;
        self.nodes[id.idx()].std_expr = Some(e);
        Ok(e)
    }

    /// `var(a) +- 2 cov + var(b)` over expressions.
    fn combine_var_expr(
        &mut self,
        a: RvId,
        b: RvId,
        cov: ExprId,
        minus: bool,
    ) -> Result<ExprId> {
        let va = self.var_expr(a)?;
        let vb = self.var_expr(b)?;
        let two = self.exprs.constant(2.0);
        let c2 = self.exprs.mul(two, cov);
        let vv = self.exprs.add(va, vb);
        Ok(if minus {
            self.exprs.sub(vv, c2)
        } else {
            self.exprs.add(vv, c2)
        })
    }

    /// `s = -mu/sigma` over expressions.
    pub(crate) fn shift_expr(&mut self, mu: ExprId, sigma: ExprId) -> Result<ExprId> {
        let ratio = self.exprs.div(mu, sigma)?;
        Ok(self.exprs.neg(ratio))
    }

    /// Standard normal density, exactly: `exp(-s^2/2)/sqrt(2 pi)`.
    pub(crate) fn phi_expr(&mut self, s: ExprId) -> Result<ExprId> {
        let s2 = self.exprs.mul(s, s);
        let half = self.exprs.constant(0.5);
        let hs2 = self.exprs.mul(half, s2);
        let neg = self.exprs.neg(hs2);
        let e = self.exprs.exp(neg);
        let c = self.exprs.constant(stats::INV_SQRT_2PI);
        Ok(self.exprs.mul(c, e))
    }

    /// Logistic surrogate for the standard normal CDF.
    pub(crate) fn cap_phi_expr(&mut self, s: ExprId) -> Result<ExprId> {
        let k = self.exprs.constant(LOGISTIC_SLOPE);
        let ks = self.exprs.mul(k, s);
        let nks = self.exprs.neg(ks);
        let e = self.exprs.exp(nks);
        let denom = self.exprs.add(ONE, e);
        self.exprs.div(ONE, denom)
    }

    /// `M(s) = phi(s) + s*Phi(s)` over expressions.
    pub(crate) fn mean_max_expr(&mut self, s: ExprId) -> Result<ExprId> {
        let p = self.phi_expr(s)?;
        let c = self.cap_phi_expr(s)?;
        let sc = self.exprs.mul(s, c);
        Ok(self.exprs.add(p, sc))
    }

    /// `M2(s) = 1 + s*phi(s) + (s^2 - 1)*Phi(s)` over expressions.
    pub(crate) fn mean_max2_expr(&mut self, s: ExprId) -> Result<ExprId> {
        let p = self.phi_expr(s)?;
        let c = self.cap_phi_expr(s)?;
        let sp = self.exprs.mul(s, p);
        let s2 = self.exprs.mul(s, s);
        let s2m1 = self.exprs.sub(s2, ONE);
        let tail = self.exprs.mul(s2m1, c);
        let head = self.exprs.add(ONE, sp);
        Ok(self.exprs.add(head, tail))
    }

    /// `phi(s) + s*(1 - Phi(s))` over expressions.
    pub(crate) fn mean_phi_max_expr(&mut self, s: ExprId) -> Result<ExprId> {
        let p = self.phi_expr(s)?;
        let c = self.cap_phi_expr(s)?;
        let comp = self.exprs.sub(ONE, c);
        let tail = self.exprs.mul(s, comp);
        Ok(self.exprs.add(p, tail))
    }
}

fn check_variance(v: f64) -> Result<f64> {
    if v.is_nan() {
        return Err(Error::unstable("variance is NaN"));
    }
    if v.abs() < EPSILON {
        return Ok(EPSILON);
    }
    if v < 0.0 {
        return Err(Error::math("negative variance"));
    }
    Ok(v)
}
