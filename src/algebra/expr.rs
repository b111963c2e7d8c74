//! Differentiable real-valued expression DAG.
//!
//! Expressions live in an [`ExprPool`] arena and are referenced by
//! [`ExprId`]. Construction applies the usual identity simplifications
//! (`x*0 = 0`, `x*1 = x`, `0+x = x`, constant folding), evaluation is lazy
//! and cached, and re-binding a variable invalidates every transitive
//! parent through back-edges.
//!
//! Two differentiation modes are provided: [`ExprPool::derive`] builds a
//! closed-form derivative expression (memoized per node pair), and
//! [`ExprPool::backward`] runs an iterative reverse-mode pass that
//! accumulates `d(output)/d(node)` into every reachable node, the right
//! tool when there are far more inputs than outputs.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Index of an expression node in its pool.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ExprId(u32);

impl ExprId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// The interned constant 0.0.
pub const ZERO: ExprId = ExprId(0);
/// The interned constant 1.0.
pub const ONE: ExprId = ExprId(1);
/// The interned constant -1.0.
pub const NEG_ONE: ExprId = ExprId(2);

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ExprOp {
    Const(f64),
    Variable,
    Plus(ExprId, ExprId),
    Minus(ExprId, ExprId),
    Mul(ExprId, ExprId),
    Div(ExprId, ExprId),
    Power(ExprId, ExprId),
    Exp(ExprId),
    Log(ExprId),
}

#[derive(Debug)]
struct ExprNode {
    op: ExprOp,
    value: Option<f64>,
    grad: f64,
    parents: Vec<ExprId>,
}

/// Arena of expression nodes plus the forward-derivative memo table.
#[derive(Debug)]
pub struct ExprPool {
    nodes: Vec<ExprNode>,
    derivatives: BTreeMap<(ExprId, ExprId), ExprId>,
}

impl Default for ExprPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprPool {
    pub fn new() -> Self {
        let mut pool = Self {
            nodes: Vec::new(),
            derivatives: BTreeMap::new(),
        };
        // Interned constants; identity simplifications compare against these
        // ids directly.
        pool.push(ExprOp::Const(0.0), Some(0.0));
        pool.push(ExprOp::Const(1.0), Some(1.0));
        pool.push(ExprOp::Const(-1.0), Some(-1.0));
        pool
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, op: ExprOp, value: Option<f64>) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(ExprNode {
            op,
            value,
            grad: 0.0,
            parents: Vec::new(),
        });
        for child in children_of(op) {
            self.nodes[child.idx()].parents.push(id);
        }
        id
    }

    fn const_value(&self, id: ExprId) -> Option<f64> {
        match self.nodes[id.idx()].op {
            ExprOp::Const(v) => Some(v),
            _ => None,
        }
    }

    fn is_const(&self, id: ExprId) -> bool {
        matches!(self.nodes[id.idx()].op, ExprOp::Const(_))
    }

    /// A constant node. 0, 1 and -1 resolve to the interned ids.
    pub fn constant(&mut self, v: f64) -> ExprId {
        if v == 0.0 {
            ZERO
        } else if v == 1.0 {
            ONE
        } else if v == -1.0 {
            NEG_ONE
        } else {
            self.push(ExprOp::Const(v), Some(v))
        }
    }

    /// A fresh unbound variable.
    pub fn variable(&mut self) -> ExprId {
        self.push(ExprOp::Variable, None)
    }

    pub fn add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        if a == ZERO {
            return b;
        }
        if b == ZERO {
            return a;
        }
        if let (Some(x), Some(y)) = (self.const_value(a), self.const_value(b)) {
            return self.constant(x + y);
        }
        self.push(ExprOp::Plus(a, b), None)
    }

    pub fn sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        if a == ZERO {
            return self.neg(b);
        }
        if b == ZERO {
            return a;
        }
        if let (Some(x), Some(y)) = (self.const_value(a), self.const_value(b)) {
            return self.constant(x - y);
        }
        self.push(ExprOp::Minus(a, b), None)
    }

    pub fn neg(&mut self, a: ExprId) -> ExprId {
        if a == ZERO {
            return ZERO;
        }
        if a == NEG_ONE {
            return ONE;
        }
        if let Some(x) = self.const_value(a) {
            return self.constant(-x);
        }
        self.push(ExprOp::Mul(NEG_ONE, a), None)
    }

    pub fn mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        if a == ZERO || b == ZERO {
            return ZERO;
        }
        if a == ONE {
            return b;
        }
        if b == ONE {
            return a;
        }
        if let (Some(x), Some(y)) = (self.const_value(a), self.const_value(b)) {
            return self.constant(x * y);
        }
        self.push(ExprOp::Mul(a, b), None)
    }

    pub fn div(&mut self, a: ExprId, b: ExprId) -> Result<ExprId> {
        if b == ZERO {
            return Err(Error::math("division by zero"));
        }
        if a == ZERO {
            return Ok(ZERO);
        }
        if b == ONE {
            return Ok(a);
        }
        if b == NEG_ONE {
            return Ok(self.neg(a));
        }
        if a == b {
            return Ok(ONE);
        }
        if let (Some(x), Some(y)) = (self.const_value(a), self.const_value(b)) {
            return Ok(self.constant(x / y));
        }
        Ok(self.push(ExprOp::Div(a, b), None))
    }

    pub fn pow(&mut self, a: ExprId, b: ExprId) -> Result<ExprId> {
        if b == ZERO {
            if a == ZERO {
                return Err(Error::math("0^0 is ambiguous"));
            }
            return Ok(ONE);
        }
        if b == ONE {
            return Ok(a);
        }
        if a == ZERO {
            return Ok(ZERO);
        }
        if let (Some(x), Some(y)) = (self.const_value(a), self.const_value(b)) {
            return Ok(self.constant(checked_pow(x, y)?));
        }
        Ok(self.push(ExprOp::Power(a, b), None))
    }

    pub fn exp(&mut self, a: ExprId) -> ExprId {
        self.push(ExprOp::Exp(a), None)
    }

    pub fn log(&mut self, a: ExprId) -> ExprId {
        self.push(ExprOp::Log(a), None)
    }

    pub fn op(&self, id: ExprId) -> ExprOp {
        self.nodes[id.idx()].op
    }

    pub fn is_set(&self, id: ExprId) -> bool {
        self.nodes[id.idx()].value.is_some()
    }

    /// Evaluate the expression, caching every intermediate value.
    pub fn value(&mut self, id: ExprId) -> Result<f64> {
        let mut stack = vec![id];
        while let Some(&top) = stack.last() {
            if self.nodes[top.idx()].value.is_some() {
                stack.pop();
                continue;
            }
            let op = self.nodes[top.idx()].op;
            let v = match op {
                ExprOp::Const(v) => v,
                ExprOp::Variable => return Err(Error::ValueUnset),
                ExprOp::Plus(l, r)
                | ExprOp::Minus(l, r)
                | ExprOp::Mul(l, r)
                | ExprOp::Div(l, r)
                | ExprOp::Power(l, r) => {
                    let lv = match self.nodes[l.idx()].value {
                        Some(v) => v,
                        None => {
                            stack.push(l);
                            continue;
                        }
                    };
                    let rv = match self.nodes[r.idx()].value {
                        Some(v) => v,
                        None => {
                            stack.push(r);
                            continue;
                        }
                    };
                    match op {
                        ExprOp::Plus(..) => lv + rv,
                        ExprOp::Minus(..) => lv - rv,
                        ExprOp::Mul(..) => lv * rv,
                        ExprOp::Div(..) => {
                            if rv == 0.0 {
                                return Err(Error::math("division by zero"));
                            }
                            lv / rv
                        }
                        ExprOp::Power(..) => checked_pow(lv, rv)?,
                        _ => unreachable!(),
                    }
                }
                ExprOp::Exp(l) | ExprOp::Log(l) => {
                    let lv = match self.nodes[l.idx()].value {
                        Some(v) => v,
                        None => {
                            stack.push(l);
                            continue;
                        }
                    };
                    match op {
                        ExprOp::Exp(..) => lv.exp(),
                        ExprOp::Log(..) => {
                            if lv <= 0.0 {
                                return Err(Error::math("log of non-positive value"));
                            }
                            lv.ln()
                        }
                        _ => unreachable!(),
                    }
                }
            };
            self.nodes[top.idx()].value = Some(v);
            stack.pop();
        }
        Ok(self.nodes[id.idx()].value.expect("value cached by loop"))
    }

    /// Bind a variable and invalidate every cached value that depends on it.
    pub fn set_value(&mut self, id: ExprId, v: f64) {
        self.invalidate_parents(id);
        self.nodes[id.idx()].value = Some(v);
    }

    fn invalidate_parents(&mut self, id: ExprId) {
        let mut queue: Vec<ExprId> = self.nodes[id.idx()].parents.clone();
        while let Some(p) = queue.pop() {
            // An unset node's ancestors are already unset.
            if self.nodes[p.idx()].value.take().is_some() {
                queue.extend(self.nodes[p.idx()].parents.iter().copied());
            }
        }
    }

    /// Gradient accumulated by the most recent [`Self::backward`] pass.
    pub fn gradient(&self, id: ExprId) -> f64 {
        self.nodes[id.idx()].grad
    }

    /// Reset every gradient accumulator in the pool.
    pub fn zero_all_grad(&mut self) {
        for node in &mut self.nodes {
            node.grad = 0.0;
        }
    }

    /// Reverse-mode pass from `id`: seeds `grad(id) = 1` and pushes
    /// `d(id)/d(n)` into every node `n` reachable from it. Gradients of
    /// nodes not reachable from `id` are left untouched; call
    /// [`Self::zero_all_grad`] first when starting a fresh computation.
    pub fn backward(&mut self, id: ExprId) -> Result<()> {
        self.value(id)?;

        // Post-order over the reachable sub-DAG, children first.
        let mut order = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![(id, false)];
        while let Some((n, expanded)) = stack.pop() {
            if expanded {
                order.push(n);
                continue;
            }
            if visited[n.idx()] {
                continue;
            }
            visited[n.idx()] = true;
            stack.push((n, true));
            for child in children_of(self.nodes[n.idx()].op) {
                if !visited[child.idx()] {
                    stack.push((child, false));
                }
            }
        }

        for &n in &order {
            self.nodes[n.idx()].grad = 0.0;
        }
        self.nodes[id.idx()].grad = 1.0;

        for &n in order.iter().rev() {
            let g = self.nodes[n.idx()].grad;
            if g == 0.0 {
                continue;
            }
            match self.nodes[n.idx()].op {
                ExprOp::Const(_) | ExprOp::Variable => {}
                ExprOp::Plus(l, r) => {
                    self.accumulate(l, g);
                    self.accumulate(r, g);
                }
                ExprOp::Minus(l, r) => {
                    self.accumulate(l, g);
                    self.accumulate(r, -g);
                }
                ExprOp::Mul(l, r) => {
                    let lv = self.cached(l);
                    let rv = self.cached(r);
                    self.accumulate(l, g * rv);
                    self.accumulate(r, g * lv);
                }
                ExprOp::Div(l, r) => {
                    let lv = self.cached(l);
                    let rv = self.cached(r);
                    self.accumulate(l, g / rv);
                    self.accumulate(r, -g * lv / (rv * rv));
                }
                ExprOp::Power(l, r) => {
                    let lv = self.cached(l);
                    let rv = self.cached(r);
                    let val = self.cached(n);
                    self.accumulate(l, g * rv * lv.powf(rv - 1.0));
                    if !self.is_const(r) && lv > 0.0 {
                        self.accumulate(r, g * val * lv.ln());
                    }
                }
                ExprOp::Exp(l) => {
                    let val = self.cached(n);
                    self.accumulate(l, g * val);
                }
                ExprOp::Log(l) => {
                    let lv = self.cached(l);
                    self.accumulate(l, g / lv);
                }
            }
        }
        Ok(())
    }

    fn cached(&self, id: ExprId) -> f64 {
        self.nodes[id.idx()]
            .value
            .expect("value cached by forward pass")
    }

    fn accumulate(&mut self, id: ExprId, g: f64) {
        // Gradients of constants are meaningless; skipping them also keeps
        // `a^c` clear of `ln(a)` domain trouble.
        if !self.is_const(id) {
            self.nodes[id.idx()].grad += g;
        }
    }

    /// Forward-mode symbolic derivative `d(id)/d(wrt)` as a new expression.
    /// Memoized per `(id, wrt)` pair.
    pub fn derive(&mut self, id: ExprId, wrt: ExprId) -> Result<ExprId> {
        if id == wrt {
            return Ok(ONE);
        }
        if let Some(&d) = self.derivatives.get(&(id, wrt)) {
            return Ok(d);
        }
        let d = match self.nodes[id.idx()].op {
            ExprOp::Const(_) | ExprOp::Variable => ZERO,
            ExprOp::Plus(l, r) => {
                let dl = self.derive(l, wrt)?;
                let dr = self.derive(r, wrt)?;
                self.add(dl, dr)
            }
            ExprOp::Minus(l, r) => {
                let dl = self.derive(l, wrt)?;
                let dr = self.derive(r, wrt)?;
                self.sub(dl, dr)
            }
            ExprOp::Mul(l, r) => {
                let dl = self.derive(l, wrt)?;
                let dr = self.derive(r, wrt)?;
                let t0 = self.mul(dl, r);
                let t1 = self.mul(l, dr);
                self.add(t0, t1)
            }
            ExprOp::Div(l, r) => {
                // (dl - x*dr) / r
                let dl = self.derive(l, wrt)?;
                let dr = self.derive(r, wrt)?;
                let xdr = self.mul(id, dr);
                let num = self.sub(dl, xdr);
                self.div(num, r)?
            }
            ExprOp::Power(l, r) => {
                // x * (dl/l*r + dr*log(l))
                let dl = self.derive(l, wrt)?;
                let dr = self.derive(r, wrt)?;
                let dl_over_l = self.div(dl, l)?;
                let t0 = self.mul(dl_over_l, r);
                let log_l = self.log(l);
                let t1 = self.mul(dr, log_l);
                let sum = self.add(t0, t1);
                self.mul(id, sum)
            }
            ExprOp::Exp(l) => {
                let dl = self.derive(l, wrt)?;
                self.mul(id, dl)
            }
            ExprOp::Log(l) => {
                let dl = self.derive(l, wrt)?;
                self.div(dl, l)?
            }
        };
        self.derivatives.insert((id, wrt), d);
        Ok(d)
    }
}

fn children_of(op: ExprOp) -> impl Iterator<Item = ExprId> {
    let (a, b) = match op {
        ExprOp::Const(_) | ExprOp::Variable => (None, None),
        ExprOp::Plus(l, r)
        | ExprOp::Minus(l, r)
        | ExprOp::Mul(l, r)
        | ExprOp::Div(l, r)
        | ExprOp::Power(l, r) => (Some(l), Some(r)),
        ExprOp::Exp(l) | ExprOp::Log(l) => (Some(l), None),
    };
    a.into_iter().chain(b)
}

fn checked_pow(base: f64, exponent: f64) -> Result<f64> {
    if base == 0.0 && exponent == 0.0 {
        return Err(Error::math("0^0 is ambiguous"));
    }
    if base == 0.0 && exponent < 0.0 {
        return Err(Error::math("zero raised to a negative power"));
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(Error::math("negative base with fractional exponent"));
    }
    Ok(base.powf(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_constants() {
        let mut pool = ExprPool::new();
        assert_eq!(pool.constant(0.0), ZERO);
        assert_eq!(pool.constant(1.0), ONE);
        assert_eq!(pool.constant(-1.0), NEG_ONE);
        let two = pool.constant(2.0);
        assert_eq!(pool.value(two).unwrap(), 2.0);
    }

    #[test]
    fn test_identity_simplification() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        assert_eq!(pool.add(ZERO, x), x);
        assert_eq!(pool.add(x, ZERO), x);
        assert_eq!(pool.mul(ONE, x), x);
        assert_eq!(pool.mul(x, ZERO), ZERO);
        assert_eq!(pool.sub(x, ZERO), x);
        assert_eq!(pool.div(x, ONE).unwrap(), x);
        assert_eq!(pool.div(x, x).unwrap(), ONE);
        assert_eq!(pool.pow(x, ONE).unwrap(), x);
        assert_eq!(pool.pow(x, ZERO).unwrap(), ONE);
    }

    #[test]
    fn test_constant_folding() {
        let mut pool = ExprPool::new();
        let a = pool.constant(3.0);
        let b = pool.constant(4.0);
        let s = pool.add(a, b);
        assert_eq!(pool.value(s).unwrap(), 7.0);
        let p = pool.mul(a, b);
        assert_eq!(pool.value(p).unwrap(), 12.0);
    }

    #[test]
    fn test_value_evaluation() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        let y = pool.variable();
        pool.set_value(x, 2.0);
        pool.set_value(y, 5.0);
        let xy = pool.mul(x, y);
        let e = pool.exp(x);
        let f = pool.add(xy, e);
        let expected = 10.0 + 2f64.exp();
        assert!((pool.value(f).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unset_variable_errors() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        let two = pool.constant(2.0);
        let f = pool.add(x, two);
        assert!(matches!(pool.value(f), Err(Error::ValueUnset)));
    }

    #[test]
    fn test_division_by_zero_value() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        let y = pool.variable();
        pool.set_value(x, 1.0);
        pool.set_value(y, 0.0);
        let f = pool.div(x, y).unwrap();
        assert!(matches!(pool.value(f), Err(Error::MathDomain { .. })));
    }

    #[test]
    fn test_division_by_const_zero_rejected_at_construction() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        assert!(matches!(pool.div(x, ZERO), Err(Error::MathDomain { .. })));
    }

    #[test]
    fn test_log_domain() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        pool.set_value(x, -1.0);
        let f = pool.log(x);
        assert!(matches!(pool.value(f), Err(Error::MathDomain { .. })));
        pool.set_value(x, 0.0);
        assert!(matches!(pool.value(f), Err(Error::MathDomain { .. })));
    }

    #[test]
    fn test_zero_pow_zero_rejected() {
        let mut pool = ExprPool::new();
        assert!(matches!(pool.pow(ZERO, ZERO), Err(Error::MathDomain { .. })));
        let x = pool.variable();
        let y = pool.variable();
        pool.set_value(x, 0.0);
        pool.set_value(y, 0.0);
        let f = pool.pow(x, y).unwrap();
        assert!(matches!(pool.value(f), Err(Error::MathDomain { .. })));
    }

    #[test]
    fn test_fractional_power_of_negative_base() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        pool.set_value(x, -4.0);
        let half = pool.constant(0.5);
        let f = pool.pow(x, half).unwrap();
        assert!(matches!(pool.value(f), Err(Error::MathDomain { .. })));
    }

    #[test]
    fn test_invalidation_on_set() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        let y = pool.variable();
        pool.set_value(x, 2.0);
        pool.set_value(y, 3.0);
        let f = pool.mul(x, y);
        let g = pool.add(f, ONE);
        assert_eq!(pool.value(g).unwrap(), 7.0);
        pool.set_value(x, 10.0);
        assert!(!pool.is_set(f));
        assert!(!pool.is_set(g));
        assert_eq!(pool.value(g).unwrap(), 31.0);
        // y was untouched and keeps its cached value.
        assert!(pool.is_set(y));
    }

    #[test]
    fn test_backward_product_rule() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        let y = pool.variable();
        pool.set_value(x, 2.0);
        pool.set_value(y, 5.0);
        // f = x*y + exp(x)
        let xy = pool.mul(x, y);
        let ex = pool.exp(x);
        let f = pool.add(xy, ex);
        pool.zero_all_grad();
        pool.backward(f).unwrap();
        assert!((pool.gradient(x) - (5.0 + 2f64.exp())).abs() < 1e-12);
        assert!((pool.gradient(y) - 2.0).abs() < 1e-12);
        assert_eq!(pool.gradient(f), 1.0);
    }

    #[test]
    fn test_backward_through_shared_subexpression() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        pool.set_value(x, 3.0);
        // f = (x*x) + (x*x); df/dx = 4x = 12
        let sq = pool.mul(x, x);
        let f = pool.add(sq, sq);
        pool.zero_all_grad();
        pool.backward(f).unwrap();
        assert!((pool.gradient(x) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_backward_log_sum_exp() {
        let mut pool = ExprPool::new();
        let a = pool.variable();
        let b = pool.variable();
        pool.set_value(a, 1.0);
        pool.set_value(b, 2.0);
        // f = log(exp(a) + exp(b)); df/da = softmax(a), df/db = softmax(b)
        let ea = pool.exp(a);
        let eb = pool.exp(b);
        let sum = pool.add(ea, eb);
        let f = pool.log(sum);
        pool.zero_all_grad();
        pool.backward(f).unwrap();
        let z = 1f64.exp() + 2f64.exp();
        assert!((pool.gradient(a) - 1f64.exp() / z).abs() < 1e-12);
        assert!((pool.gradient(b) - 2f64.exp() / z).abs() < 1e-12);
        assert!((pool.gradient(a) + pool.gradient(b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_backward_power_rule() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        pool.set_value(x, 9.0);
        let half = pool.constant(0.5);
        let f = pool.pow(x, half).unwrap();
        pool.zero_all_grad();
        pool.backward(f).unwrap();
        // d sqrt(x)/dx = 1/(2 sqrt(x)) = 1/6
        assert!((pool.gradient(x) - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_backward_resets_previous_pass() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        pool.set_value(x, 2.0);
        let f = pool.mul(x, x);
        pool.zero_all_grad();
        pool.backward(f).unwrap();
        pool.backward(f).unwrap();
        // Not 8.0: a fresh pass resets the reachable gradients.
        assert!((pool.gradient(x) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_all_grad() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        pool.set_value(x, 2.0);
        let f = pool.mul(x, x);
        pool.backward(f).unwrap();
        pool.zero_all_grad();
        assert_eq!(pool.gradient(x), 0.0);
        assert_eq!(pool.gradient(f), 0.0);
    }

    #[test]
    fn test_derive_polynomial() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        // f = x*x + 3x
        let sq = pool.mul(x, x);
        let three = pool.constant(3.0);
        let tx = pool.mul(three, x);
        let f = pool.add(sq, tx);
        let df = pool.derive(f, x).unwrap();
        pool.set_value(x, 4.0);
        assert!((pool.value(df).unwrap() - 11.0).abs() < 1e-12);
        pool.set_value(x, -1.0);
        assert!((pool.value(df).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_derive_is_memoized() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        let f = pool.mul(x, x);
        let d0 = pool.derive(f, x).unwrap();
        let d1 = pool.derive(f, x).unwrap();
        assert_eq!(d0, d1);
    }

    #[test]
    fn test_derive_of_unrelated_variable_is_zero() {
        let mut pool = ExprPool::new();
        let x = pool.variable();
        let y = pool.variable();
        let f = pool.exp(x);
        assert_eq!(pool.derive(f, y).unwrap(), ZERO);
    }

    #[test]
    fn test_deep_chain_is_iterative() {
        // Both evaluation and backward must survive a pathologically deep
        // graph on the default test-thread stack.
        let mut pool = ExprPool::new();
        let x = pool.variable();
        pool.set_value(x, 0.0);
        let step = pool.constant(1.0);
        let mut f = x;
        for _ in 0..200_000 {
            f = pool.add(f, step);
        }
        assert_eq!(pool.value(f).unwrap(), 200_000.0);
        pool.zero_all_grad();
        pool.backward(f).unwrap();
        assert_eq!(pool.gradient(x), 1.0);
        pool.set_value(x, 1.0);
        assert_eq!(pool.value(f).unwrap(), 200_001.0);
    }
}
