//! Pairwise correlation of signal arrival times.

use std::collections::BTreeMap;

use crate::algebra::cov::covariance;
use crate::algebra::rv::{Ctx, EPSILON};
use crate::circuit::graph::CircuitGraph;
use crate::error::Result;

/// A correlation matrix over named signals. Every ordered pair is stored;
/// the diagonal is exactly 1.0.
#[derive(Clone, Debug, Default)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    values: BTreeMap<(String, String), f64>,
}

impl CorrelationMatrix {
    /// Correlation between two signals; symmetric lookups are both valid.
    /// Unknown pairs read as 0, a name with itself as 1.
    pub fn get(&self, a: &str, b: &str) -> f64 {
        if let Some(&v) = self.values.get(&(a.to_string(), b.to_string())) {
            return v;
        }
        if let Some(&v) = self.values.get(&(b.to_string(), a.to_string())) {
            return v;
        }
        if a == b {
            return 1.0;
        }
        0.0
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Full matrix over every signal in the table.
pub fn correlation_matrix(ctx: &mut Ctx, graph: &CircuitGraph) -> Result<CorrelationMatrix> {
    let names: Vec<String> = graph.signals.keys().cloned().collect();
    submatrix(ctx, graph, &names)
}

/// Matrix restricted to the given signals (e.g. path endpoints). Names
/// absent from the signal table are skipped.
pub fn submatrix(
    ctx: &mut Ctx,
    graph: &CircuitGraph,
    names: &[String],
) -> Result<CorrelationMatrix> {
    let mut matrix = CorrelationMatrix::default();
    for name in names {
        if graph.signals.contains_key(name) && !matrix.names.contains(name) {
            matrix.names.push(name.clone());
        }
    }

    for i in &matrix.names {
        let ri = graph.signals[i];
        let vi = ctx.variance(ri)?;
        for j in &matrix.names {
            let rj = graph.signals[j];
            let vj = ctx.variance(rj)?;
            let corr = if i == j {
                1.0
            } else if vi < EPSILON || vj < EPSILON {
                0.0
            } else {
                covariance(ctx, ri, rj)? / (vi * vj).sqrt()
            };
            matrix.values.insert((i.clone(), j.clone()), corr);
        }
    }
    Ok(matrix)
}
