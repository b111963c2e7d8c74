//! Latest-arrival-time table.

use crate::algebra::rv::Ctx;
use crate::circuit::graph::CircuitGraph;
use crate::error::Result;

/// One row of the LAT report.
#[derive(Clone, Debug, PartialEq)]
pub struct LatEntry {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
}

/// Mean and standard deviation of every signal, sorted lexicographically by
/// name (the signal table is ordered, so iteration is the sort).
pub fn lat_table(ctx: &mut Ctx, graph: &CircuitGraph) -> Result<Vec<LatEntry>> {
    let mut rows = Vec::with_capacity(graph.signals.len());
    for (name, &rv) in &graph.signals {
        rows.push(LatEntry {
            name: name.clone(),
            mean: ctx.mean(rv)?,
            std_dev: ctx.std_dev(rv)?,
        });
    }
    Ok(rows)
}
