//! Critical-path extraction.
//!
//! Paths are traced backwards from every endpoint (primary outputs and DFF
//! data inputs) through the instance metadata: at each instance the input
//! with the largest mean arrival wins, ties broken lexicographically so the
//! report is deterministic. A trace stops at a primary input, a DFF Q
//! output, or any signal with no backing instance.

use std::collections::BTreeSet;

use crate::algebra::rv::Ctx;
use crate::circuit::graph::CircuitGraph;
use crate::error::Result;

/// Default number of reported paths.
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Clone, Debug, Default)]
pub struct CriticalPath {
    /// Signals along the path, source first, endpoint last.
    pub node_names: Vec<String>,
    /// Instances traversed, parallel to the node transitions.
    pub instance_names: Vec<String>,
    pub delay_mean: f64,
    pub delay_std: f64,
}

/// Endpoints in reporting order: outputs first, then DFF data inputs.
pub fn endpoints(graph: &CircuitGraph) -> Vec<String> {
    let mut set: BTreeSet<String> = graph.outputs.clone();
    set.extend(graph.dff_inputs.iter().cloned());
    set.into_iter()
        .filter(|name| graph.signals.contains_key(name))
        .collect()
}

/// The top-N paths by expected endpoint delay, descending.
pub fn critical_paths(
    ctx: &mut Ctx,
    graph: &CircuitGraph,
    top_n: usize,
) -> Result<Vec<CriticalPath>> {
    let mut paths = Vec::new();
    for endpoint in endpoints(graph) {
        paths.push(trace(ctx, graph, &endpoint)?);
    }

    paths.sort_by(|a, b| {
        b.delay_mean
            .partial_cmp(&a.delay_mean)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node_names.last().cmp(&b.node_names.last()))
    });
    paths.truncate(top_n);
    Ok(paths)
}

fn trace(ctx: &mut Ctx, graph: &CircuitGraph, endpoint: &str) -> Result<CriticalPath> {
    let rv = graph.signals[endpoint];
    let delay_mean = ctx.mean(rv)?;
    let delay_std = ctx.std_dev(rv)?;

    let mut nodes = vec![endpoint.to_string()];
    let mut instances = Vec::new();
    let mut current = endpoint.to_string();

    while let Some(instance) = graph.signal_to_instance.get(&current) {
        instances.push(instance.clone());
        let ins = &graph.instance_to_inputs[instance];
        let mut best: Option<(f64, &String)> = None;
        for name in ins {
            let mean = ctx.mean(graph.signals[name])?;
            best = match best {
                None => Some((mean, name)),
                Some((bm, bn)) => {
                    if mean > bm || (mean == bm && name < bn) {
                        Some((mean, name))
                    } else {
                        Some((bm, bn))
                    }
                }
            };
        }
        let (_, chosen) = best.expect("an instance always has at least one input");
        nodes.push(chosen.clone());
        current = chosen.clone();
    }

    nodes.reverse();
    instances.reverse();
    Ok(CriticalPath {
        node_names: nodes,
        instance_names: instances,
        delay_mean,
        delay_std,
    })
}
