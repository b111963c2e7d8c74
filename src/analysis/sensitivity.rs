//! Sensitivity of worst-case arrival to individual gate delays.
//!
//! The objective is `F = log(sum over top endpoints of exp(mu + sigma))`, a
//! smooth stand-in for `max(mu + sigma)`: log-sum-exp has no kinks, so a
//! single reverse pass yields `dF/d(mu)` and `dF/d(sigma)` for every cloned
//! gate delay at once.

use std::collections::BTreeMap;

use crate::algebra::rv::Ctx;
use crate::analysis::paths;
use crate::circuit::graph::CircuitGraph;
use crate::error::{Error, Result};

/// Cloned delays with raw variance below this are skipped (const arcs).
const MIN_VARIANCE: f64 = 1e-10;

/// Gradients below this magnitude are not reported.
const GRADIENT_THRESHOLD: f64 = 1e-10;

/// Default number of endpoints in the objective.
pub const DEFAULT_TOP_N: usize = 5;

/// One endpoint scored for the objective.
#[derive(Clone, Debug)]
pub struct EndpointScore {
    pub endpoint: String,
    pub mean: f64,
    pub std_dev: f64,
    pub score: f64,
}

/// Gradient of the objective with respect to one instance's delay arc.
#[derive(Clone, Debug)]
pub struct GateSensitivity {
    pub instance: String,
    pub output_node: String,
    pub input_signal: String,
    pub gate_type: String,
    pub grad_mean: f64,
    pub grad_std: f64,
}

impl GateSensitivity {
    pub fn magnitude(&self) -> f64 {
        self.grad_mean.abs() + self.grad_std.abs()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SensitivityReport {
    pub top_paths: Vec<EndpointScore>,
    pub objective: f64,
    pub gates: Vec<GateSensitivity>,
}

/// Full sensitivity analysis over the top-N endpoints by `mu + sigma`.
pub fn sensitivity(
    ctx: &mut Ctx,
    graph: &CircuitGraph,
    top_n: usize,
) -> Result<SensitivityReport> {
    let mut report = SensitivityReport::default();

    let mut scored = Vec::new();
    for endpoint in paths::endpoints(graph) {
        let rv = graph.signals[&endpoint];
        let mean = ctx.mean(rv)?;
        let std_dev = ctx.std_dev(rv)?;
        scored.push(EndpointScore {
            endpoint,
            mean,
            std_dev,
            score: mean + std_dev,
        });
    }
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.endpoint.cmp(&b.endpoint))
    });
    scored.truncate(top_n);
    report.top_paths = scored;

    if report.top_paths.is_empty() {
        return Ok(report);
    }

    // F = log(sum exp(mu_expr + sigma_expr))
    let mut sum = crate::algebra::expr::ZERO;
    for path in &report.top_paths {
        let rv = graph.signals[&path.endpoint];
        let mean_expr = ctx.mean_expr(rv)?;
        let std_expr = ctx.std_expr(rv)?;
        let score_expr = ctx.exprs.add(mean_expr, std_expr);
        let exp_score = ctx.exprs.exp(score_expr);
        sum = ctx.exprs.add(sum, exp_score);
    }
    let objective = ctx.exprs.log(sum);
    report.objective = ctx.exprs.value(objective)?;

    ctx.exprs.zero_all_grad();
    ctx.exprs.backward(objective)?;

    collect_gate_sensitivities(ctx, graph, &mut report)?;
    Ok(report)
}

fn collect_gate_sensitivities(
    ctx: &mut Ctx,
    graph: &CircuitGraph,
    report: &mut SensitivityReport,
) -> Result<()> {
    // Reverse map: instance -> the signal it drives.
    let instance_to_output: BTreeMap<&String, &String> = graph
        .signal_to_instance
        .iter()
        .map(|(signal, instance)| (instance, signal))
        .collect();

    for (instance, delays) in &graph.instance_to_delays {
        let output_node = instance_to_output
            .get(instance)
            .map(|s| s.to_string())
            .unwrap_or_default();
        let gate_type = graph
            .instance_to_gate_type
            .get(instance)
            .cloned()
            .unwrap_or_default();
        let input_signals = graph.instance_to_inputs.get(instance);

        for (pin, &delay_rv) in delays {
            let raw = ctx
                .leaf_variance(delay_rv)
                .ok_or_else(|| Error::internal("instance delay is not a Normal leaf"))?;
            if raw < MIN_VARIANCE {
                continue;
            }

            let (mean_var, std_var) = ctx
                .normal_vars(delay_rv)
                .ok_or_else(|| Error::internal("instance delay is not a Normal leaf"))?;
            let grad_mean = ctx.exprs.gradient(mean_var);
            let grad_std = ctx.exprs.gradient(std_var);
            if grad_mean.abs() + grad_std.abs() <= GRADIENT_THRESHOLD {
                continue;
            }

            // Pin indices name positional inputs; resolve back to the signal.
            let input_signal = match (pin.parse::<usize>(), input_signals) {
                (Ok(idx), Some(ins)) => {
                    if idx < ins.len() {
                        ins[idx].clone()
                    } else {
                        return Err(Error::internal(format!(
                            "pin index {idx} out of range on instance \"{instance}\""
                        )));
                    }
                }
                _ => pin.clone(),
            };

            report.gates.push(GateSensitivity {
                instance: instance.clone(),
                output_node: output_node.clone(),
                input_signal,
                gate_type: gate_type.clone(),
                grad_mean,
                grad_std,
            });
        }
    }

    report.gates.sort_by(|a, b| {
        b.magnitude()
            .partial_cmp(&a.magnitude())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.instance.cmp(&b.instance))
    });
    Ok(())
}
