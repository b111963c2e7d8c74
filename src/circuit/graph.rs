//! Circuit construction: netlist resolution into per-signal arrival RVs.
//!
//! Resolution is a worklist state machine: a net line fires once every one
//! of its input signals is present in the signal table; a full pass with
//! zero progress means the remainder can never resolve and is reported as a
//! floating error listing every unresolved output. Primary inputs arrive at
//! `Normal(0, epsilon)`; a DFF Q output arrives at clock reference plus a
//! cloned ck->q delay, which is what cuts sequential feedback.
//!
//! As instances fire, path metadata is recorded for the critical-path and
//! sensitivity analyzers: which instance drives each signal, each
//! instance's ordered input signals, its gate type, and the cloned delay
//! leaves actually wired into its output tree.

use std::collections::{BTreeMap, BTreeSet};

use crate::algebra::rv::{Ctx, RvId, EPSILON};
use crate::circuit::gate::DEFAULT_OUTPUT_PIN;
use crate::error::{Error, Result};
use crate::netlist::bench::{NetLine, Netlist, DFF_GATE_NAME};
use crate::netlist::dlib::Library;

/// Clock arrival reference at a flip-flop, relative to the cycle start.
const DFF_CLOCK_ARRIVAL: f64 = 0.0;

/// DFF clock and Q pins in the library.
const DFF_CLOCK_PIN: &str = "ck";
const DFF_Q_PIN: &str = "q";

/// The built circuit: signal table plus path-tracking metadata.
#[derive(Debug, Default)]
pub struct CircuitGraph {
    pub signals: BTreeMap<String, RvId>,
    pub inputs: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
    pub dff_outputs: BTreeSet<String>,
    pub dff_inputs: BTreeSet<String>,
    pub signal_to_instance: BTreeMap<String, String>,
    pub instance_to_inputs: BTreeMap<String, Vec<String>>,
    pub instance_to_gate_type: BTreeMap<String, String>,
    pub instance_to_delays: BTreeMap<String, BTreeMap<String, RvId>>,
    bench_file: String,
}

impl CircuitGraph {
    /// Resolve a parsed netlist against a gate library. Consumes the
    /// library: instance counters live in it, and nothing else needs it
    /// once the signal table is built.
    pub fn build(ctx: &mut Ctx, mut library: Library, netlist: &Netlist) -> Result<CircuitGraph> {
        let mut graph = CircuitGraph {
            inputs: netlist.inputs.clone(),
            outputs: netlist.outputs.clone(),
            dff_outputs: netlist.dff_outputs.clone(),
            dff_inputs: netlist.dff_inputs.clone(),
            bench_file: netlist.file.clone(),
            ..CircuitGraph::default()
        };

        graph.initialize_inputs(ctx, netlist)?;
        for dff_out in &netlist.dff_outputs {
            graph.set_dff_out(ctx, &library, dff_out)?;
        }
        graph.connect_instances(ctx, &mut library, netlist)?;
        Ok(graph)
    }

    fn initialize_inputs(&mut self, ctx: &mut Ctx, netlist: &Netlist) -> Result<()> {
        for name in &netlist.inputs {
            let rv = ctx.normal(0.0, EPSILON)?;
            ctx.set_name(rv, name.clone());
            self.signals.insert(name.clone(), rv);
        }
        Ok(())
    }

    /// Q arrival: clock reference plus a cloned ck->q propagation delay.
    fn set_dff_out(&mut self, ctx: &mut Ctx, library: &Library, out: &str) -> Result<()> {
        let dff = library.gate(DFF_GATE_NAME).ok_or_else(|| Error::UnknownGate {
            gate: DFF_GATE_NAME.to_string(),
            file: self.bench_file.clone(),
            line: 0,
            span: crate::error::Span::dummy(),
        })?;
        let delay = dff.delay(DFF_CLOCK_PIN, DFF_Q_PIN)?;

        let clock = ctx.normal(DFF_CLOCK_ARRIVAL, EPSILON)?;
        let cloned = ctx.normal(delay.mean, delay.variance)?;
        let rv = ctx.add(clock, cloned);

        self.check_signal(out)?;
        ctx.set_name(rv, out.to_string());
        self.signals.insert(out.to_string(), rv);
        Ok(())
    }

    fn connect_instances(
        &mut self,
        ctx: &mut Ctx,
        library: &mut Library,
        netlist: &Netlist,
    ) -> Result<()> {
        let mut pending: Vec<NetLine> = netlist.nets.clone();

        while !pending.is_empty() {
            let before = pending.len();
            let mut remaining = Vec::with_capacity(before);

            for line in pending {
                if !self.is_line_ready(&line) {
                    remaining.push(line);
                    continue;
                }
                self.fire_line(ctx, library, &line)?;
            }

            if remaining.len() == before {
                return Err(Error::FloatingNet {
                    outputs: remaining.into_iter().map(|l| l.out).collect(),
                });
            }
            pending = remaining;
        }
        Ok(())
    }

    fn is_line_ready(&self, line: &NetLine) -> bool {
        line.ins.iter().all(|s| self.signals.contains_key(s))
    }

    fn fire_line(&mut self, ctx: &mut Ctx, library: &mut Library, line: &NetLine) -> Result<()> {
        let gate = library
            .gate_mut(&line.gate)
            .ok_or_else(|| Error::internal(format!("gate \"{}\" vanished after parse", line.gate)))?;
        let mut inst = gate.create_instance();

        for (ith, signal_name) in line.ins.iter().enumerate() {
            let signal = self.signals[signal_name];
            inst.set_input(ith.to_string(), signal)?;
        }

        let out = inst.output(ctx, DEFAULT_OUTPUT_PIN)?;
        self.check_signal(&line.out)?;
        ctx.set_name(out, line.out.clone());
        self.signals.insert(line.out.clone(), out);

        // Path metadata for the analyzers.
        let instance_name = inst.name().to_string();
        self.signal_to_instance
            .insert(line.out.clone(), instance_name.clone());
        self.instance_to_inputs
            .insert(instance_name.clone(), line.ins.clone());
        self.instance_to_gate_type
            .insert(instance_name.clone(), line.gate.clone());
        let delays: BTreeMap<String, RvId> = inst
            .used_delays()
            .iter()
            .map(|d| (d.input.clone(), d.rv))
            .collect();
        self.instance_to_delays.insert(instance_name, delays);
        Ok(())
    }

    fn check_signal(&self, name: &str) -> Result<()> {
        if self.signals.contains_key(name) {
            return Err(Error::DuplicateSignal {
                head: "node",
                signal: name.to_string(),
                file: self.bench_file.clone(),
            });
        }
        Ok(())
    }
}
