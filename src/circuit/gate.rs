//! Gate library entries and their circuit instances.
//!
//! A [`Gate`] is a library record: a delay table keyed by `(input pin,
//! output pin)` plus an instance counter. An [`Instance`] is one invocation
//! of a gate at a circuit location; its `output()` materializes each library
//! delay as a *fresh* Normal in the context (the per-invocation clone that
//! lets sensitivity analysis attribute gradients to the instance rather
//! than the library entry) and folds `input + delay` arcs with `max`.

use std::collections::BTreeMap;

use crate::algebra::rv::{Ctx, RvId};
use crate::error::{Error, Result};

/// Default output pin for single-output gates.
pub const DEFAULT_OUTPUT_PIN: &str = "y";

/// A library delay distribution. `const` arcs carry variance 0; the floor
/// is applied when the distribution is read, not here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Delay {
    pub mean: f64,
    pub variance: f64,
}

/// A gate type from the dlib file.
#[derive(Clone, Debug)]
pub struct Gate {
    type_name: String,
    delays: BTreeMap<(String, String), Delay>,
    num_instances: u32,
}

impl Gate {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            delays: BTreeMap::new(),
            num_instances: 0,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn set_delay(&mut self, input: impl Into<String>, output: impl Into<String>, delay: Delay) {
        self.delays.insert((input.into(), output.into()), delay);
    }

    pub fn delay(&self, input: &str, output: &str) -> Result<Delay> {
        self.delays
            .get(&(input.to_string(), output.to_string()))
            .copied()
            .ok_or_else(|| Error::UnknownGatePin {
                gate: self.type_name.clone(),
                input: input.to_string(),
                output: output.to_string(),
            })
    }

    pub fn delays(&self) -> &BTreeMap<(String, String), Delay> {
        &self.delays
    }

    /// Whether any arc starts at `input`.
    pub fn has_input_pin(&self, input: &str) -> bool {
        self.delays.keys().any(|(i, _)| i == input)
    }

    /// Allocate an instance named `"<type>:<n>"`.
    pub fn create_instance(&mut self) -> Instance {
        let name = format!("{}:{}", self.type_name, self.num_instances);
        self.num_instances += 1;
        Instance {
            name,
            gate_type: self.type_name.clone(),
            delays: self.delays.clone(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            used_delays: Vec::new(),
        }
    }
}

/// A cloned delay actually wired into an instance's output tree.
#[derive(Clone, Debug)]
pub struct UsedDelay {
    pub input: String,
    pub output: String,
    pub rv: RvId,
}

/// One invocation of a gate.
#[derive(Clone, Debug)]
pub struct Instance {
    name: String,
    gate_type: String,
    delays: BTreeMap<(String, String), Delay>,
    inputs: BTreeMap<String, RvId>,
    outputs: BTreeMap<String, RvId>,
    used_delays: Vec<UsedDelay>,
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gate_type(&self) -> &str {
        &self.gate_type
    }

    /// Wire a signal to an input pin. The pin must start at least one arc in
    /// the gate's delay table.
    pub fn set_input(&mut self, pin: impl Into<String>, signal: RvId) -> Result<()> {
        let pin = pin.into();
        if !self.delays.keys().any(|(i, _)| *i == pin) {
            return Err(Error::UnknownGatePin {
                gate: self.gate_type.clone(),
                input: pin,
                output: DEFAULT_OUTPUT_PIN.to_string(),
            });
        }
        self.inputs.insert(pin, signal);
        Ok(())
    }

    pub fn used_delays(&self) -> &[UsedDelay] {
        &self.used_delays
    }

    /// The arrival-time RV at `output`. Memoized; on first call builds
    /// `MAX over wired inputs of (input + cloned delay)`, iterating arcs in
    /// delay-table order so the build is canonical.
    pub fn output(&mut self, ctx: &mut Ctx, output: &str) -> Result<RvId> {
        if let Some(&rv) = self.outputs.get(output) {
            return Ok(rv);
        }

        let arcs: Vec<(String, Delay)> = self
            .delays
            .iter()
            .filter(|((_, out), _)| out == output)
            .map(|((inp, _), d)| (inp.clone(), *d))
            .collect();

        let mut acc: Option<RvId> = None;
        for (input, delay) in arcs {
            let signal = match self.inputs.get(&input) {
                Some(&s) => s,
                None => continue,
            };
            let cloned = ctx.normal(delay.mean, delay.variance)?;
            self.used_delays.push(UsedDelay {
                input: input.clone(),
                output: output.to_string(),
                rv: cloned,
            });
            let arrival = ctx.add(signal, cloned);
            acc = Some(match acc {
                None => arrival,
                Some(prev) => ctx.max(prev, arrival),
            });
        }

        let rv = acc.ok_or_else(|| Error::UnknownGatePin {
            gate: self.gate_type.clone(),
            input: "-".to_string(),
            output: output.to_string(),
        })?;
        self.outputs.insert(output.to_string(), rv);
        Ok(rv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::rv::EPSILON;

    fn inv_gate() -> Gate {
        let mut g = Gate::new("inv");
        g.set_delay(
            "0",
            DEFAULT_OUTPUT_PIN,
            Delay {
                mean: 15.0,
                variance: 4.0,
            },
        );
        g
    }

    #[test]
    fn test_delay_lookup() {
        let g = inv_gate();
        let d = g.delay("0", "y").unwrap();
        assert_eq!(d.mean, 15.0);
        assert_eq!(d.variance, 4.0);
        assert!(matches!(
            g.delay("1", "y"),
            Err(Error::UnknownGatePin { .. })
        ));
    }

    #[test]
    fn test_instance_names_count_up() {
        let mut g = inv_gate();
        assert_eq!(g.create_instance().name(), "inv:0");
        assert_eq!(g.create_instance().name(), "inv:1");
        assert_eq!(g.create_instance().name(), "inv:2");
    }

    #[test]
    fn test_set_input_validates_pin() {
        let mut g = inv_gate();
        let mut ctx = Ctx::new();
        let sig = ctx.normal(0.0, EPSILON).unwrap();
        let mut inst = g.create_instance();
        assert!(inst.set_input("0", sig).is_ok());
        assert!(matches!(
            inst.set_input("7", sig),
            Err(Error::UnknownGatePin { .. })
        ));
    }

    #[test]
    fn test_single_input_output() {
        let mut g = inv_gate();
        let mut ctx = Ctx::new();
        let sig = ctx.normal(0.0, EPSILON).unwrap();
        let mut inst = g.create_instance();
        inst.set_input("0", sig).unwrap();
        let out = inst.output(&mut ctx, "y").unwrap();
        assert!((ctx.mean(out).unwrap() - 15.0).abs() < 1e-9);
        assert!((ctx.variance(out).unwrap() - (4.0 + EPSILON)).abs() < 1e-9);
    }

    #[test]
    fn test_output_is_memoized() {
        let mut g = inv_gate();
        let mut ctx = Ctx::new();
        let sig = ctx.normal(0.0, EPSILON).unwrap();
        let mut inst = g.create_instance();
        inst.set_input("0", sig).unwrap();
        let a = inst.output(&mut ctx, "y").unwrap();
        let b = inst.output(&mut ctx, "y").unwrap();
        assert_eq!(a, b);
        assert_eq!(inst.used_delays().len(), 1);
    }

    #[test]
    fn test_two_input_gate_takes_max() {
        let mut g = Gate::new("nand");
        g.set_delay(
            "0",
            "y",
            Delay {
                mean: 24.0,
                variance: 9.0,
            },
        );
        g.set_delay(
            "1",
            "y",
            Delay {
                mean: 20.0,
                variance: 9.0,
            },
        );
        let mut ctx = Ctx::new();
        let s0 = ctx.normal(0.0, EPSILON).unwrap();
        let s1 = ctx.normal(0.0, EPSILON).unwrap();
        let mut inst = g.create_instance();
        inst.set_input("0", s0).unwrap();
        inst.set_input("1", s1).unwrap();
        let out = inst.output(&mut ctx, "y").unwrap();
        let mean = ctx.mean(out).unwrap();
        // Strictly above the larger arc mean, well below mean0 + mean1.
        assert!(mean > 24.0 && mean < 44.0, "mean = {mean}");
        assert_eq!(inst.used_delays().len(), 2);
    }

    #[test]
    fn test_unwired_inputs_are_skipped() {
        let mut g = Gate::new("nand");
        g.set_delay(
            "0",
            "y",
            Delay {
                mean: 24.0,
                variance: 9.0,
            },
        );
        g.set_delay(
            "1",
            "y",
            Delay {
                mean: 20.0,
                variance: 9.0,
            },
        );
        let mut ctx = Ctx::new();
        let s0 = ctx.normal(0.0, EPSILON).unwrap();
        let mut inst = g.create_instance();
        inst.set_input("0", s0).unwrap();
        let out = inst.output(&mut ctx, "y").unwrap();
        assert!((ctx.mean(out).unwrap() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_usable_arc_is_an_error() {
        let mut g = inv_gate();
        let mut ctx = Ctx::new();
        let mut inst = g.create_instance();
        assert!(matches!(
            inst.output(&mut ctx, "y"),
            Err(Error::UnknownGatePin { .. })
        ));
    }

    #[test]
    fn test_cloned_delays_are_independent_across_instances() {
        let mut g = inv_gate();
        let mut ctx = Ctx::new();
        let sig = ctx.normal(0.0, EPSILON).unwrap();
        let mut i0 = g.create_instance();
        let mut i1 = g.create_instance();
        i0.set_input("0", sig).unwrap();
        i1.set_input("0", sig).unwrap();
        i0.output(&mut ctx, "y").unwrap();
        i1.output(&mut ctx, "y").unwrap();
        let d0 = i0.used_delays()[0].rv;
        let d1 = i1.used_delays()[0].rv;
        assert_ne!(d0, d1);
        assert_eq!(
            crate::algebra::cov::covariance(&mut ctx, d0, d1).unwrap(),
            0.0
        );
    }
}
