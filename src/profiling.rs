//! Wall-clock profiling of pipeline stages.
//!
//! Disabled by default; the CLI enables it when `SSTA_PROFILE` is set. A
//! [`Scope`] measures from construction to drop and records into its
//! [`Profiler`], which aggregates per-name call counts and min/avg/max and
//! prints a report sorted by total time.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct Stats {
    total: Duration,
    calls: u64,
    min: Duration,
    max: Duration,
}

impl Stats {
    fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.calls += 1;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total: Duration::ZERO,
            calls: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }
}

/// Aggregates timing samples by name. Recording through a shared reference
/// keeps `Scope` ergonomic; the analysis itself is single-threaded.
#[derive(Default)]
pub struct Profiler {
    enabled: bool,
    stats: RefCell<BTreeMap<&'static str, Stats>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled() -> Self {
        Self {
            enabled: true,
            stats: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, name: &'static str, elapsed: Duration) {
        if self.enabled {
            self.stats.borrow_mut().entry(name).or_default().record(elapsed);
        }
    }

    pub fn reset(&self) {
        self.stats.borrow_mut().clear();
    }

    /// Start a named scope; the sample is recorded when the scope drops.
    pub fn scope<'a>(&'a self, name: &'static str) -> Scope<'a> {
        Scope {
            profiler: self,
            name,
            start: Instant::now(),
        }
    }

    /// Print the aggregated report, slowest stages first. A no-op when
    /// disabled or empty.
    pub fn report(&self, out: &mut impl Write) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let stats = self.stats.borrow();
        if stats.is_empty() {
            return Ok(());
        }

        let mut rows: Vec<(&'static str, Stats)> = stats.iter().map(|(&n, &s)| (n, s)).collect();
        rows.sort_by(|a, b| b.1.total.cmp(&a.1.total));

        writeln!(out)?;
        writeln!(out, "=== Profiling Report ===")?;
        writeln!(
            out,
            "{:<20}{:>8}{:>12}{:>12}{:>12}{:>12}",
            "Stage", "Calls", "Total (ms)", "Avg (ms)", "Min (ms)", "Max (ms)"
        )?;
        let mut total_all = Duration::ZERO;
        for (name, s) in &rows {
            total_all += s.total;
            writeln!(
                out,
                "{:<20}{:>8}{:>12.3}{:>12.3}{:>12.3}{:>12.3}",
                name,
                s.calls,
                ms(s.total),
                ms(s.total) / s.calls as f64,
                ms(s.min),
                ms(s.max)
            )?;
        }
        writeln!(out, "{:<20}{:>8}{:>12.3}", "TOTAL", "", ms(total_all))?;
        Ok(())
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

/// RAII timing scope tied to a [`Profiler`].
pub struct Scope<'a> {
    profiler: &'a Profiler,
    name: &'static str,
    start: Instant,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.profiler.record(self.name, self.start.elapsed());
    }
}
