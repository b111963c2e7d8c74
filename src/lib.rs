pub mod algebra;
pub mod analysis;
pub mod circuit;
pub mod error;
pub mod netlist;
pub mod profiling;
pub mod report;

// Re-exports so the CLI and tests can speak in terms of `ssta::X`
pub use algebra::rv::{Ctx, RvId, RvKind, EPSILON};
pub use analysis::correlation::{correlation_matrix, submatrix, CorrelationMatrix};
pub use analysis::lat::{lat_table, LatEntry};
pub use analysis::paths::{critical_paths, endpoints, CriticalPath};
pub use analysis::sensitivity::{sensitivity, GateSensitivity, SensitivityReport};
pub use circuit::gate::{Delay, Gate, Instance};
pub use circuit::graph::CircuitGraph;
pub use error::{Error, Result};
pub use netlist::bench::Netlist;
pub use netlist::dlib::Library;

use std::path::Path;

/// Stack for the analysis worker thread. Covariance decomposition recurses
/// to circuit depth, which overflows a default stack on deep netlists.
pub const ANALYSIS_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Run `f` on a worker thread with a large fixed stack. Panics propagate to
/// the caller unchanged.
pub fn with_deep_stack<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name("ssta-analysis".to_string())
        .stack_size(ANALYSIS_STACK_BYTES)
        .spawn(f)
        .expect("failed to spawn analysis thread")
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

/// Parse both inputs from disk and build the circuit. Parse failures render
/// a source report to stderr before propagating.
pub fn analyze_files(dlib: &Path, bench: &Path) -> Result<(Ctx, CircuitGraph)> {
    let library = Library::parse_file(dlib)?;
    let netlist = Netlist::parse_file(bench, &library)?;
    build(library, &netlist)
}

/// Parse both inputs from strings and build the circuit. No diagnostics are
/// rendered.
pub fn analyze_sources(dlib: &str, bench: &str) -> Result<(Ctx, CircuitGraph)> {
    let library = Library::parse_str("input.dlib", dlib)?;
    let netlist = Netlist::parse_str("input.bench", bench, &library)?;
    build(library, &netlist)
}

fn build(library: Library, netlist: &Netlist) -> Result<(Ctx, CircuitGraph)> {
    let mut ctx = Ctx::new();
    let graph = CircuitGraph::build(&mut ctx, library, netlist)?;
    Ok((ctx, graph))
}
