//! Plain-text report blocks written to stdout.
//!
//! Block order and headers are part of the tool's contract: LAT first, then
//! the correlation matrix, then critical paths, then sensitivity. Each
//! writer takes any `io::Write` so tests can capture into a buffer.

use std::io::{self, Write};

use crate::analysis::correlation::CorrelationMatrix;
use crate::analysis::lat::LatEntry;
use crate::analysis::paths::CriticalPath;
use crate::analysis::sensitivity::SensitivityReport;

const RULE: &str = "#---------------------------------";

pub fn write_lat(out: &mut impl Write, entries: &[LatEntry]) -> io::Result<()> {
    writeln!(out, "#")?;
    writeln!(out, "# LAT")?;
    writeln!(out, "#")?;
    writeln!(out, "#node\t\t     mu\t     std")?;
    writeln!(out, "{RULE}")?;
    for e in entries {
        writeln!(out, "{:<15}{:>10.3}{:>9.3}", e.name, e.mean, e.std_dev)?;
    }
    writeln!(out, "{RULE}")?;
    Ok(())
}

pub fn write_correlation(out: &mut impl Write, matrix: &CorrelationMatrix) -> io::Result<()> {
    writeln!(out, "#")?;
    writeln!(out, "# correlation matrix")?;
    writeln!(out, "#")?;

    write!(out, "#\t")?;
    for name in &matrix.names {
        write!(out, "{name}\t")?;
    }
    writeln!(out)?;
    write_rule(out, matrix.names.len())?;

    for row in &matrix.names {
        write!(out, "{row}\t")?;
        for col in &matrix.names {
            write!(out, "{:4.3}\t", matrix.get(row, col))?;
        }
        writeln!(out)?;
    }
    write_rule(out, matrix.names.len())?;
    Ok(())
}

fn write_rule(out: &mut impl Write, columns: usize) -> io::Result<()> {
    write!(out, "#-------")?;
    for _ in 1..columns {
        write!(out, "--------")?;
    }
    writeln!(out, "-----")?;
    Ok(())
}

pub fn write_paths(out: &mut impl Write, paths: &[CriticalPath]) -> io::Result<()> {
    writeln!(out, "#")?;
    writeln!(out, "# critical paths")?;
    writeln!(out, "#")?;
    for (k, path) in paths.iter().enumerate() {
        writeln!(
            out,
            "Path {}: mean ={:9.3} std ={:8.3}",
            k + 1,
            path.delay_mean,
            path.delay_std
        )?;
        writeln!(out, "  nodes: {}", path.node_names.join(" -> "))?;
        if !path.instance_names.is_empty() {
            writeln!(out, "  gates: {}", path.instance_names.join(" -> "))?;
        }
    }
    Ok(())
}

pub fn write_sensitivity(out: &mut impl Write, report: &SensitivityReport) -> io::Result<()> {
    writeln!(out, "Sensitivity Analysis")?;
    writeln!(out, "Objective: {:.6}", report.objective)?;
    writeln!(out, "Top endpoints (score = mu + std):")?;
    for p in &report.top_paths {
        writeln!(
            out,
            "  {:<15} mu ={:9.3} std ={:8.3} score ={:9.3}",
            p.endpoint, p.mean, p.std_dev, p.score
        )?;
    }
    writeln!(out, "Gate Sensitivities")?;
    for g in &report.gates {
        writeln!(
            out,
            "  {:<15} output={:<12} input={:<12} gate={:<10} dF/dmu={:>10.5} dF/dsigma={:>10.5}",
            g.instance, g.output_node, g.input_signal, g.gate_type, g.grad_mean, g.grad_std
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::rv::Ctx;
    use crate::analysis::{correlation, lat, paths, sensitivity};
    use crate::circuit::graph::CircuitGraph;
    use crate::netlist::{bench::Netlist, dlib::Library};

    fn build() -> (Ctx, CircuitGraph) {
        let lib = Library::parse_str(
            "t.dlib",
            "inv 0 y gauss (10, 2)\nnand 0 y gauss (24, 3)\nnand 1 y gauss (20, 3)\n",
        )
        .unwrap();
        let netlist = Netlist::parse_str(
            "t.bench",
            "INPUT(A)\nINPUT(B)\nOUTPUT(Y)\nN1 = INV(A)\nN2 = INV(B)\nY = NAND(N1, N2)\n",
            &lib,
        )
        .unwrap();
        let mut ctx = Ctx::new();
        let graph = CircuitGraph::build(&mut ctx, lib, &netlist).unwrap();
        (ctx, graph)
    }

    fn as_text(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_lat_block() {
        let (mut ctx, graph) = build();
        let rows = lat::lat_table(&mut ctx, &graph).unwrap();
        let mut buf = Vec::new();
        write_lat(&mut buf, &rows).unwrap();
        let text = as_text(buf);
        assert!(text.contains("# LAT"));
        assert!(text.contains("#node"));
        // One row per signal, lexicographic.
        let a = text.find("A  ").unwrap();
        let y = text.find("Y  ").unwrap();
        assert!(a < y);
    }

    #[test]
    fn test_lat_row_format() {
        let rows = vec![LatEntry {
            name: "Y".to_string(),
            mean: 15.0,
            std_dev: 2.0,
        }];
        let mut buf = Vec::new();
        write_lat(&mut buf, &rows).unwrap();
        let text = as_text(buf);
        assert!(text.contains("Y                  15.000    2.000"));
    }

    #[test]
    fn test_correlation_block() {
        let (mut ctx, graph) = build();
        let matrix = correlation::correlation_matrix(&mut ctx, &graph).unwrap();
        let mut buf = Vec::new();
        write_correlation(&mut buf, &matrix).unwrap();
        let text = as_text(buf);
        assert!(text.contains("# correlation matrix"));
        // Tab-separated header row with every signal.
        assert!(text.contains("#\tA\tB\tN1\tN2\tY\t"));
        // Diagonal renders as 1.000.
        assert!(text.contains("1.000"));
    }

    #[test]
    fn test_paths_block() {
        let (mut ctx, graph) = build();
        let ps = paths::critical_paths(&mut ctx, &graph, 5).unwrap();
        let mut buf = Vec::new();
        write_paths(&mut buf, &ps).unwrap();
        let text = as_text(buf);
        assert!(text.contains("# critical paths"));
        assert!(text.contains("Path 1:"));
        assert!(text.contains(" -> Y"));
        assert!(text.contains("nand:0"));
    }

    #[test]
    fn test_sensitivity_block() {
        let (mut ctx, graph) = build();
        let report = sensitivity::sensitivity(&mut ctx, &graph, 5).unwrap();
        let mut buf = Vec::new();
        write_sensitivity(&mut buf, &report).unwrap();
        let text = as_text(buf);
        assert!(text.contains("Sensitivity Analysis"));
        assert!(text.contains("Objective: "));
        assert!(text.contains("Gate Sensitivities"));
        assert!(text.contains("dF/dmu="));
    }
}
