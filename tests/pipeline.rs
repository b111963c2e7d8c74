//! End-to-end scenarios over the library API: parse, build, report.

use ssta::algebra::cov::covariance;
use ssta::report::{write_correlation, write_lat, write_paths, write_sensitivity};
use ssta::{analysis, analyze_files, analyze_sources, Error};

// ── S1: single inverter ──

#[test]
fn test_inv_chain() {
    let (mut ctx, graph) = analyze_sources(
        "inv 0 y gauss (15.0, 2.0)\n",
        "INPUT(A)\nOUTPUT(Y)\nY = INV(A)\n",
    )
    .unwrap();
    let y = graph.signals["Y"];
    assert!((ctx.mean(y).unwrap() - 15.0).abs() < 0.1);
    assert!((ctx.std_dev(y).unwrap() - 2.0).abs() < 0.1);

    let a = graph.signals["A"];
    let corr = covariance(&mut ctx, a, y).unwrap()
        / (ctx.variance(a).unwrap() * ctx.variance(y).unwrap()).sqrt();
    assert!(corr.is_finite());
    assert!((0.0..=1.0).contains(&corr), "corr = {corr}");
}

// ── S2: reconvergent fan-in through a MAX ──

#[test]
fn test_fan_in_max() {
    let (mut ctx, graph) = analyze_sources(
        "inv 0 y gauss (10, 2)\nnand 0 y gauss (24, 3)\nnand 1 y gauss (20, 3)\n",
        "INPUT(A)\nINPUT(B)\nOUTPUT(Y)\nN1 = INV(A)\nN2 = INV(B)\nY = NAND(N1, N2)\n",
    )
    .unwrap();
    let y = graph.signals["Y"];
    let mean = ctx.mean(y).unwrap();
    assert!(mean >= 34.0 && mean <= 45.0, "mean = {mean}");
}

// ── S3: two gates in series ──

#[test]
fn test_series() {
    let (mut ctx, graph) = analyze_sources(
        "gate1 0 y gauss (10, 2)\ngate2 0 y gauss (15, 3)\n",
        "INPUT(A)\nOUTPUT(Y)\nN1 = gate1(A)\nY = gate2(N1)\n",
    )
    .unwrap();
    let y = graph.signals["Y"];
    assert!((ctx.mean(y).unwrap() - 25.0).abs() < 0.1);
}

// ── S4: flip-flop breaks the path at Q ──

#[test]
fn test_dff() {
    let (mut ctx, graph) = analyze_sources(
        "dff ck q gauss (30, 3.5)\ndff d q const (0)\n",
        "INPUT(D)\nINPUT(CK)\nOUTPUT(Q)\nQ = DFF(D, CK)\n",
    )
    .unwrap();
    let q = graph.signals["Q"];
    assert!((ctx.mean(q).unwrap() - 30.0).abs() < 0.1);
    assert!((ctx.std_dev(q).unwrap() - 3.5).abs() < 0.1);
    let d = graph.signals["D"];
    assert_eq!(covariance(&mut ctx, q, d).unwrap(), 0.0);
}

// ── S5: three independent chains rank by delay ──

const S5_DLIB: &str =
    "gate1 0 y gauss (10.0, 2.0)\ngate2 0 y gauss (20.0, 3.0)\ngate3 0 y gauss (15.0, 2.5)\n";
const S5_BENCH: &str = "INPUT(A)\nINPUT(B)\nINPUT(C)\n\
                        OUTPUT(Y1)\nOUTPUT(Y2)\nOUTPUT(Y3)\n\
                        Y1 = gate1(A)\nY2 = gate2(B)\nY3 = gate3(C)\n";

#[test]
fn test_critical_path_top_n() {
    let (mut ctx, graph) = analyze_sources(S5_DLIB, S5_BENCH).unwrap();
    let paths = analysis::paths::critical_paths(&mut ctx, &graph, 3).unwrap();
    assert_eq!(paths.len(), 3);
    assert!((paths[0].delay_mean - 20.0).abs() < 0.1);
    assert!((paths[1].delay_mean - 15.0).abs() < 0.1);
    assert!((paths[2].delay_mean - 10.0).abs() < 0.1);
}

#[test]
fn test_critical_path_endpoints_are_sane() {
    let (mut ctx, graph) = analyze_sources(S5_DLIB, S5_BENCH).unwrap();
    let paths = analysis::paths::critical_paths(&mut ctx, &graph, 5).unwrap();
    for p in &paths {
        let first = p.node_names.first().unwrap();
        assert!(graph.inputs.contains(first) || graph.dff_outputs.contains(first));
        let last = p.node_names.last().unwrap();
        assert!(graph.outputs.contains(last) || graph.dff_inputs.contains(last));
        let rv = graph.signals[last];
        assert_eq!(p.delay_mean.to_bits(), ctx.mean(rv).unwrap().to_bits());
    }
}

// ── S6: sensitivity ranks the critical gate first ──

#[test]
fn test_sensitivity_sign_and_ranking() {
    let (mut ctx, graph) = analyze_sources(S5_DLIB, S5_BENCH).unwrap();
    let report = analysis::sensitivity::sensitivity(&mut ctx, &graph, 5).unwrap();
    let top = &report.gates[0];
    assert_eq!(top.gate_type, "gate2");
    assert!(top.grad_mean > 0.3, "grad = {}", top.grad_mean);
    for g in &report.gates[1..] {
        assert!(g.grad_mean < top.grad_mean);
    }
}

// ── file-based pipeline ──

#[test]
fn test_analyze_files_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let dlib = dir.path().join("chain.dlib");
    let bench = dir.path().join("chain.bench");
    std::fs::write(&dlib, "inv 0 y gauss (15.0, 2.0)\n").unwrap();
    std::fs::write(&bench, "INPUT(A)\nOUTPUT(Y)\nY = INV(A)\n").unwrap();

    let (mut ctx, graph) = analyze_files(&dlib, &bench).unwrap();
    let y = graph.signals["Y"];
    assert!((ctx.mean(y).unwrap() - 15.0).abs() < 0.1);
}

#[test]
fn test_missing_dlib_is_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = analyze_files(
        &dir.path().join("missing.dlib"),
        &dir.path().join("missing.bench"),
    )
    .unwrap_err();
    assert!(matches!(err, Error::File { .. }));
}

#[test]
fn test_malformed_dlib_aborts_before_bench() {
    let dir = tempfile::tempdir().unwrap();
    let dlib = dir.path().join("bad.dlib");
    let bench = dir.path().join("never.bench");
    std::fs::write(&dlib, "inv 0 y gauss (15.0\n").unwrap();
    // The bench does not even exist; the dlib must fail first.
    let err = analyze_files(&dlib, &bench).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
}

// ── report block order and shape ──

#[test]
fn test_report_blocks_in_contract_order() {
    let (mut ctx, graph) = analyze_sources(S5_DLIB, S5_BENCH).unwrap();

    let mut buf = Vec::new();
    let rows = analysis::lat::lat_table(&mut ctx, &graph).unwrap();
    write_lat(&mut buf, &rows).unwrap();
    let matrix = analysis::correlation::correlation_matrix(&mut ctx, &graph).unwrap();
    write_correlation(&mut buf, &matrix).unwrap();
    let paths = analysis::paths::critical_paths(&mut ctx, &graph, 5).unwrap();
    write_paths(&mut buf, &paths).unwrap();
    let sens = analysis::sensitivity::sensitivity(&mut ctx, &graph, 5).unwrap();
    write_sensitivity(&mut buf, &sens).unwrap();

    let text = String::from_utf8(buf).unwrap();
    let lat = text.find("# LAT").unwrap();
    let corr = text.find("# correlation matrix").unwrap();
    let path = text.find("# critical paths").unwrap();
    let sens = text.find("Sensitivity Analysis").unwrap();
    assert!(lat < corr && corr < path && path < sens);
}

#[test]
fn test_lat_output_is_byte_identical_across_runs() {
    let render = || {
        let (mut ctx, graph) = analyze_sources(S5_DLIB, S5_BENCH).unwrap();
        let rows = analysis::lat::lat_table(&mut ctx, &graph).unwrap();
        let mut buf = Vec::new();
        write_lat(&mut buf, &rows).unwrap();
        buf
    };
    assert_eq!(render(), render());
}

// ── deeper mixed circuit stays stable ──

#[test]
fn test_reconvergent_circuit_properties() {
    let dlib = "inv 0 y gauss (10, 2)\n\
                nand 0 y gauss (24, 3)\nnand 1 y gauss (20, 3)\n\
                nor 0 y gauss (18, 2)\nnor 1 y gauss (16, 2)\n";
    let bench = "INPUT(A)\nINPUT(B)\nOUTPUT(Y)\nOUTPUT(Z)\n\
                 N1 = INV(A)\nN2 = INV(B)\n\
                 N3 = NAND(N1, N2)\nN4 = NOR(N1, N2)\n\
                 Y = NAND(N3, N4)\nZ = NOR(N3, N4)\n";
    let (mut ctx, graph) = analyze_sources(dlib, bench).unwrap();
    let matrix = analysis::correlation::correlation_matrix(&mut ctx, &graph).unwrap();
    for a in &matrix.names {
        for b in &matrix.names {
            let c = matrix.get(a, b);
            assert!(c.abs() <= 1.0 + 1e-6, "corr({a},{b}) = {c}");
        }
    }
    // Shared fan-in makes the two outputs positively correlated.
    assert!(matrix.get("Y", "Z") > 0.0);
}
