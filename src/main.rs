use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use ssta::profiling::Profiler;
use ssta::report::{write_correlation, write_lat, write_paths, write_sensitivity};
use ssta::{
    analysis, with_deep_stack, CircuitGraph, Ctx, Error, Library, Netlist, Result,
};

#[derive(Parser)]
#[command(
    name = "ssta",
    about = "Statistical static timing analysis under a Gaussian delay model",
    disable_help_flag = true
)]
struct Cli {
    /// Gate-library (.dlib) file
    #[arg(short = 'd', long = "dlib", value_name = "FILE")]
    dlib: Option<PathBuf>,
    /// Netlist (.bench) file
    #[arg(short = 'b', long = "bench", value_name = "FILE")]
    bench: Option<PathBuf>,
    /// Print all LAT data
    #[arg(short = 'l', long = "lat")]
    lat: bool,
    /// Print the correlation matrix of LAT
    #[arg(short = 'c', long = "correlation")]
    correlation: bool,
    /// Print the top-N critical paths
    #[arg(
        short = 'p',
        long = "path",
        value_name = "N",
        num_args = 0..=1,
        default_missing_value = "5"
    )]
    path: Option<usize>,
    /// Print the sensitivity report
    #[arg(short = 's', long = "sensitivity")]
    sensitivity: bool,
    /// Endpoint count for sensitivity selection
    #[arg(short = 'n', value_name = "N", default_value_t = 5)]
    top_n: usize,
    /// Print usage
    #[arg(short = 'h', long = "help")]
    help: bool,
}

fn usage() {
    eprintln!("usage: ssta");
    eprintln!(" -d, --dlib         specifies .dlib file");
    eprintln!(" -b, --bench        specifies .bench file");
    eprintln!(" -l, --lat          prints all LAT data");
    eprintln!(" -c, --correlation  prints correlation matrix of LAT");
    eprintln!(" -p, --path [N]     prints top-N critical paths (default 5)");
    eprintln!(" -s, --sensitivity  prints sensitivity report");
    eprintln!(" -n N               endpoint count for sensitivity (default 5)");
    eprintln!(" -h, --help         gives this help");
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage problems exit 1, help included.
            let _ = e.print();
            process::exit(1);
        }
    };
    if cli.help {
        usage();
        process::exit(1);
    }

    // Panics are reported through the exit-code ladder, not the default hook.
    panic::set_hook(Box::new(|_| {}));
    let code = match panic::catch_unwind(AssertUnwindSafe(|| run(cli))) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            eprintln!("error: {e}");
            1
        }
        Err(payload) => {
            if let Some(msg) = payload.downcast_ref::<String>() {
                eprintln!("{msg}");
                2
            } else if let Some(msg) = payload.downcast_ref::<&str>() {
                eprintln!("{msg}");
                2
            } else {
                eprintln!("unknown error");
                3
            }
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    // Pre-check before any I/O.
    let dlib = cli.dlib.clone().ok_or(Error::Configuration {
        option: "-d".to_string(),
    })?;
    let bench = cli.bench.clone().ok_or(Error::Configuration {
        option: "-b".to_string(),
    })?;

    with_deep_stack(move || {
        let profiler = if std::env::var_os("SSTA_PROFILE").is_some() {
            Profiler::enabled()
        } else {
            Profiler::new()
        };

        let library = {
            let _scope = profiler.scope("parse dlib");
            Library::parse_file(&dlib)?
        };
        let netlist = {
            let _scope = profiler.scope("parse bench");
            Netlist::parse_file(&bench, &library)?
        };
        let mut ctx = Ctx::new();
        let graph = {
            let _scope = profiler.scope("build circuit");
            CircuitGraph::build(&mut ctx, library, &netlist)?
        };
        {
            let _scope = profiler.scope("reports");
            report(&cli, &mut ctx, &graph)?;
        }

        profiler
            .report(&mut std::io::stderr().lock())
            .map_err(|e| Error::internal(format!("writing profile report: {e}")))
    })
}

fn report(cli: &Cli, ctx: &mut Ctx, graph: &CircuitGraph) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if cli.lat {
        let rows = analysis::lat::lat_table(ctx, graph)?;
        blank(&mut out)?;
        write_lat(&mut out, &rows).map_err(stdout_error)?;
    }
    if cli.correlation {
        let matrix = analysis::correlation::correlation_matrix(ctx, graph)?;
        blank(&mut out)?;
        write_correlation(&mut out, &matrix).map_err(stdout_error)?;
    }
    if let Some(top_n) = cli.path {
        let paths = analysis::paths::critical_paths(ctx, graph, top_n)?;
        blank(&mut out)?;
        write_paths(&mut out, &paths).map_err(stdout_error)?;
    }
    if cli.sensitivity {
        let report = analysis::sensitivity::sensitivity(ctx, graph, cli.top_n)?;
        blank(&mut out)?;
        write_sensitivity(&mut out, &report).map_err(stdout_error)?;
    }
    Ok(())
}

fn blank(out: &mut impl Write) -> Result<()> {
    writeln!(out).map_err(stdout_error)
}

fn stdout_error(e: std::io::Error) -> Error {
    Error::internal(format!("writing to stdout: {e}"))
}
