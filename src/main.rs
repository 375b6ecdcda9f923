use clap::{Parser, ValueEnum};
use placement_diversity::diversity::EdgeMass;
use placement_diversity::io::{read_jplace_sample, read_nhx_sample, write_scores_csv};
use placement_diversity::metrics::{compute_scores_parallel, metric_names};
use placement_diversity::topology::Topology;
use std::path::PathBuf;
use std::time::Instant;

/// Compute per-sample phylogenetic diversity metrics (phylogenetic entropy,
/// quadratic entropy, BWPD at five theta values) from placement files and
/// write a CSV table with one row per sample.
#[derive(Parser, Debug)]
#[command(name = "placement-diversity", version, about = "Phylogenetic diversity metrics for placement samples")]
struct Args {
    /// Input files: .jplace(.gz) placements or NHX species-count trees
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Input format: jplace | nhx
    #[arg(short = 'f', long = "format", value_enum, default_value_t = FormatArg::Jplace)]
    format: FormatArg,

    /// Mass representation for jplace input: mass (spread all placements
    /// along the branches) | counts (best hit per query). NHX input always
    /// uses mass.
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = ModeArg::Mass)]
    mode: ModeArg,

    /// Output path for the CSV table ("-" for stdout, ".gz" compresses)
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// Quiet mode: suppresses progress messages on stdout
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg { Jplace, Nhx }

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg { Mass, Counts }

fn main() {
    let args = Args::parse();

    let t0 = Instant::now();
    match (args.format, args.mode) {
        (FormatArg::Jplace, ModeArg::Counts) => {
            let mut names = Vec::new();
            let mut samples = Vec::new();
            for path in &args.inputs {
                let placed = match read_jplace_sample(path) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("Failed to read {path:?}: {e}");
                        std::process::exit(2);
                    }
                };
                let counts = placed.best_hit_counts();
                names.push(placed.name);
                samples.push((placed.topology, counts));
            }
            log_read_done(&args, samples.len(), t0);
            score_and_write(&args, names, samples);
        }
        (FormatArg::Jplace, ModeArg::Mass) => {
            let mut names = Vec::new();
            let mut samples = Vec::new();
            for path in &args.inputs {
                let placed = match read_jplace_sample(path) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("Failed to read {path:?}: {e}");
                        std::process::exit(2);
                    }
                };
                let profile = match placed.mass_profile() {
                    Ok(p) => p,
                    Err(e) => {
                        eprintln!("Failed to build mass profile for {}: {e}", placed.name);
                        std::process::exit(2);
                    }
                };
                names.push(placed.name);
                samples.push((placed.topology, profile));
            }
            log_read_done(&args, samples.len(), t0);
            score_and_write(&args, names, samples);
        }
        (FormatArg::Nhx, _) => {
            let mut names = Vec::new();
            let mut samples = Vec::new();
            for path in &args.inputs {
                let sample = match read_nhx_sample(path) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("Failed to read {path:?}: {e}");
                        std::process::exit(2);
                    }
                };
                names.push(sample.name);
                samples.push((sample.topology, sample.profile));
            }
            log_read_done(&args, samples.len(), t0);
            score_and_write(&args, names, samples);
        }
    }
}

fn score_and_write<M: EdgeMass + Sync>(
    args: &Args,
    names: Vec<String>,
    samples: Vec<(Topology, M)>,
) {
    let header = metric_names();
    log_if(
        !args.quiet,
        format!(
            "Scoring {} samples across {} metrics",
            names.len(),
            header.len()
        ),
    );

    let t1 = Instant::now();
    let results = compute_scores_parallel(&samples);
    let mut rows = Vec::with_capacity(results.len());
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                eprintln!("Failed to score sample {name}: {e}");
                std::process::exit(3);
            }
        }
    }
    let comp_s = t1.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Computing diversity metrics {comp_s:.3}s"));

    let t2 = Instant::now();
    if let Err(e) = write_scores_csv(&args.output, &header, &names, &rows) {
        eprintln!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    let write_s = t2.elapsed().as_secs_f64();
    log_write_done(!args.quiet, &args.output, write_s);
}

fn log_read_done(args: &Args, count: usize, started: Instant) {
    let read_s = started.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Reading {count} sample files {read_s:.3}s"));
}

fn log_if(show: bool, msg: String) {
    if show { println!("{}", msg); }
}

fn log_write_done(show: bool, output: &PathBuf, secs: f64) {
    if !show { return; }
    let is_stdout = output.as_os_str() == "-";
    if is_stdout {
        println!("Writing to stdout {secs:.3}s");
    } else {
        println!("Writing to output {secs:.3}s");
    }
}
