use clap::Parser;
use futures::StreamExt;
use std::io::prelude::*;

use jobshop_sim::policy::Policy;
use jobshop_sim::sampler::TriangularParams;
use jobshop_sim::simulation::{simulate, summarize, Config, Summary};
use jobshop_sim::workload;

#[derive(Debug, Clone, clap::Parser)]
#[command(long_about = None)]
struct Args {
    /// CSV file with job_id,job_type,arrival_time rows; empty for a
    /// synthetic workload
    #[arg(long, default_value_t = String::from(""))]
    jobs_file: String,
    /// Number of H orders in the synthetic workload
    #[arg(long, default_value_t = 10)]
    num_high: usize,
    /// Number of N orders in the synthetic workload
    #[arg(long, default_value_t = 90)]
    num_normal: usize,
    /// Average interarrival between H orders, in minutes
    #[arg(long, default_value_t = 300.0)]
    h_interarrival: f64,
    /// Average interarrival between N orders, in minutes
    #[arg(long, default_value_t = 30.0)]
    n_interarrival: f64,
    /// Number of machines in pool A (slower, N only)
    #[arg(long, default_value_t = 3)]
    a_machines: usize,
    /// Number of machines in pool B (faster, mandatory for H)
    #[arg(long, default_value_t = 2)]
    b_machines: usize,
    /// Triangular min,mode,max of N on pool A, in minutes
    #[arg(long, default_value_t = String::from("360,480,840"))]
    tri_a_n: String,
    /// Triangular min,mode,max of H on pool B, in minutes
    #[arg(long, default_value_t = String::from("300,400,800"))]
    tri_b_h: String,
    /// Triangular min,mode,max of N on pool B, in minutes
    #[arg(long, default_value_t = String::from("200,280,600"))]
    tri_b_n: String,
    /// A load at or above which OPT may route N to B
    #[arg(long, default_value_t = 4)]
    a_busy_threshold: usize,
    /// A load at or above which COMPOSITE may route N to B
    #[arg(long, default_value_t = 6)]
    a_queue_strict_limit: usize,
    /// Look-ahead window reserving idle B machines for H, in minutes
    #[arg(long, default_value_t = 60.0)]
    b_reservation_window: f64,
    /// Due-date slack multiplier used when materializing jobs
    #[arg(long, default_value_t = 3.0)]
    due_date_factor: f64,
    /// Arrival-time compression factor for sensitivity runs (1 = none)
    #[arg(long, default_value_t = 1.0)]
    compression: f64,
    /// Dispatching policy, or "all" to sweep every policy
    #[arg(long, default_value_t = String::from("all"))]
    policy: String,
    /// Initial seed to initialize the pseudo-random number generators
    #[arg(long, default_value_t = 42)]
    seed_init: u64,
    /// Final seed (exclusive) to initialize the pseudo-random number generators
    #[arg(long, default_value_t = 43)]
    seed_end: u64,
    /// Number of parallel workers
    #[arg(long, default_value_t = std::thread::available_parallelism().unwrap().get())]
    concurrency: usize,
    /// Name of the CSV output file where to save the metrics collected.
    #[arg(long, default_value_t = String::from("out.csv"))]
    output: String,
    /// Append to the output file.
    #[arg(long, default_value_t = false)]
    append: bool,
    /// Additional fields recorded in the CSV output file.
    #[arg(long, default_value_t = String::from(""))]
    additional_fields: String,
    /// Header of additional fields recorded in the CSV output file.
    #[arg(long, default_value_t = String::from(""))]
    additional_header: String,
}

fn parse_triangular(spec: &str) -> anyhow::Result<TriangularParams> {
    let tokens = spec.split(',').map(str::trim).collect::<Vec<&str>>();
    anyhow::ensure!(tokens.len() == 3, "expected min,mode,max: {}", spec);
    Ok(TriangularParams::new(
        tokens[0].parse()?,
        tokens[1].parse()?,
        tokens[2].parse()?,
    ))
}

#[derive(Clone)]
struct RunSpec {
    policy: Policy,
    config: Config,
    jobs_file: String,
    num_high: usize,
    num_normal: usize,
    h_interarrival: f64,
    n_interarrival: f64,
    compression: f64,
}

fn run_one(spec: RunSpec) -> anyhow::Result<(Policy, u64, Summary)> {
    let jobs = if spec.jobs_file.is_empty() {
        workload::generate_jobs(
            spec.num_high,
            spec.num_normal,
            spec.h_interarrival,
            spec.n_interarrival,
            &spec.config,
        )?
    } else {
        workload::load_jobs(&spec.jobs_file, &spec.config)?
    };
    let jobs = if spec.compression != 1.0 {
        workload::compress_arrivals(&jobs, spec.compression)
    } else {
        jobs
    };
    let seed = spec.config.base_seed;
    let results = simulate(jobs, spec.policy.clone(), spec.config)?;
    let summary = summarize(&results);
    log::info!("{} seed {} done: {}", spec.policy, seed, summary);
    Ok((spec.policy, seed, summary))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    anyhow::ensure!(args.seed_init < args.seed_end, "empty seed range");
    anyhow::ensure!(args.concurrency > 0, "vanishing concurrency");
    anyhow::ensure!(
        args.compression.is_finite() && args.compression > 0.0,
        "invalid compression factor"
    );

    let policies = if args.policy == "all" {
        Policy::all()
    } else {
        vec![Policy::from(&args.policy)?]
    };

    let mut specs = vec![];
    for seed in args.seed_init..args.seed_end {
        for policy in &policies {
            specs.push(RunSpec {
                policy: policy.clone(),
                config: Config {
                    a_machines: args.a_machines,
                    b_machines: args.b_machines,
                    tri_a_n: parse_triangular(&args.tri_a_n)?,
                    tri_b_h: parse_triangular(&args.tri_b_h)?,
                    tri_b_n: parse_triangular(&args.tri_b_n)?,
                    a_busy_threshold: args.a_busy_threshold,
                    a_queue_strict_limit: args.a_queue_strict_limit,
                    b_reservation_window: args.b_reservation_window,
                    due_date_factor: args.due_date_factor,
                    base_seed: seed,
                },
                jobs_file: args.jobs_file.clone(),
                num_high: args.num_high,
                num_normal: args.num_normal,
                h_interarrival: args.h_interarrival,
                n_interarrival: args.n_interarrival,
                compression: args.compression,
            });
        }
    }

    let outcomes = futures::stream::iter(specs.into_iter().map(|spec| async move {
        match tokio::task::spawn_blocking(move || run_one(spec)).await {
            Ok(outcome) => outcome,
            Err(err) => Err(anyhow::anyhow!("simulation task failed: {}", err)),
        }
    }))
    .buffer_unordered(args.concurrency)
    .collect::<Vec<anyhow::Result<(Policy, u64, Summary)>>>()
    .await;

    let mut rows = vec![];
    for outcome in outcomes {
        rows.push(outcome?);
    }
    rows.sort_by_key(|(policy, seed, _)| (policy.to_string(), *seed));

    let mut outfile = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(args.append)
        .truncate(!args.append)
        .open(&args.output)?;
    if !args.append {
        let additional_header = if args.additional_header.is_empty() {
            String::from("")
        } else {
            format!(",{}", args.additional_header)
        };
        writeln!(
            outfile,
            "policy,seed,compression,{}{}",
            Summary::header(),
            additional_header
        )?;
    }
    let additional_fields = if args.additional_fields.is_empty() {
        String::from("")
    } else {
        format!(",{}", args.additional_fields)
    };
    for (policy, seed, summary) in rows {
        writeln!(
            outfile,
            "{},{},{},{}{}",
            policy, seed, args.compression, summary, additional_fields
        )?;
    }

    Ok(())
}
