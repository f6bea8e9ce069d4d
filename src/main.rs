//! pacfit CLI - PAC function fitting and direct optimisation for parametric models.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pacfit::models::Strategy;
use pacfit::{
    interactive_oracle, lp_solver, Config, DirectPipeline, OraclePool, RunReport, ScenarioPipeline,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pacfit")]
#[command(version)]
#[command(about = "PAC-guaranteed function fitting and AdaptLIPO search over parametric Markov models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "pacfit.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured analysis
    Run {
        /// Override the strategy from the config file
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Random seed for sampling and search
        #[arg(long)]
        seed: Option<u64>,

        /// Number of parallel oracle workers
        #[arg(short, long)]
        threads: Option<usize>,

        /// JSON report path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print ε, η and the sample count without calling the model checker
    Stats,

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Scenario,
    Direct,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Scenario => Strategy::Scenario,
            StrategyArg::Direct => Strategy::Direct,
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load config from {path:?}"))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_example_config() {
    let example = r#"# pacfit configuration file

strategy = "scenario"   # or "direct"

[model]
file = "models/brp.pm"
type = "prism"          # or "jani"
property = 'P=? [ F "target" ]'
constants = { N = 16, MAX = 2 }

[[parameters]]
name = "pL"
lower = 0.1
upper = 0.9

[[parameters]]
name = "pK"
lower = 0.1
upper = 0.9

[oracle]
backend = "wrapper"     # "wrapper", "storm", "stormsmcc", "prismsmc" or "synthetic"
# path = "/opt/storm/bin/storm-wrapper"
# options = ["--exact"]
threads = 4
# timeout_secs = 600
# smc = { method = "apmc", approx = 0.01, conf = 0.05, pathlen = 10000, samples = 1000 }

[scenario]
epsilon = 0.05
eta = 0.05
degree = 2
# template = "1, pL, pK, pL*pK"
# lambda = 0.5
# samples = 200
vertices = "none"       # "none", "replace" or "additive"
boundary_points = 0
# seed = 42
show_range = true

[lp]
solver = "simplex"      # or "octave"
precision = 0.000000001
scaling = 0

[search]
direction = "max"
exploration = 0.1
exploitation_limit = 1000
iteration_limit = 500
# value_absolute = 1e-8
# parameters_relative = 1e-4

[output]
format = "math"         # "math", "latex" or "matlab"
# report = "output/report.json"
"#;
    println!("{example}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;

            info!("Configuration is valid");
            info!("  Strategy: {:?}", config.strategy);
            info!("  Parameters: {}", config.parameters.len());
            info!(
                "  Oracle: {:?} with {} worker(s)",
                config.oracle.backend, config.oracle.threads
            );
            return Ok(());
        }

        Commands::Stats => {
            let config = load_config(&cli.config)?;
            let pipeline = ScenarioPipeline::new(config)?;
            println!("{}", pipeline.statistics());
        }

        Commands::Run {
            strategy,
            seed,
            threads,
            report,
            quiet,
        } => {
            let mut config = load_config(&cli.config)?;

            // CLI overrides
            if let Some(strategy) = strategy {
                config.strategy = strategy.into();
            }
            if let Some(seed) = seed {
                config.scenario.seed = Some(seed);
                config.search.seed = Some(seed);
            }
            if let Some(threads) = threads {
                config.oracle.threads = threads;
            }
            if report.is_some() {
                config.output.report = report;
            }
            config.validate().context("Invalid configuration")?;

            let report_path = config.output.report.clone();
            let run_report = match config.strategy {
                Strategy::Scenario => run_scenario(config, quiet).await?,
                Strategy::Direct => run_direct(config).await?,
            };

            if let Some(path) = report_path {
                run_report
                    .write_json(&path)
                    .with_context(|| format!("Failed to write report to {path:?}"))?;
                println!("Report:      {path:?}");
            }
        }
    }

    Ok(())
}

async fn run_scenario(config: Config, quiet: bool) -> Result<RunReport> {
    let show_range = config.scenario.show_range;
    let pool = OraclePool::from_config(&config)?.with_progress(!quiet);
    let solver = lp_solver(&config.lp);
    let pipeline = ScenarioPipeline::new(config)?;
    let statistics = pipeline.statistics();

    println!("{statistics}");
    let report = pipeline.run(&pool, solver.as_ref()).await?;

    println!("\n=== Scenario Approach Complete ===");
    if show_range {
        if let Some(range) = &report.range {
            println!("Computed range: {range}");
        }
    }
    println!("{}", report.outcome);
    println!("Samples:     {}", report.samples);
    println!("Workers:     {}", pool.size());
    println!("LP solver:   {}", solver.name());
    println!("Runtime:     {:.1}s", report.runtime_secs);

    Ok(RunReport::scenario(statistics, report))
}

async fn run_direct(config: Config) -> Result<RunReport> {
    let oracle = interactive_oracle(&config)?;
    let report = DirectPipeline::new(config).run(oracle.as_ref()).await?;

    println!("\n=== Direct Optimisation Complete ===");
    println!("{report}");
    println!("Runtime:     {:.1}s", report.runtime_secs);

    Ok(RunReport::direct(report))
}
