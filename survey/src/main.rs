//! `survey` CLI.
//!
//! Surveys one street at a time: discovers residential addresses, fetches
//! satellite imagery, and records how likely each property is to have a
//! vegetable garden. Results live under `data_dir` and runs resume where the
//! last one stopped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use survey::core::types::StreetTarget;
use survey::exit_codes;
use survey::io::classifier::CommandClassifier;
use survey::io::config::{DEFAULT_CONFIG_FILE, SurveyConfig, load_config, write_config};
use survey::io::google::GoogleMaps;
use survey::io::result_store::StoreCorruptionError;
use survey::logging;
use survey::core::summary::{CompiledCounts, LikelihoodCounts};
use survey::survey::{
    Capabilities, SurveyRequest, compile_streets, dedupe_street, run_survey, street_summary,
};

/// Scratch directory (under `data_dir`) for classifier input images.
const SCRATCH_DIR: &str = ".scratch";

#[derive(Parser)]
#[command(
    name = "survey",
    version,
    about = "Resumable street survey for backyard vegetable gardens"
)]
struct Cli {
    /// Config file; missing means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Log at `info` unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct StreetArgs {
    /// Street name, e.g. "Wirraway St".
    #[arg(long)]
    street: String,
    /// Suburb or town, e.g. "East Albury".
    #[arg(long)]
    suburb: String,
}

impl StreetArgs {
    fn target(&self) -> StreetTarget {
        StreetTarget::new(&self.street, &self.suburb)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file with default settings.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Discover and classify addresses on a street.
    Street {
        #[command(flatten)]
        target: StreetArgs,
        /// Lowest house number (switches to manual mode).
        #[arg(long, allow_negative_numbers = true)]
        min: Option<i64>,
        /// Highest house number (switches to manual mode).
        #[arg(long, allow_negative_numbers = true)]
        max: Option<i64>,
        /// Maximum addresses to classify this run.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Re-probe and overwrite addresses stored as `unknown`.
        #[arg(long)]
        retry_unknown: bool,
    },
    /// Print likelihood counts for a street's stored results.
    Summary {
        #[command(flatten)]
        target: StreetArgs,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print likelihood counts for every stored street and overall.
    Compile {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Collapse stored entries that share a house number.
    Dedupe {
        #[command(flatten)]
        target: StreetArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        let code = if err.downcast_ref::<StoreCorruptionError>().is_some() {
            exit_codes::STORE_CORRUPT
        } else {
            exit_codes::INVALID
        };
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Street {
            target,
            min,
            max,
            limit,
            retry_unknown,
        } => {
            let config = load(&cli.config)?;
            let mut request = SurveyRequest::new(target.target(), min, max, limit);
            request.retry_unknown = retry_unknown;
            cmd_street(&config, &request)
        }
        Command::Summary { target, json } => {
            cmd_summary(&load(&cli.config)?, &target.target(), json)
        }
        Command::Compile { json } => cmd_compile(&load(&cli.config)?, json),
        Command::Dedupe { target } => cmd_dedupe(&load(&cli.config)?, &target.target()),
    }
}

fn load(path: &Path) -> Result<SurveyConfig> {
    load_config(path).with_context(|| format!("load config {}", path.display()))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &SurveyConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn cmd_street(config: &SurveyConfig, request: &SurveyRequest) -> Result<()> {
    let google = GoogleMaps::from_config(&config.google, config.probe_delay())?;
    let classifier = CommandClassifier::new(&config.classifier, config.data_dir.join(SCRATCH_DIR))?;
    let caps = Capabilities {
        resolver: &google,
        detector: &google,
        probe: &google,
        fetcher: &google,
        classifier: &classifier,
    };

    let report = run_survey(config, caps, request, None, |outcome| {
        println!(
            "[{}] {}: {}",
            outcome.index + 1,
            outcome.result.address,
            outcome.result.garden_likelihood.as_str()
        );
    })?;
    println!("{report}");
    Ok(())
}

fn cmd_summary(config: &SurveyConfig, target: &StreetTarget, json: bool) -> Result<()> {
    let counts = street_summary(config, target)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&counts).context("serialize summary")?
        );
        return Ok(());
    }
    println!("{}", target.label());
    print_counts(&counts);
    Ok(())
}

fn print_counts(counts: &LikelihoodCounts) {
    println!("  high:    {}", counts.high);
    println!("  medium:  {}", counts.medium);
    println!("  low:     {}", counts.low);
    println!("  unknown: {}", counts.unknown);
    println!("  total:   {}", counts.total());
}

fn cmd_compile(config: &SurveyConfig, json: bool) -> Result<()> {
    let compiled = compile_streets(config)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&compiled).context("serialize compiled counts")?
        );
        return Ok(());
    }
    print_compiled(&compiled);
    Ok(())
}

fn print_compiled(compiled: &CompiledCounts) {
    for street in &compiled.streets {
        println!("{}", street.label);
        print_counts(&street.counts);
    }
    let overall = &compiled.overall;
    println!("All streets ({})", compiled.streets.len());
    print_counts(overall);
    println!(
        "  medium or high: {} ({:.1}% of classified)",
        overall.medium_or_high(),
        overall.percent_of_classified(overall.medium_or_high())
    );
    println!(
        "  high only:      {} ({:.1}% of classified)",
        overall.high,
        overall.percent_of_classified(overall.high)
    );
}

fn cmd_dedupe(config: &SurveyConfig, target: &StreetTarget) -> Result<()> {
    let report = dedupe_street(config, target)?;
    for address in &report.removed {
        println!("removed {address}");
    }
    println!(
        "{}: kept {}, removed {}",
        target.label(),
        report.kept,
        report.removed.len()
    );
    Ok(())
}
