use std::{io::Write, path::PathBuf, process::ExitCode};

use anyhow::{Context, anyhow};
use catalog_merge::prelude::*;
use chrono::NaiveDate;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CATALOG_MERGE_LOG";

/// Filter, merge and sample platform catalogs into one spreadsheet.
#[derive(Parser, Debug)]
#[command(name = "catalog-merge", version, about)]
struct Cli {
    /// JSON run description; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source catalog as KEY=PATH (repeatable)
    #[arg(short, long = "source", value_parser = parse_source)]
    sources: Vec<SourceDescriptor>,

    #[arg(long)]
    country: Option<String>,

    #[arg(long)]
    age: Option<String>,

    #[arg(long)]
    genre: Option<String>,

    /// Keep films
    #[arg(long)]
    film: bool,

    /// Keep series
    #[arg(long)]
    series: bool,

    /// First publish date kept (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last publish date kept (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Maximum number of output rows, 0 for all
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Process sources concurrently
    #[arg(long)]
    parallel: bool,

    /// Output file (.xlsx or .csv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Vocabulary JSON overriding sentinels, markers and column names
    #[arg(long, env = "CATALOG_MERGE_VOCABULARY")]
    vocabulary: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Hide progress output
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_source(raw: &str) -> Result<SourceDescriptor, String> {
    let (key, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=PATH, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() || path.trim().is_empty() {
        return Err(format!("expected KEY=PATH, got '{raw}'"));
    }
    Ok(SourceDescriptor::new(key, path.trim()))
}

fn init_logger(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    };

    if !cli.sources.is_empty() {
        config.sources = cli.sources.clone();
    }
    let selection = &mut config.selection;
    if let Some(country) = &cli.country {
        selection.country = country.clone();
    }
    if let Some(age) = &cli.age {
        selection.age = age.clone();
    }
    if let Some(genre) = &cli.genre {
        selection.genre = genre.clone();
    }
    selection.film |= cli.film;
    selection.series |= cli.series;
    if let Some(from) = cli.from {
        selection.start_date = from;
    }
    if let Some(to) = cli.to {
        selection.end_date = to;
    }
    if let Some(count) = cli.count {
        selection.display_count = count;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.parallel |= cli.parallel;
    if cli.output.is_some() {
        config.output = cli.output.clone();
    }
    Ok(config)
}

fn exit_code(kind: FailureKind) -> u8 {
    match kind {
        FailureKind::Load => 2,
        FailureKind::EmptyResult => 3,
        FailureKind::Write => 4,
        FailureKind::Cancelled => 5,
        FailureKind::Unexpected => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let request = match prepare(&cli) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(1);
        },
    };

    let quiet = cli.quiet;
    let observer = move |state: RunState, percent: u8, message: &str| {
        if !quiet {
            eprintln!("[{percent:>3}%] {state}: {message}");
        }
    };

    match run(&request, &observer, &CancelFlag::new()) {
        Ok(summary) => match report(&summary, cli.json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {err:#}");
                ExitCode::from(1)
            },
        },
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(trace) = err.trace() {
                eprintln!("{trace}");
            }
            ExitCode::from(exit_code(err.kind()))
        },
    }
}

fn prepare(cli: &Cli) -> anyhow::Result<RunRequest> {
    let config = build_config(cli)?;
    if config.sources.is_empty() {
        return Err(anyhow!("select at least one platform with --source KEY=PATH"));
    }
    let fallback = load_vocabulary(cli.vocabulary.as_deref()).context("loading vocabulary")?;
    Ok(config.into_request(fallback)?)
}

fn report(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, summary)?;
        writeln!(stdout)?;
    } else {
        for source in &summary.per_source {
            writeln!(stdout, "{}: {} rows matched", source.key, source.rows)?;
        }
        writeln!(
            stdout,
            "wrote {} rows to {}",
            summary.rows,
            summary.output.display()
        )?;
    }
    Ok(())
}
