mod db;
mod fetcher;
mod model;
mod parser;
mod pipeline;
mod settings;
mod sources;
mod transform;
mod validate;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use db::Store;
use fetcher::{Fetcher, HttpTransport, RetryPolicy};
use model::{CanonicalProblem, Source};
use pipeline::{RunContext, RunSummary};
use settings::Settings;
use sources::{codeforces, leetcode};
use transform::Rejected;

/// Raised by the Ctrl-C handler; the import loops stop between problems.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(
    name = "contest_import",
    about = "Import Codeforces and LeetCode problems into a local problem store"
)]
struct Cli {
    /// SQLite database path (overrides CONTEST_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Log file path (overrides CONTEST_LOG_FILE)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import from the Codeforces problemset API and problem pages
    Codeforces {
        /// Max problems to process
        #[arg(short = 'n', long)]
        limit: Option<i64>,
        #[arg(long)]
        min_rating: Option<i32>,
        #[arg(long)]
        max_rating: Option<i32>,
        /// Use API metadata only, don't fetch problem pages
        #[arg(long)]
        skip_html: bool,
        /// Transform and validate without writing to the database
        #[arg(long)]
        dry_run: bool,
        /// Also write the produced problems to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import from the LeetCode GraphQL API
    Leetcode {
        /// Max problems to process
        #[arg(short = 'n', long)]
        limit: Option<i64>,
        /// Offset into the problem list
        #[arg(long, default_value_t = 0)]
        skip: usize,
        /// easy, medium or hard
        #[arg(long)]
        difficulty: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show stored problem counts by source and difficulty
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load().context("reading CONTEST_* environment")?;

    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(log_file) = cli.log_file {
        settings.log_file = log_file;
    }
    settings.verbose |= cli.verbose;

    let mut output = None;
    let mut skip_html = false;
    let mut skip = 0;
    match &cli.command {
        Commands::Codeforces {
            limit,
            min_rating,
            max_rating,
            skip_html: no_html,
            dry_run,
            output: out,
        } => {
            if let Some(l) = limit {
                settings.problem_limit = *l;
            }
            settings.min_rating = min_rating.or(settings.min_rating);
            settings.max_rating = max_rating.or(settings.max_rating);
            settings.dry_run |= *dry_run;
            skip_html = *no_html;
            output = out.clone();
        }
        Commands::Leetcode {
            limit,
            skip: offset,
            difficulty,
            dry_run,
            output: out,
        } => {
            if let Some(l) = limit {
                settings.problem_limit = *l;
            }
            if difficulty.is_some() {
                settings.difficulty = difficulty.clone();
            }
            settings.dry_run |= *dry_run;
            skip = *offset;
            output = out.clone();
        }
        Commands::Stats => {}
    }

    if let Err(errors) = settings.validate() {
        for e in &errors {
            eprintln!("config error: {}", e);
        }
        bail!("invalid configuration ({} errors)", errors.len());
    }

    init_tracing(settings.verbose, &settings.log_file)?;
    info!(settings = ?settings, "Starting contest import");

    if let Commands::Stats = cli.command {
        let store = open_store(&settings.db_path)?;
        return print_stats(&store);
    }

    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    let store = if settings.dry_run {
        info!("DRY RUN: no database changes will be made");
        None
    } else {
        Some(open_store(&settings.db_path)?)
    };

    let (source, summary) = match cli.command {
        Commands::Codeforces { .. } => (
            Source::Codeforces,
            run_codeforces(&settings, store.as_ref(), skip_html)?,
        ),
        Commands::Leetcode { .. } => (Source::LeetCode, run_leetcode(&settings, store.as_ref(), skip)?),
        Commands::Stats => unreachable!("handled above"),
    };

    summary.log(source.as_str(), settings.dry_run);
    if let Some(path) = output {
        write_output(&path, &summary.problems)?;
        info!("Wrote {} problems to {}", summary.problems.len(), path.display());
    }
    Ok(())
}

fn init_tracing(verbose: bool, log_file: &Path) -> Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("opening log file {:?}", log_file))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

fn open_store(path: &Path) -> Result<Store> {
    let store = Store::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    info!("Database: {:?} (system author #{})", path, store.system_author());
    Ok(store)
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn http_fetcher(settings: &Settings, source: Source) -> Result<Fetcher<HttpTransport>> {
    let transport = HttpTransport::new(settings.timeout()).context("building HTTP client")?;
    Ok(Fetcher::new(
        transport,
        RetryPolicy {
            delay: settings.delay_for(source),
            max_retries: settings.max_retries,
        },
    ))
}

fn run_codeforces(settings: &Settings, store: Option<&Store>, skip_html: bool) -> Result<RunSummary> {
    let mut fetcher = http_fetcher(settings, Source::Codeforces)?;
    let set = codeforces::fetch_problemset(&mut fetcher).context("fetching Codeforces problemset")?;
    let selected = codeforces::select(
        set.problems,
        settings.min_rating,
        settings.max_rating,
        settings.limit(),
    );
    info!(
        "Processing {} problems (rating {}..{}){}",
        selected.len(),
        settings.min_rating.map_or("-".into(), |r| r.to_string()),
        settings.max_rating.map_or("-".into(), |r| r.to_string()),
        if skip_html { ", API metadata only" } else { "" }
    );

    let statistics = set.statistics;
    let mut ctx = RunContext::new(store).stop_on(&INTERRUPTED);
    let pb = progress_bar(selected.len());

    for problem in &selected {
        if ctx.should_stop() {
            break;
        }
        let key = problem.key();
        let label = key.clone().unwrap_or_else(|| problem.name.clone());
        if let Some(k) = &key {
            if ctx.skip_if_stored(&transform::codeforces_external_id(k)) {
                pb.inc(1);
                continue;
            }
        }

        ctx.import(&label, || {
            let (contest_id, index) = transform::codeforces_identity(problem)?;
            let page = if skip_html {
                None
            } else {
                let html = codeforces::fetch_problem_page(&mut fetcher, contest_id, index)?;
                Some(parser::codeforces::extract_page(&html, contest_id, index))
            };
            let stats = key.as_ref().and_then(|k| statistics.get(k));
            Ok(transform::codeforces_problem(problem, stats, page)?)
        });
        pb.set_message(ctx.tally().brief());
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(ctx.finish())
}

fn run_leetcode(settings: &Settings, store: Option<&Store>, skip: usize) -> Result<RunSummary> {
    let mut fetcher = http_fetcher(settings, Source::LeetCode)?;
    let questions =
        leetcode::fetch_question_list(&mut fetcher, settings.limit(), skip, settings.difficulty())
            .context("fetching LeetCode question list")?;

    let mut ctx = RunContext::new(store).stop_on(&INTERRUPTED);
    let pb = progress_bar(questions.len());

    for question in &questions {
        if ctx.should_stop() {
            break;
        }
        let slug = question.title_slug.trim();
        let label = if slug.is_empty() { question.title.as_str() } else { slug };
        if !slug.is_empty()
            && !question.is_paid_only
            && ctx.skip_if_stored(&transform::leetcode_external_id(slug))
        {
            pb.inc(1);
            continue;
        }

        ctx.import(label, || {
            if question.is_paid_only {
                return Err(Rejected::PaidOnly.into());
            }
            if slug.is_empty() {
                return Err(Rejected::MissingId.into());
            }
            let detail = leetcode::fetch_question(&mut fetcher, slug)?;
            Ok(transform::leetcode_problem(&detail)?)
        });
        pb.set_message(ctx.tally().brief());
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(ctx.finish())
}

fn write_output(path: &Path, problems: &[CanonicalProblem]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(problems)?;
    std::fs::write(path, json).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

fn print_stats(store: &Store) -> Result<()> {
    let counts = store.count_by_source_and_difficulty()?;
    if counts.is_empty() {
        println!("No problems stored yet.");
        return Ok(());
    }

    println!("{:<12} | {:<8} | {:>6}", "Source", "Level", "Count");
    println!("{}", "-".repeat(32));
    let mut total = 0;
    for c in &counts {
        println!("{:<12} | {:<8} | {:>6}", c.source, c.difficulty, c.count);
        total += c.count;
    }
    println!("{}", "-".repeat(32));
    println!("{:<12} | {:<8} | {:>6}", "Total", "", total);
    Ok(())
}
