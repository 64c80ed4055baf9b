use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::*;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use isq_harvest::config::*;
use isq_harvest::database::Store;
use isq_harvest::department::*;
use isq_harvest::faculty::resolve_target;
use isq_harvest::fetch::HttpFetcher;
use isq_harvest::reconcile::Reconciler;
use isq_harvest::report::write_report;
use isq_harvest::terms::Term;

#[derive(Parser)]
#[command(name = "isq-harvest", version)]
#[command(about = "Harvest ISQs, grade distributions and schedules into SQLite and CSV")]
#[command(subcommand_negates_reqs = true)]
struct Cli {
    #[command(flatten)]
    options: Options,

    /// Course code (COT3100), instructor id (N00123456) or instructor name
    #[arg(required = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every section a department offers in one term to CSV
    Department {
        /// Numeric department id, e.g. 6502
        dept: u32,
        /// Term such as "Spring 2019"
        term: String,
    },
}

#[derive(Args)]
struct Options {
    /// Always go to the network, neither reading nor writing the page cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[arg(long, global = true, env = "ISQ_HARVEST_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    #[arg(long, global = true, env = "ISQ_HARVEST_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Directory the CSV report is written to
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, global = true, default_value = DEFAULT_FACULTY_URL)]
    faculty_url: String,

    /// Pause between network requests
    #[arg(long, global = true, default_value_t = 1000)]
    delay_ms: u64,
}

impl Options {
    fn to_config(&self) -> Config {
        Config {
            base_url: self.base_url.clone(),
            faculty_url: self.faculty_url.clone(),
            cache_dir: if self.no_cache {
                None
            } else {
                Some(self.cache_dir.clone())
            },
            db_path: self.db.clone(),
            output_dir: self.out_dir.clone(),
            request_delay: Duration::from_millis(self.delay_ms),
            ..Config::default()
        }
    }
}

async fn harvest(fetcher: &HttpFetcher, config: &Config, raw_target: &str) -> anyhow::Result<()> {
    let target = resolve_target(fetcher, config, raw_target)
        .await
        .with_context(|| format!("could not resolve {:?}", raw_target))?;

    let harvest = Reconciler::new(fetcher, config)
        .run(&target)
        .await
        .with_context(|| format!("could not harvest {}", target))?;

    for failure in &harvest.schedule_failures {
        warn!("{} has no schedule data: {}", failure.query, failure.error);
    }

    // The database and the report both read the same records
    let records = Arc::new(harvest.records);

    let db_records = Arc::clone(&records);
    let db_path = config.db_path.clone();
    let store_task = tokio::task::spawn_blocking(move || {
        let mut store = Store::open(&db_path)?;
        store.save(&db_records)
    });

    let report_path =
        write_report(config, target.name(), &records).context("could not write the report")?;

    let summary = store_task
        .await
        .context("database task panicked")?
        .with_context(|| format!("could not save to {}", config.db_path.display()))?;
    info!(
        "Saved to {} ({} new rows, {} already stored)",
        config.db_path.display(),
        summary.inserted,
        summary.duplicates
    );

    println!("Found {} records", records.len());
    println!("Wrote {}", report_path.display());
    Ok(())
}

async fn department(
    fetcher: &HttpFetcher,
    config: &Config,
    dept: u32,
    term: &str,
) -> anyhow::Result<()> {
    let term = Term::parse(term)?;

    let sections = fetch_department(fetcher, config, dept, &term)
        .await
        .with_context(|| format!("could not fetch department {} for {}", dept, term))?;

    let path = write_department_report(config, dept, &term, &sections)
        .context("could not write the department report")?;

    println!("Found {} sections", sections.len());
    println!("Wrote {}", path.display());
    Ok(())
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let config = cli.options.to_config();

    match &config.cache_dir {
        Some(dir) => info!("Caching pages in {}", dir.display()),
        None => info!("Page cache disabled"),
    }

    let fetcher = HttpFetcher::new(&config).context("could not build the HTTP client")?;

    match cli.command {
        Some(Commands::Department { dept, term }) => department(&fetcher, &config, dept, &term).await,
        None => {
            let target = cli.target.unwrap_or_default();
            harvest(&fetcher, &config, &target).await
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .thread_name("isq-harvest")
        .build();

    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start the runtime: {}", e);
            exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(cli)) {
        error!("{:#}", e);
        exit(1);
    }
}
