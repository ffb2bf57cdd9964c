//! webamon-misp - Webamon to MISP connector CLI
//!
//! Runs the configured Webamon queries and imports their results into MISP.
//!
//! ## Commands
//!
//! - `run`: search every query and write the results to MISP
//! - `validate`: load settings and queries without contacting anything
//! - `search`: run one Webamon search and print the records

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use webamon_misp_core::{
    create_log_file, init_tracing, load_queries, Connector, MispClient, QueryDefinition,
    SearchClient, Settings, WebamonClient,
};

/// Exit code for configuration and startup errors.
const EXIT_STARTUP: u8 = 2;

#[derive(Parser)]
#[command(name = "webamon-misp")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Import Webamon search results into MISP events", long_about = None)]
struct Cli {
    /// Enable verbose output (debug logging, every duplicate skip logged)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Do not write a per-run log file
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured query and import the results into MISP
    Run {
        /// Queries file (overrides QUERIES_FILE)
        #[arg(short, long)]
        queries: Option<PathBuf>,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        summary_json: bool,
    },

    /// Check settings and the queries file without contacting any API
    Validate {
        /// Queries file (overrides QUERIES_FILE)
        #[arg(short, long)]
        queries: Option<PathBuf>,
    },

    /// Run a single Webamon search and print the records as JSON
    Search {
        /// Lucene query string
        query: String,

        /// Comma-separated fields to request
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run_cli().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

async fn run_cli() -> Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {:?}", path))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let mut settings = Settings::from_env().context("Invalid configuration")?;
    settings.verbose |= cli.verbose;

    // Setup logging
    let level = if cli.verbose || settings.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_path = if cli.no_log_file || !matches!(cli.command, Commands::Run { .. }) {
        init_tracing(cli.json, level, None);
        None
    } else {
        let started = chrono::Local::now().naive_local();
        let (path, file) = create_log_file(&settings.log_dir, started)
            .with_context(|| format!("Failed to create log file in {:?}", settings.log_dir))?;
        init_tracing(cli.json, level, Some(file));
        Some(path)
    };

    match cli.command {
        Commands::Run {
            queries,
            summary_json,
        } => cmd_run(&settings, queries.as_deref(), summary_json, log_path.as_deref()).await,
        Commands::Validate { queries } => cmd_validate(&settings, queries.as_deref()),
        Commands::Search { query, fields } => cmd_search(&settings, &query, &fields).await,
    }
}

fn read_queries(settings: &Settings, override_path: Option<&Path>) -> Result<Vec<QueryDefinition>> {
    let path = override_path.unwrap_or(&settings.queries_file);
    load_queries(path).with_context(|| format!("Failed to load queries from {:?}", path))
}

/// Run every query and import results into MISP
async fn cmd_run(
    settings: &Settings,
    queries_path: Option<&Path>,
    summary_json: bool,
    log_path: Option<&Path>,
) -> Result<ExitCode> {
    let queries = read_queries(settings, queries_path)?;
    if let Some(path) = log_path {
        info!("Logging to {:?}", path);
    }
    info!("Loaded {} queries", queries.len());

    let search = WebamonClient::new(settings).context("Failed to create Webamon client")?;
    let misp = MispClient::new(settings).context("Failed to create MISP client")?;
    let connector =
        Connector::new(&search, &misp, settings.retry_policy()).verbose(settings.verbose);

    let today = chrono::Local::now().date_naive();
    let summary = connector.run(&queries, today).await;

    if summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(ExitCode::from(summary.exit_code()))
}

/// Print the effective settings and queries
fn cmd_validate(settings: &Settings, queries_path: Option<&Path>) -> Result<ExitCode> {
    let queries = read_queries(settings, queries_path)?;

    println!("MISP:            {}", settings.misp.url);
    println!("  verify cert:   {}", settings.misp.verify_cert);
    println!("Webamon:         {}", settings.webamon.url);
    println!("  index / size:  {} / {}", settings.webamon.index, settings.webamon.result_size);
    println!(
        "Retries:         {} (delay {:?}, timeout {:?})",
        settings.retry_count, settings.retry_delay, settings.request_timeout
    );
    println!("Log directory:   {:?}", settings.log_dir);
    println!();
    println!("{} queries:", queries.len());
    for query in &queries {
        println!("  {} -> {}", query.name, query.query);
        if let Some(fields) = &query.fields {
            println!("      fields: {}", fields.join(", "));
        }
        if !query.tags.is_empty() {
            println!("      tags:   {}", query.tags.join(", "));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Run one search and print the records
async fn cmd_search(settings: &Settings, query: &str, fields: &[String]) -> Result<ExitCode> {
    let client = WebamonClient::new(settings).context("Failed to create Webamon client")?;
    let fields = (!fields.is_empty()).then_some(fields);
    let policy = settings.retry_policy();

    let records = webamon_misp_core::retry_call(&policy, "Webamon search", || {
        client.search(query, fields)
    })
    .await
    .into_result()
    .context("Search failed")?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    eprintln!("{} records", records.len());
    Ok(ExitCode::SUCCESS)
}
