// iprtrack - keeps the company registry in step with the portal scrape,
// the company lookup service, the document folders and the shared sheet

mod error;
mod exit_codes;
mod fetch;
mod logging;
mod pipeline;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use iprtrack_config::Settings;
use iprtrack_core::model::display_folder_date;
use iprtrack_io::{export_csv, project, read_observations, ObservationFormat, RegistryStore};
use iprtrack_recon::{CancelToken, FolderLayout, PassOptions, ReconReport, Registry};
use tracing::info;

pub use error::CliError;
use exit_codes::EXIT_SUCCESS;
use fetch::{SheetsClient, TokenFlags};
use pipeline::Session;

#[derive(Parser)]
#[command(name = "iprtrack")]
#[command(about = "Company registry reconciler (scrape -> registry -> status -> folders -> sheet)")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")"))]
struct Cli {
    /// Config file (default: <config dir>/iprtrack/config.toml)
    #[arg(long, global = true, env = "IPRTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Company lookup API key (default: env var named by [status] token_env)
    #[arg(long, global = true)]
    dadata_token: Option<String>,

    /// Folder store OAuth token (default: env var named by [freshness] token_env)
    #[arg(long, global = true)]
    yadisk_token: Option<String>,

    /// Sheets bearer token (default: env var named by [publish] token_env)
    #[arg(long, global = true)]
    sheets_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Header row naming `name` and `inn` columns
    Csv,
    /// Scraped list items, `<name> (<digits>)` per line
    Lines,
}

impl From<InputFormat> for ObservationFormat {
    fn from(f: InputFormat) -> Self {
        match f {
            InputFormat::Csv => ObservationFormat::Csv,
            InputFormat::Lines => ObservationFormat::Lines,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a scrape into the registry (append-only)
    #[command(after_help = "\
Examples:
  iprtrack reconcile --input scrape.csv
  iprtrack reconcile --input scrape.txt --format lines")]
    Reconcile {
        /// Scrape output: CSV with name/inn columns or scraped lines
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Input format (default: by extension, .csv/.tsv are CSV)
        #[arg(long, short = 'f')]
        format: Option<InputFormat>,
    },

    /// Refresh legal status and names of every record
    Status,

    /// Refresh the two latest dated subfolders of every record
    Freshness,

    /// Pull links from the shared sheet, then republish the registry to it
    Publish,

    /// Reconcile, then status, freshness and publish, in that order
    #[command(after_help = "\
Examples:
  iprtrack run --input scrape.csv
  iprtrack run --input scrape.csv --skip-publish
  DADATA_API_KEY=... YADISK_TOKEN=... iprtrack run --input scrape.txt --format lines")]
    Run {
        #[arg(long, short = 'i')]
        input: PathBuf,

        #[arg(long, short = 'f')]
        format: Option<InputFormat>,

        #[arg(long)]
        skip_status: bool,

        #[arg(long)]
        skip_freshness: bool,

        #[arg(long)]
        skip_publish: bool,
    },

    /// Print the registry
    Show {
        /// One JSON array of records instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write the published projection to a CSV file
    Export {
        #[arg(long, short = 'o')]
        out: PathBuf,
    },
}

impl Commands {
    /// Commands that change the registry write the change log.
    fn mutates(&self) -> bool {
        !matches!(self, Commands::Show { .. } | Commands::Export { .. })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let (settings, source) = Settings::load(cli.config.as_deref())?;

    let _guard = if cli.command.mutates() {
        Some(logging::init_with_file(&settings.log.file)?)
    } else {
        logging::init_stderr();
        None
    };
    match &source {
        Some(path) => info!("config: {}", path.display()),
        None => info!("config: defaults"),
    }

    let tokens = TokenFlags {
        dadata: cli.dadata_token,
        yadisk: cli.yadisk_token,
        sheets: cli.sheets_token,
    };
    let cancel = CancelToken::new();

    match cli.command {
        Commands::Reconcile { input, format } => cmd_reconcile(&settings, &input, format),
        Commands::Status => cmd_status(&settings, &tokens, &cancel),
        Commands::Freshness => cmd_freshness(&settings, &tokens, &cancel),
        Commands::Publish => cmd_publish(&settings, &tokens, &cancel),
        Commands::Run {
            input,
            format,
            skip_status,
            skip_freshness,
            skip_publish,
        } => cmd_run(
            &settings,
            &tokens,
            &cancel,
            &input,
            format,
            Stages { status: !skip_status, freshness: !skip_freshness, publish: !skip_publish },
        ),
        Commands::Show { json } => cmd_show(&settings, json),
        Commands::Export { out } => cmd_export(&settings, &out),
    }
}

// ============================================================================
// stage helpers
// ============================================================================

fn status_options(settings: &Settings, cancel: &CancelToken) -> PassOptions {
    PassOptions {
        concurrency: settings.status.concurrency,
        retry: fetch::retry_policy(&settings.retry.batch),
        cancel: cancel.clone(),
    }
}

fn freshness_options(settings: &Settings, cancel: &CancelToken) -> PassOptions {
    PassOptions {
        concurrency: settings.freshness.concurrency,
        retry: fetch::retry_policy(&settings.retry.batch),
        cancel: cancel.clone(),
    }
}

fn folder_layout(settings: &Settings) -> FolderLayout {
    FolderLayout {
        root: settings.freshness.root.clone(),
        date_delimiter: settings.freshness.date_delimiter.clone(),
    }
}

fn read_input(input: &Path, format: Option<InputFormat>) -> Result<Vec<iprtrack_core::Observation>, CliError> {
    if !input.exists() {
        return Err(CliError::args(format!("input file not found: {}", input.display())));
    }
    let format = format
        .map(ObservationFormat::from)
        .unwrap_or_else(|| ObservationFormat::from_path(input));
    Ok(read_observations(input, format)?)
}

fn print_recon_summary(report: &ReconReport) {
    println!(
        "reconciled: {} appended, {} known ({} unmarked), {} excluded, {} duplicate(s), {} rejected",
        report.appended.len(),
        report.known,
        report.cleared.len(),
        report.excluded.len(),
        report.duplicates.len(),
        report.rejected.len(),
    );
}

fn publish_stage(session: &mut Session, sheets: &SheetsClient, url_column: usize) -> Result<(), CliError> {
    let links = sheets.fetch_links(url_column)?;
    session.merge_links(&links)?;
    let rows = project(session.registry());
    let report = sheets.publish(&rows)?;
    println!("published: {} row(s), {} highlighted", report.rows, report.highlighted);
    Ok(())
}

fn publication_disabled() -> CliError {
    CliError::config("no spreadsheet configured for publication")
        .with_hint("set [publish] spreadsheet_id in the config file")
}

// ============================================================================
// reconcile / status / freshness / publish
// ============================================================================

fn cmd_reconcile(settings: &Settings, input: &Path, format: Option<InputFormat>) -> Result<(), CliError> {
    let observed = read_input(input, format)?;
    let exclusions = settings.exclusion_set()?;

    let mut session = Session::open(&settings.registry)?;
    let report = session.reconcile(&observed, &exclusions)?;
    print_recon_summary(&report);
    Ok(())
}

fn cmd_status(settings: &Settings, tokens: &TokenFlags, cancel: &CancelToken) -> Result<(), CliError> {
    let client = fetch::status_client(settings, tokens, cancel)?;

    let mut session = Session::open(&settings.registry)?;
    let report = session.status(&client, &status_options(settings, cancel), &settings.names.merger_keywords)?;
    println!(
        "status: {} checked, {} changed, {} unknown",
        report.checked,
        report.transitions.len(),
        report.unknown
    );
    Ok(())
}

fn cmd_freshness(settings: &Settings, tokens: &TokenFlags, cancel: &CancelToken) -> Result<(), CliError> {
    let client = fetch::freshness_client(settings, tokens, cancel)?;

    let mut session = Session::open(&settings.registry)?;
    let report = session.freshness(&client, &freshness_options(settings, cancel), &folder_layout(settings))?;
    println!(
        "freshness: {} checked, {} changed, {} missing",
        report.checked,
        report.changes.len(),
        report.skipped.len()
    );
    Ok(())
}

fn cmd_publish(settings: &Settings, tokens: &TokenFlags, cancel: &CancelToken) -> Result<(), CliError> {
    let sheets = fetch::sheets_client(settings, tokens, cancel)?.ok_or_else(publication_disabled)?;

    let mut session = Session::open(&settings.registry)?;
    publish_stage(&mut session, &sheets, settings.publish.url_column)
}

// ============================================================================
// run
// ============================================================================

struct Stages {
    status: bool,
    freshness: bool,
    publish: bool,
}

fn cmd_run(
    settings: &Settings,
    tokens: &TokenFlags,
    cancel: &CancelToken,
    input: &Path,
    format: Option<InputFormat>,
    stages: Stages,
) -> Result<(), CliError> {
    // Resolve everything that can fail cheaply before touching the registry.
    let observed = read_input(input, format)?;
    let exclusions = settings.exclusion_set()?;
    let status_client = if stages.status {
        Some(fetch::status_client(settings, tokens, cancel)?)
    } else {
        None
    };
    let freshness_client = if stages.freshness {
        Some(fetch::freshness_client(settings, tokens, cancel)?)
    } else {
        None
    };
    let sheets = if stages.publish {
        let client = fetch::sheets_client(settings, tokens, cancel)?;
        if client.is_none() {
            info!("publication skipped: no [publish] spreadsheet_id");
        }
        client
    } else {
        None
    };

    let mut session = Session::open(&settings.registry)?;

    let report = session.reconcile(&observed, &exclusions)?;
    print_recon_summary(&report);

    if let Some(client) = &status_client {
        let report = session.status(client, &status_options(settings, cancel), &settings.names.merger_keywords)?;
        println!("status: {} checked, {} changed", report.checked, report.transitions.len());
    }

    if let Some(client) = &freshness_client {
        let report = session.freshness(client, &freshness_options(settings, cancel), &folder_layout(settings))?;
        println!("freshness: {} checked, {} changed", report.checked, report.changes.len());
    }

    if let Some(sheets) = &sheets {
        publish_stage(&mut session, sheets, settings.publish.url_column)?;
    }

    Ok(())
}

// ============================================================================
// show / export
// ============================================================================

fn load_read_only(settings: &Settings) -> Result<Registry, CliError> {
    let store = RegistryStore::new(&settings.registry.path, &settings.registry.backup_dir);
    Ok(store.load()?)
}

fn cmd_show(settings: &Settings, json: bool) -> Result<(), CliError> {
    let registry = load_read_only(settings)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if json {
        let text = serde_json::to_string_pretty(registry.records())
            .map_err(|e| CliError::new(exit_codes::EXIT_ERROR, e.to_string()))?;
        writeln!(out, "{}", text).map_err(|e| CliError::io(e.to_string()))?;
        return Ok(());
    }

    for record in registry.iter() {
        writeln!(
            out,
            "{:>4}  {:<12}  {:<14}  {:<10}  {}{}",
            record.sequence_number,
            record.tax_id,
            record.status.label(),
            display_folder_date(&record.folder_latest_date),
            record.folder_name(),
            if record.is_new { "  [NEW]" } else { "" },
        )
        .map_err(|e| CliError::io(e.to_string()))?;
    }
    Ok(())
}

fn cmd_export(settings: &Settings, out: &Path) -> Result<(), CliError> {
    let registry = load_read_only(settings)?;
    let rows = project(&registry);
    export_csv(&rows, out)?;
    eprintln!("exported {} row(s) to {}", rows.len(), out.display());
    Ok(())
}
