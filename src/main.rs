//! # Company Intel CLI (`intel`)
//!
//! ## Usage
//!
//! ```bash
//! intel --config ./config/intel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `intel init` | Create the SQLite database and run schema migrations |
//! | `intel upload <file.csv>` | Run the ingestion pipeline over a CSV file |
//! | `intel list` | List stored companies with optional filters |
//! | `intel enrich <id>` | Enrich one company from recent news |
//! | `intel reset --yes` | Delete every stored company |
//! | `intel serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! intel init
//! intel upload ./leads.csv --enrich
//! intel list --country "united states" --size "51-200" --json
//! RUST_LOG=company_intel=debug intel serve
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use company_intel::commands;
use company_intel::config;
use company_intel::models::{CompanyFilters, EmployeeSize};
use company_intel::progress::ProgressMode;
use company_intel::server;

/// Company Intel: CSV ingestion, AI cleaning and news enrichment of
/// B2B company records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/intel.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "intel", version, about = "Company record ingestion, cleaning and enrichment")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/intel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Parse, validate, clean and store the companies in a CSV file.
    ///
    /// Rows that fail validation or cleaning are reported and skipped;
    /// the rest of the file is still processed.
    Upload {
        /// CSV file with a header row (comma- or tab-delimited).
        file: PathBuf,

        /// Also enrich every saved company from recent news.
        #[arg(long)]
        enrich: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Progress output on stderr. Defaults to human when stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// List stored companies, newest first.
    List {
        /// Case-insensitive substring match on country.
        #[arg(long)]
        country: Option<String>,

        /// Exact employee-size bucket, e.g. "51-200" or "10,000+".
        #[arg(long, value_parser = commands::parse_size_arg)]
        size: Option<EmployeeSize>,

        /// Case-insensitive substring match on domain.
        #[arg(long)]
        domain: Option<String>,

        /// Page size (1–100, default 50).
        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,

        #[arg(long)]
        json: bool,
    },

    /// Enrich one stored company from recent news coverage.
    Enrich {
        /// Company id.
        id: String,
    },

    /// Delete every stored company.
    Reset {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Upload {
            file,
            enrich,
            json,
            progress,
        } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_upload(&cfg, &file, enrich, json, mode).await?;
        }
        Commands::List {
            country,
            size,
            domain,
            limit,
            offset,
            json,
        } => {
            let filters = CompanyFilters {
                country,
                employee_size: size,
                domain,
                limit,
                offset,
            };
            commands::run_list(&cfg, filters, json).await?;
        }
        Commands::Enrich { id } => {
            commands::run_enrich(&cfg, &id).await?;
        }
        Commands::Reset { yes } => {
            commands::run_reset(&cfg, yes).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
