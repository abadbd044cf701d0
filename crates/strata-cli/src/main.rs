use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// strata: inspect and migrate schema-versioned record stores.
///
/// All commands operate on SQLite store files.
#[derive(Parser)]
#[command(name = "strata", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the recorded schema version and record counts.
    Status {
        /// Path to the SQLite store file.
        db: String,

        /// Manifest to check the recorded version against.
        #[arg(short, long)]
        manifest: Option<String>,
    },

    /// List record types and ids, or the fields of one record type.
    Inspect {
        /// Path to the SQLite store file.
        db: String,

        /// Record type to show in full.
        record_type: Option<String>,
    },

    /// Export records as JSON for debugging.
    Export {
        /// Path to the SQLite store file.
        db: String,

        /// Record type to export. If omitted, exports every type.
        record_type: Option<String>,
    },

    /// Migrate a store to a schema version through a manifest plan.
    Migrate {
        /// Path to the SQLite store file.
        db: String,

        /// Target schema version.
        #[arg(long)]
        to: String,

        /// Name of the plan in the manifest.
        #[arg(long)]
        plan: String,

        /// Path to the manifest.
        #[arg(short, long, default_value = strata_manifest::DEFAULT_MANIFEST)]
        manifest: String,

        /// Format-recovery retries. Defaults to the engine's budget.
        #[arg(long)]
        retries: Option<u32>,

        /// Show the stages that would run without touching the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a manifest and summarize its schemas and plans.
    Validate {
        /// Path to the manifest.
        #[arg(short, long, default_value = strata_manifest::DEFAULT_MANIFEST)]
        manifest: String,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Status { db, manifest } => commands::status(&db, manifest.as_deref()),
        Commands::Inspect { db, record_type } => commands::inspect(&db, record_type.as_deref()),
        Commands::Export { db, record_type } => commands::export(&db, record_type.as_deref()),
        Commands::Migrate {
            db,
            to,
            plan,
            manifest,
            retries,
            dry_run,
        } => commands::migrate(&db, &to, &plan, &manifest, retries, dry_run),
        Commands::Validate { manifest } => commands::validate(&manifest),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
