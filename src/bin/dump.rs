//! ValueStore Inspection Binary
//!
//! Opens a store directory and prints its contents, counters or a
//! consistency report.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use valuestore::{Blob, Config, ValueStore};

/// ValueStore inspection tool
#[derive(Parser, Debug)]
#[command(name = "valuestore-dump")]
#[command(about = "Inspect a deduplicating value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./valuestore_data")]
    data_dir: String,

    /// File name prefix of the store files
    #[arg(short, long, default_value = "values")]
    prefix: String,

    /// Reconstruct records with an unreadable length prefix
    #[arg(short, long)]
    recover: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every ID and its bytes
    Dump,

    /// Print the raw blob log records with their offsets
    Scan,

    /// Print store counters
    Stats,

    /// Verify every ID; exits non-zero on findings
    Check,

    /// Print the ID of a value
    Lookup {
        /// The value to look up
        value: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,valuestore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::debug!("valuestore-dump v{}", valuestore::VERSION);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .file_prefix(args.prefix.as_str())
        .recover_corrupt_data(args.recover)
        .build();

    let store = match open_existing(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let code = match run(&store, &args.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            1
        }
    };

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        std::process::exit(1);
    }
    std::process::exit(code);
}

/// Open a store that is already on disk; never creates files or directories
fn open_existing(config: Config) -> Result<ValueStore, String> {
    let data_path = config.data_path();
    if !data_path.exists() {
        return Err(format!("no store at {}", data_path.display()));
    }
    ValueStore::open(config).map_err(|e| e.to_string())
}

fn run(store: &ValueStore, command: &Commands) -> valuestore::Result<i32> {
    match command {
        Commands::Dump => {
            for id in 1..=store.max_id()? {
                match store.read_data(id) {
                    Ok(Some(Blob::Intact(bytes))) => println!("{}\t{}", id, bytes.escape_ascii()),
                    Ok(Some(Blob::Recovered(bytes))) => {
                        println!("{}\t{}\t(recovered)", id, bytes.escape_ascii())
                    }
                    Ok(None) => println!("{}\t(unset)", id),
                    Err(e) => println!("{}\t(error: {})", id, e),
                }
            }
            Ok(0)
        }

        Commands::Scan => {
            store.scan_blob_log(|offset, bytes| {
                println!("{}\t{}\t{}", offset, bytes.len(), bytes.escape_ascii());
            })?;
            Ok(0)
        }

        Commands::Stats => {
            let stats = store.stats()?;
            println!("max_id:         {}", stats.max_id);
            println!("hash_items:     {}", stats.hash_items);
            println!("bucket_count:   {}", stats.bucket_count);
            println!("blob_log_bytes: {}", stats.blob_log_bytes);
            println!("bloom_active:   {}", stats.bloom_active);
            Ok(0)
        }

        Commands::Check => {
            let report = store.check_consistency()?;
            println!("checked:    {}", report.checked);
            println!("unreadable: {:?}", report.unreadable);
            println!("recovered:  {:?}", report.recovered);
            println!("mismatched: {:?}", report.mismatched);
            Ok(if report.is_consistent() { 0 } else { 2 })
        }

        Commands::Lookup { value } => match store.get_id(value.as_bytes())? {
            Some(id) => {
                println!("{}", id);
                Ok(0)
            }
            None => {
                println!("not found");
                Ok(1)
            }
        },
    }
}
