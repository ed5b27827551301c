//! mapshard CLI
//!
//! Point lookups and inspection for a shard directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mapshard::{Config, Schema, ShardSet, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// mapshard CLI
#[derive(Parser, Debug)]
#[command(name = "mapshard-cli")]
#[command(about = "Look up keys in a partitioned shard directory")]
#[command(version)]
struct Args {
    /// Skip block checksum verification
    #[arg(long)]
    no_verify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get the value stored under a key
    Get {
        /// Shard directory
        dir: PathBuf,

        /// The key, parsed according to the directory's key schema
        key: String,
    },

    /// Show per-shard metadata
    Info {
        /// Shard directory
        dir: PathBuf,
    },

    /// Print every record in shard order
    Dump {
        /// Shard directory
        dir: PathBuf,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::builder()
        .verify_checksums(!args.no_verify)
        .build();

    match run(args.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Get { dir, key } => {
            let shards = ShardSet::open(&dir, config)?;
            let Some(schema) = shards.key_schema() else {
                println!("(absent)");
                return Ok(());
            };
            let key = parse_key(&key, schema)?;
            match shards.get(&key)? {
                Some(value) => println!("{}", value),
                None => println!("(absent)"),
            }
        }
        Commands::Info { dir } => {
            let shards = ShardSet::open(&dir, config)?;
            println!("{}: {} shards, {} records", dir.display(), shards.len(), shards.record_count());
            for (ordinal, reader) in shards.readers().iter().enumerate() {
                println!(
                    "  [{}] {} records={} blocks={} compression={:?} key={} value={}",
                    ordinal,
                    reader.path().display(),
                    reader.record_count(),
                    reader.block_count(),
                    reader.compression(),
                    reader.key_schema(),
                    reader.value_schema()
                );
            }
        }
        Commands::Dump { dir, limit } => {
            let shards = ShardSet::open(&dir, config)?;
            let mut printed = 0;
            for reader in shards.readers() {
                for record in reader.iter() {
                    if limit.is_some_and(|max| printed >= max) {
                        return Ok(());
                    }
                    let (key, value) = record?;
                    println!("{}\t{}", key, value);
                    printed += 1;
                }
            }
        }
    }
    Ok(())
}

/// Parse command-line key text for primitive key schemas
fn parse_key(text: &str, schema: &Schema) -> Result<Value, String> {
    let invalid = |e: &dyn std::fmt::Display| format!("key {:?} is not a valid {}: {}", text, schema, e);
    match schema {
        Schema::String => Ok(Value::from(text)),
        Schema::Int => text.parse().map(Value::Int).map_err(|e| invalid(&e)),
        Schema::Long => text.parse().map(Value::Long).map_err(|e| invalid(&e)),
        Schema::Float => text.parse().map(Value::Float).map_err(|e| invalid(&e)),
        Schema::Double => text.parse().map(Value::Double).map_err(|e| invalid(&e)),
        Schema::Boolean => text.parse().map(Value::Boolean).map_err(|e| invalid(&e)),
        Schema::Bytes => Ok(Value::Bytes(text.as_bytes().to_vec())),
        Schema::Optional(_) if text == "null" => Ok(Value::Null),
        Schema::Optional(inner) => parse_key(text, inner),
        other => Err(format!("keys of schema {} cannot be given on the command line", other)),
    }
}
