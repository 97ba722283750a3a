mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    cmd_build, cmd_genkey, cmd_inspect, cmd_list, cmd_query, cmd_search_as, cmd_validate,
    cmd_verify, BuildArgs, ListArgs,
};

#[derive(Parser)]
#[command(name = "locdb")]
#[command(about = "Build, query and verify signed IP location databases")]
#[command(
    long_about = "locdb maps IP networks to country, autonomous system and flags.\n\n\
    Examples:\n  \
    locdb build --networks networks.csv.gz --ases ases.csv --countries countries.csv -o location.db\n  \
    locdb query location.db 2a07:1c44:5800::1 81.3.27.38\n  \
    locdb list location.db --country DE --family ipv4\n  \
    locdb genkey --private signing.pem --public signing.pub.pem\n  \
    locdb verify location.db --public-key signing.pub.pem"
)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a database from CSV feeds (optionally gzip compressed)
    Build(BuildArgs),

    /// Look up one or more addresses
    Query {
        /// Path to the location database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Addresses to look up
        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<String>,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List networks, optionally filtered
    List(ListArgs),

    /// Search autonomous systems by name (case-insensitive)
    SearchAs {
        /// Path to the location database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Text to search for
        #[arg(value_name = "NAME")]
        name: String,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show database metadata and statistics
    Inspect {
        /// Path to the location database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Validate a database file for safety and correctness
    Validate {
        /// Path to the location database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Validation level: standard or strict
        #[arg(short, long, default_value = "strict")]
        level: String,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Verify the database signature against a public key
    Verify {
        /// Path to the location database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// PEM encoded Ed25519 public key
        #[arg(short = 'k', long, value_name = "PEM")]
        public_key: PathBuf,
    },

    /// Generate an Ed25519 key pair
    Genkey {
        /// Output path for the private key
        #[arg(long, value_name = "PEM")]
        private: PathBuf,

        /// Output path for the public key
        #[arg(long, value_name = "PEM")]
        public: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(verbose >= 2)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build(args) => cmd_build(args),
        Commands::Query {
            database,
            addresses,
            json,
        } => cmd_query(database, addresses, json),
        Commands::List(args) => cmd_list(args),
        Commands::SearchAs {
            database,
            name,
            json,
        } => cmd_search_as(database, name, json),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
        Commands::Validate {
            database,
            level,
            json,
        } => cmd_validate(database, level, json),
        Commands::Verify {
            database,
            public_key,
        } => cmd_verify(database, public_key),
        Commands::Genkey { private, public } => cmd_genkey(private, public),
    }
}
