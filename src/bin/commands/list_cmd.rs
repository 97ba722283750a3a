use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use locdb::{AddressFamily, Database, NetworkFilter, NetworkFlags};
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::network_to_json;

#[derive(Clone, Copy, ValueEnum)]
pub enum Family {
    Ipv4,
    Ipv6,
}

#[derive(Args)]
pub struct ListArgs {
    /// Path to the location database
    #[arg(value_name = "DATABASE")]
    database: PathBuf,

    /// Only networks in this country (A1, A2, A3 and XD select flags)
    #[arg(short, long, value_name = "CC")]
    country: Vec<String>,

    /// Only networks announced by this AS
    #[arg(short, long, value_name = "ASN")]
    asn: Vec<u32>,

    /// Only networks carrying this flag (A1, A2, A3, XD)
    #[arg(short, long, value_name = "FLAG")]
    flag: Vec<String>,

    /// Only one address family
    #[arg(long, value_enum)]
    family: Option<Family>,

    /// Output results as JSON
    #[arg(short, long)]
    json: bool,
}

pub fn cmd_list(args: ListArgs) -> Result<()> {
    let db = Database::open(&args.database)
        .with_context(|| format!("Failed to load database: {}", args.database.display()))?;

    let mut filter = NetworkFilter::new();
    for code in &args.country {
        filter = filter.country(code)?;
    }
    for asn in &args.asn {
        filter = filter.asn(*asn);
    }
    for code in &args.flag {
        let flag = NetworkFlags::from_code(code)
            .with_context(|| format!("Unknown flag: '{}'", code))?;
        filter = filter.flags(flag);
    }
    filter = match args.family {
        Some(Family::Ipv4) => filter.family(AddressFamily::V4),
        Some(Family::Ipv6) => filter.family(AddressFamily::V6),
        None => filter,
    };

    let mut results = Vec::new();
    for network in db.networks_filtered(filter) {
        let network = network.context("Database is corrupt")?;
        if args.json {
            results.push(network_to_json(&db, &network)?);
        } else {
            println!("{}", network);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

pub fn cmd_search_as(database: PathBuf, name: String, json_output: bool) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let matches = db.search_as(&name)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!(matches))?);
    } else {
        for system in &matches {
            println!("{}", system);
        }
    }

    if matches.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
