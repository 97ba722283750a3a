use anyhow::{Context, Result};
use locdb::Database;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{describe_network, network_to_json};

pub fn cmd_query(database: PathBuf, addresses: Vec<String>, json_output: bool) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let mut results = Vec::with_capacity(addresses.len());
    let mut found = false;

    for address in &addresses {
        let hit = db
            .lookup(address)
            .with_context(|| format!("Query failed for: {}", address))?;
        found |= hit.is_some();

        if json_output {
            let network = match &hit {
                Some(network) => network_to_json(&db, network)?,
                None => serde_json::Value::Null,
            };
            results.push(json!({ "address": address, "match": network }));
        } else {
            match &hit {
                Some(network) => println!("{}: {}", address, describe_network(&db, network)?),
                None => println!("{}: not found", address),
            }
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    // Exit code 1 when nothing matched, like grep
    if found {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
