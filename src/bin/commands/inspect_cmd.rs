use anyhow::{Context, Result};
use locdb::Database;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::format_unix_timestamp;

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let vendor = db.vendor()?;
    let description = db.description()?;
    let license = db.license()?;

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "vendor": vendor,
            "description": description,
            "license": license,
            "created_at": db.created_at(),
            "expires_at": db.expires_at(),
            "expired": db.is_expired(),
            "signed": db.is_signed(),
            "network_count": db.network_count(),
            "node_count": db.node_count(),
            "as_count": db.as_count(),
            "country_count": db.country_count(),
            "size": db.size(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database:    {}", database.display());
    println!("Vendor:      {}", vendor);
    println!("Description: {}", description);
    println!("License:     {}", license);
    println!("Created:     {}", format_unix_timestamp(db.created_at()));
    match db.expires_at() {
        Some(expires) => println!(
            "Expires:     {}{}",
            format_unix_timestamp(expires),
            if db.is_expired() { " (expired)" } else { "" }
        ),
        None => println!("Expires:     never"),
    }
    println!("Signed:      {}", if db.is_signed() { "yes" } else { "no" });
    println!();
    println!("Contents:");
    println!("  Networks:  {}", db.network_count());
    println!("  Nodes:     {}", db.node_count());
    println!("  ASes:      {}", db.as_count());
    println!("  Countries: {}", db.country_count());
    println!("  Size:      {} bytes", db.size());

    Ok(())
}
