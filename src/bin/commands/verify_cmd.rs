use anyhow::{Context, Result};
use locdb::{signature, Database};
use std::path::PathBuf;

pub fn cmd_verify(database: PathBuf, public_key: PathBuf) -> Result<()> {
    let key = signature::load_verifying_key(&public_key)
        .with_context(|| format!("Failed to load public key: {}", public_key.display()))?;
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    db.verify(&key)
        .with_context(|| format!("Signature check failed: {}", database.display()))?;

    println!("{}: signature OK", database.display());
    Ok(())
}
