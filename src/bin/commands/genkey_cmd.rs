use anyhow::{Context, Result};
use locdb::signature;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// Create the private key file readable by its owner only (0600 on Unix)
fn create_private(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let file = options
        .open(path)
        .with_context(|| format!("Failed to create private key: {}", path.display()))?;

    // mode() only applies to new files
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions: {}", path.display()))?;

    Ok(file)
}

pub fn cmd_genkey(private: PathBuf, public: PathBuf) -> Result<()> {
    let key = signature::generate_signing_key();

    let private_pem = signature::signing_key_to_pem(&key)?;
    let public_pem = signature::verifying_key_to_pem(&key.verifying_key())?;

    create_private(&private)?
        .write_all(private_pem.as_bytes())
        .with_context(|| format!("Failed to write private key: {}", private.display()))?;
    fs::write(&public, public_pem)
        .with_context(|| format!("Failed to write public key: {}", public.display()))?;

    println!("Private key: {}", private.display());
    println!("Public key:  {}", public.display());
    Ok(())
}
