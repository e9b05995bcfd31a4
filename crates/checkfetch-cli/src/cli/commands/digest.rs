//! `checkfetch digest <path>`: print a file's digest.

use anyhow::{Context, Result};
use checkfetch_core::checksum::{self, Algorithm};
use std::path::Path;

pub async fn run_digest(path: &Path, algorithm: Algorithm) -> Result<()> {
    let digest = checksum::digest_path(path, algorithm)
        .with_context(|| format!("digest {}", path.display()))?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
