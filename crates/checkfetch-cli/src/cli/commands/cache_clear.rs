//! `checkfetch cache-clear`.

use anyhow::Result;
use checkfetch_core::cache::DiskCache;
use checkfetch_core::config::CheckfetchConfig;

pub async fn run_cache_clear(cfg: &CheckfetchConfig) -> Result<()> {
    let cache = cfg.cache_factory()?.try_build()?;
    let (entries, bytes) = (cache.inner().len(), cache.inner().size());
    cache.clear();
    tracing::info!(entries, bytes, "cleared disk cache");
    println!(
        "Removed {} entries ({} bytes) from {}",
        entries,
        bytes,
        cache.inner().directory().display()
    );
    Ok(())
}
