//! `checkfetch cache-info`.

use anyhow::Result;
use checkfetch_core::config::CheckfetchConfig;

pub async fn run_cache_info(cfg: &CheckfetchConfig) -> Result<()> {
    let cache = cfg.cache_factory()?.try_build()?;
    let lru = cache.inner();
    println!("Directory: {}", lru.directory().display());
    println!("Entries:   {}", lru.len());
    println!(
        "Size:      {} / {} bytes ({:.1} MiB max)",
        lru.size(),
        lru.max_size(),
        lru.max_size() as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}
