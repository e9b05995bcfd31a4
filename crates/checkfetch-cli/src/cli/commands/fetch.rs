//! `checkfetch fetch <url>`: load through the engine and write or summarize.

use anyhow::{Context, Result};
use checkfetch_core::cache::{DiskCache, LazyDiskCache};
use checkfetch_core::checksum::{self, Algorithm};
use checkfetch_core::config::CheckfetchConfig;
use checkfetch_core::engine::{Engine, Loaded, Origin};
use checkfetch_core::fetch::{CurlTransport, Verification};
use checkfetch_core::loader::IntegrityLoader;
use checkfetch_core::locator::{self, Headers, LocatorCache, ResourceModel};
use checkfetch_core::strategy::DiskCacheStrategy;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub param: Option<String>,
    pub headers: Vec<(String, String)>,
    pub strategy: Option<DiskCacheStrategy>,
    pub output: Option<PathBuf>,
    pub no_cache: bool,
}

fn describe(loaded: &Loaded) -> String {
    let origin = match loaded.origin() {
        Origin::DiskCache(_) => "disk cache".to_string(),
        Origin::Network(url) => url.to_string(),
    };
    let check = match loaded.verification() {
        Verification::Verified(d) => format!("verified {} {}", d.algorithm().as_str(), d),
        Verification::Deferred => "unverified (deferred)".to_string(),
        Verification::Unverifiable => "unverified (no checksum)".to_string(),
    };
    format!("{check}, from {origin}")
}

fn write_output(mut loaded: Loaded, path: &Path) -> Result<u64> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let n = io::copy(&mut loaded, &mut out).with_context(|| format!("write {}", path.display()))?;
    out.flush()?;
    Ok(n)
}

pub async fn run_fetch(cfg: &CheckfetchConfig, request: FetchRequest) -> Result<()> {
    let param = request
        .param
        .clone()
        .unwrap_or_else(|| cfg.checksum_param.clone());
    let headers: Headers = request.headers.iter().cloned().collect();
    let model = locator::parse_with_headers(&request.url, &param, headers);
    if let ResourceModel::Plain(_) = model {
        eprintln!("warning: no usable '{param}' checksum in url; loading unverified");
    }

    let mut opts = cfg.request_options();
    if let Some(strategy) = request.strategy {
        opts = opts.disk_cache_strategy(strategy);
    }

    let cache: Option<Arc<dyn DiskCache>> = if request.no_cache {
        None
    } else {
        Some(Arc::new(LazyDiskCache::new(cfg.cache_factory()?)))
    };
    let loader = IntegrityLoader::new(
        Arc::new(CurlTransport),
        Some(Arc::new(LocatorCache::new(cfg.locator_cache_capacity))),
    );
    let engine = Engine::new(loader, cache);

    let output = request.output.clone();
    let algorithm = model
        .locator()
        .map(|l| l.expected_checksum().algorithm())
        .unwrap_or(Algorithm::Md5);
    let summary = tokio::task::spawn_blocking(move || -> Result<String> {
        let loaded = engine.load(&model, &opts)?;
        let description = describe(&loaded);
        match output {
            Some(path) => {
                let n = write_output(loaded, &path)?;
                Ok(format!("wrote {} bytes to {} ({})", n, path.display(), description))
            }
            None => {
                let bytes = loaded.into_bytes().context("read fetched bytes")?;
                let digest = checksum::digest_bytes(&bytes, algorithm);
                Ok(format!("{} bytes  {}  ({})", bytes.len(), digest, description))
            }
        }
    })
    .await
    .context("fetch task join")??;

    println!("{summary}");
    Ok(())
}
