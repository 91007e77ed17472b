//! Media directory setup.
//!
//! The daemon itself only fills the originals store; the thumbnails store is
//! created here so downstream processors always find it in place.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::config::IntakeConfig;

/// Ensure both document stores exist under the media root.
///
/// Idempotent: directories that already exist are left alone. Any other
/// creation failure propagates and is fatal at startup.
pub async fn ensure_media_dirs(config: &IntakeConfig) -> io::Result<()> {
    for path in [config.originals_dir(), config.thumbnails_dir()] {
        ensure_dir(&path).await?;
    }
    Ok(())
}

async fn ensure_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await?;
    debug!(path = %path.display(), "Storage directory ready");
    Ok(())
}

/// Pick a free path under `dir` for `name`, suffixing the stem when a file
/// of that name is already present.
pub fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let ext = Path::new(name).extension().and_then(|e| e.to_str());
    for n in 1u32.. {
        let next = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        let candidate = dir.join(next);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("suffix search is unbounded");
}
