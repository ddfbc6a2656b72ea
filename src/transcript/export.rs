use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

/// Write the finalized transcript text to `<dir>/transcript-YYYY-MM-DD.txt`.
///
/// Returns `Ok(None)` without touching the filesystem when the text is empty
/// or whitespace-only. Interim text must never be passed here; the caller
/// exports finalized text only.
pub fn export_transcript(final_text: &str, dir: &Path) -> Result<Option<PathBuf>> {
    if final_text.trim().is_empty() {
        info!("No finalized transcript to export");
        return Ok(None);
    }

    let filename = format!("transcript-{}.txt", Utc::now().format("%Y-%m-%d"));
    let path = dir.join(filename);

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
    std::fs::write(&path, final_text)
        .with_context(|| format!("Failed to write transcript to {}", path.display()))?;

    info!("Exported transcript to {}", path.display());

    Ok(Some(path))
}
