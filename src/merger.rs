use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::DownloadError;

/// Concatenates `parts` in order into `output`, deleting each part once it
/// has been appended. Returns the number of bytes written.
pub async fn merge_parts(parts: &[PathBuf], output: &Path) -> Result<u64, DownloadError> {
    let mut out = File::create(output)
        .await
        .map_err(|e| DownloadError::fs(output, e))?;

    let mut written = 0u64;
    for part in parts {
        let mut reader = File::open(part).await.map_err(|e| DownloadError::fs(part, e))?;
        let copied = io::copy(&mut reader, &mut out)
            .await
            .map_err(|e| DownloadError::fs(output, e))?;
        drop(reader);

        fs::remove_file(part).await.map_err(|e| DownloadError::fs(part, e))?;
        debug!(part = %part.display(), copied, "merged part");
        written += copied;
    }

    out.flush().await.map_err(|e| DownloadError::fs(output, e))?;
    out.sync_all().await.map_err(|e| DownloadError::fs(output, e))?;

    info!(output = %output.display(), parts = parts.len(), bytes = written, "merge complete");
    Ok(written)
}
