use reqwest::{header, Client};
use tracing::debug;
use url::Url;

use crate::error::DownloadError;

/// Reads the resource length from a HEAD response.
///
/// The `Content-Length` header is parsed directly: reqwest reports the
/// (empty) body length for HEAD, not the advertised one.
pub async fn probe_size(client: &Client, url: &Url) -> Result<u64, DownloadError> {
    let response = client
        .head(url.clone())
        .send()
        .await
        .map_err(|e| DownloadError::SizeUnavailable(format!("HEAD request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::SizeUnavailable(format!("server returned {status}")));
    }

    let size = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .ok_or_else(|| DownloadError::SizeUnavailable("no Content-Length header".into()))?
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| DownloadError::SizeUnavailable("malformed Content-Length header".into()))?;

    debug!(%url, size, "probed resource size");
    Ok(size)
}
