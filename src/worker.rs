use std::io::ErrorKind;
use std::num::NonZeroU32;
use std::sync::Arc;

use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{DownloadError, SegmentFailure};
use crate::progress::Progress;
use crate::state::Segment;

pub type ArcRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn rate_limiter(bytes_per_sec: u32) -> Option<ArcRateLimiter> {
    NonZeroU32::new(bytes_per_sec).map(|limit| Arc::new(RateLimiter::direct(Quota::per_second(limit))))
}

/// Everything a segment worker shares with its siblings.
#[derive(Clone)]
pub struct FetchContext {
    pub client: Client,
    pub url: Url,
    pub total_size: u64,
    pub resume: bool,
    pub progress: Arc<Progress>,
    pub rate_limiter: Option<ArcRateLimiter>,
    pub cancel: CancellationToken,
}

/// Downloads one segment into its part file.
///
/// With resume enabled, the size of an existing part file is taken as the
/// number of bytes already fetched and only the rest of the range is
/// requested. Returns the number of bytes received by this call.
pub async fn fetch_segment(ctx: &FetchContext, segment: &Segment) -> Result<u64, DownloadError> {
    let index = segment.index;
    let segment_len = segment.byte_len();

    let mut already = 0;
    if ctx.resume {
        match fs::metadata(&segment.part_path).await {
            Ok(metadata) => already = metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(DownloadError::fs(&segment.part_path, e)),
        }
        if already > segment_len {
            warn!(index, already, segment_len, "part file is larger than its segment, restarting it");
            already = 0;
        }
    }

    ctx.progress.seed(index, already);
    if already == segment_len {
        debug!(index, "segment already complete");
        return Ok(0);
    }

    let append = already > 0;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&segment.part_path)
        .await
        .map_err(|e| DownloadError::fs(&segment.part_path, e))?;

    let start = segment.start + already;
    let range_header = format!("bytes={}-{}", start, segment.end);
    debug!(index, range = %range_header, resumed_from = already, "requesting segment");

    let response = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),
        sent = ctx.client.get(ctx.url.clone()).header(RANGE, range_header).send() => {
            sent.map_err(|e| DownloadError::segment(index, e.into()))?
        }
    };

    let status = response.status();
    let whole_resource = start == 0 && segment.end + 1 == ctx.total_size;
    if status != StatusCode::PARTIAL_CONTENT && !(status == StatusCode::OK && whole_resource) {
        return Err(DownloadError::segment(index, SegmentFailure::Status(status)));
    }

    let expected = segment.end - start + 1;
    let mut writer = BufWriter::new(file);
    let outcome = stream_into(ctx, index, response, &mut writer, expected).await;
    // Keep every counted byte on disk so a later resume starts from the right offset.
    let flushed = writer.flush().await;

    let received = outcome?;
    flushed.map_err(|e| DownloadError::segment(index, e.into()))?;

    if received < expected {
        return Err(DownloadError::segment(index, SegmentFailure::Truncated { expected, received }));
    }

    debug!(index, received, on_disk = ctx.progress.slot(index), "segment finished");
    Ok(received)
}

async fn stream_into(
    ctx: &FetchContext,
    index: usize,
    response: Response,
    writer: &mut BufWriter<File>,
    expected: u64,
) -> Result<u64, DownloadError> {
    let mut stream = response.bytes_stream();
    let mut received = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = stream.next() => next,
        };
        let Some(item) = next else { break };

        let chunk = item.map_err(|e| DownloadError::segment(index, e.into()))?;
        if chunk.is_empty() {
            continue;
        }

        let len = chunk.len() as u64;
        if received + len > expected {
            return Err(DownloadError::segment(index, SegmentFailure::Overflow { expected }));
        }

        if let Some(limiter) = &ctx.rate_limiter {
            throttle(limiter, chunk.len()).await;
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::segment(index, e.into()))?;
        received += len;
        ctx.progress.add(index, len);
    }

    Ok(received)
}

/// Waits for `len` tokens, splitting the wait when `len` exceeds the burst size.
async fn throttle(limiter: &ArcRateLimiter, len: usize) {
    let mut remaining = u32::try_from(len).unwrap_or(u32::MAX);
    while let Some(n) = NonZeroU32::new(remaining) {
        match limiter.until_n_ready(n).await {
            Ok(()) => break,
            Err(capacity) => match NonZeroU32::new(capacity.0) {
                Some(burst) => {
                    let _ = limiter.until_n_ready(burst).await;
                    remaining -= burst.get();
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(server: &MockServer, total_size: u64, resume: bool, workers: usize) -> FetchContext {
        FetchContext {
            client: Client::new(),
            url: Url::parse(&server.uri()).unwrap(),
            total_size,
            resume,
            progress: Arc::new(Progress::new(workers, total_size)),
            rate_limiter: None,
            cancel: CancellationToken::new(),
        }
    }

    fn segment(dir: &Path, index: usize, start: u64, end: u64) -> Segment {
        Segment {
            index,
            start,
            end,
            part_path: dir.join(format!("file.part{index}")),
        }
    }

    #[tokio::test]
    async fn writes_range_to_part_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=5-9"))
            .respond_with(ResponseTemplate::new(206).set_body_string("World"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(&server, 10, false, 2);
        let seg = segment(dir.path(), 1, 5, 9);

        let received = fetch_segment(&ctx, &seg).await.unwrap();
        assert_eq!(received, 5);
        assert_eq!(tokio::fs::read_to_string(&seg.part_path).await.unwrap(), "World");
        assert_eq!(ctx.progress.slot(1), 5);
        assert_eq!(ctx.progress.downloaded(), 5);
    }

    #[tokio::test]
    async fn without_resume_existing_part_is_overwritten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=0-4"))
            .respond_with(ResponseTemplate::new(206).set_body_string("Hello"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let seg = segment(dir.path(), 0, 0, 4);
        tokio::fs::write(&seg.part_path, "junkjunk").await.unwrap();

        fetch_segment(&context(&server, 10, false, 2), &seg).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&seg.part_path).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn resume_requests_only_missing_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=3-4"))
            .respond_with(ResponseTemplate::new(206).set_body_string("lo"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let seg = segment(dir.path(), 0, 0, 4);
        tokio::fs::write(&seg.part_path, "Hel").await.unwrap();

        let ctx = context(&server, 10, true, 2);
        let received = fetch_segment(&ctx, &seg).await.unwrap();

        assert_eq!(received, 2);
        assert_eq!(tokio::fs::read_to_string(&seg.part_path).await.unwrap(), "Hello");
        assert_eq!(ctx.progress.slot(0), seg.byte_len());
    }

    #[tokio::test]
    async fn complete_part_file_is_not_fetched_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let seg = segment(dir.path(), 1, 5, 9);
        tokio::fs::write(&seg.part_path, "World").await.unwrap();

        let ctx = context(&server, 10, true, 2);
        assert_eq!(fetch_segment(&ctx, &seg).await.unwrap(), 0);
        assert_eq!(ctx.progress.slot(1), 5);
    }

    #[tokio::test]
    async fn short_body_is_truncation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_string("Hel"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let seg = segment(dir.path(), 0, 0, 4);
        let err = fetch_segment(&context(&server, 10, false, 2), &seg).await.unwrap_err();

        assert!(matches!(
            err,
            DownloadError::SegmentFetch {
                index: 0,
                source: SegmentFailure::Truncated { expected: 5, received: 3 }
            }
        ));
        assert_eq!(tokio::fs::read_to_string(&seg.part_path).await.unwrap(), "Hel");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_string("HelloWorld"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let seg = segment(dir.path(), 0, 0, 4);
        let err = fetch_segment(&context(&server, 10, false, 2), &seg).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::SegmentFetch { source: SegmentFailure::Overflow { expected: 5 }, .. }
        ));
    }

    #[tokio::test]
    async fn full_body_for_partial_range_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("HelloWorld"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let seg = segment(dir.path(), 1, 5, 9);
        let err = fetch_segment(&context(&server, 10, false, 2), &seg).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::SegmentFetch { index: 1, source: SegmentFailure::Status(StatusCode::OK) }
        ));
    }

    #[tokio::test]
    async fn ok_status_is_accepted_for_whole_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=0-9"))
            .respond_with(ResponseTemplate::new(200).set_body_string("HelloWorld"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let seg = segment(dir.path(), 0, 0, 9);
        assert_eq!(fetch_segment(&context(&server, 10, false, 1), &seg).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn cancelled_worker_does_not_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_string("Hello"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let ctx = context(&server, 10, false, 2);
        ctx.cancel.cancel();

        let err = fetch_segment(&ctx, &segment(dir.path(), 0, 0, 4)).await.unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
    }

    #[tokio::test]
    async fn throttled_fetch_still_completes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_string("Hello"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let mut ctx = context(&server, 10, false, 2);
        // burst smaller than the body forces a split wait
        ctx.rate_limiter = rate_limiter(4);

        let seg = segment(dir.path(), 0, 0, 4);
        assert_eq!(fetch_segment(&ctx, &seg).await.unwrap(), 5);
        assert_eq!(tokio::fs::read_to_string(&seg.part_path).await.unwrap(), "Hello");
    }

    #[test]
    fn zero_rate_limit_means_unlimited() {
        assert!(rate_limiter(0).is_none());
        assert!(rate_limiter(1024).is_some());
    }
}
