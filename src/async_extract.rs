#![cfg(feature = "async")]

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::detector::{DetectionResult, VendorDetector};
use crate::model::{AccelerationSample, GpsFix};
use crate::parser::VendorParser;

/// Run directory detection on a blocking thread.
///
/// Detection walks the filesystem and takes the cache lock, so it should not run on an async
/// worker. A panicked or cancelled blocking task reads as "no vendor".
pub async fn detect_directory_async(
    detector: Arc<VendorDetector>,
    dir: impl Into<PathBuf>,
) -> Option<DetectionResult> {
    let dir = dir.into();
    tokio::task::spawn_blocking(move || detector.detect_directory(dir))
        .await
        .ok()
        .flatten()
}

/// Create a Tokio `Stream` of GPS fixes decoded from a recording.
///
/// Implementation detail: extraction spawns the demuxer and blocks until it exits, so it runs on
/// `tokio::task::spawn_blocking` and fixes are forwarded over a bounded channel.
///
/// `buffer` controls the channel capacity.
pub fn gps_stream_from_path(
    parser: Arc<dyn VendorParser>,
    path: impl Into<PathBuf>,
    buffer: usize,
) -> ReceiverStream<GpsFix> {
    let path = path.into();
    forward_blocking(buffer, move || parser.extract_gps(&path))
}

/// Like [`gps_stream_from_path`], for accelerometer samples.
pub fn acceleration_stream_from_path(
    parser: Arc<dyn VendorParser>,
    path: impl Into<PathBuf>,
    buffer: usize,
) -> ReceiverStream<AccelerationSample> {
    let path = path.into();
    forward_blocking(buffer, move || parser.extract_acceleration(&path))
}

fn forward_blocking<T, F>(buffer: usize, produce: F) -> ReceiverStream<T>
where
    T: Send + 'static,
    F: FnOnce() -> Vec<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::task::spawn_blocking(move || {
        for item in produce() {
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });

    ReceiverStream::new(rx)
}
