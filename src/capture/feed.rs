//! Per-camera capture thread publishing into a latest-frame slot.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::frame::{FeedId, FrameSample};
use super::source::{CaptureError, CaptureHandle, CaptureSource};
use crate::pipeline::LatestFrameSlot;

/// Lifecycle of a feed, observable from other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FeedState {
    Stopped = 0,
    Running = 1,
    Failed = 2,
}

impl FeedState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => FeedState::Running,
            2 => FeedState::Failed,
            _ => FeedState::Stopped,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{feed}: open failed: {source}")]
    Open { feed: FeedId, source: CaptureError },

    #[error("{feed}: read failed: {source}")]
    Read { feed: FeedId, source: CaptureError },

    #[error("{feed}: failed to spawn capture thread: {source}")]
    Spawn {
        feed: FeedId,
        source: std::io::Error,
    },

    #[error("{feed}: capture thread did not stop within {timeout:?}")]
    StopTimeout { feed: FeedId, timeout: Duration },
}

impl FeedError {
    pub fn feed(&self) -> FeedId {
        match self {
            FeedError::Open { feed, .. }
            | FeedError::Read { feed, .. }
            | FeedError::Spawn { feed, .. }
            | FeedError::StopTimeout { feed, .. } => *feed,
        }
    }
}

/// Timing knobs for a feed thread
#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    /// How long `start` waits for the source to open
    pub open_timeout: Duration,
    /// Consecutive non-terminal read errors tolerated before failing
    pub max_read_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(5),
            max_read_retries: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

/// State shared between the feed thread and its owner
struct Shared {
    state: AtomicU8,
    stop: AtomicBool,
    slot: LatestFrameSlot,
}

/// One camera source and its dedicated capture thread.
pub struct CaptureFeed {
    id: FeedId,
    description: String,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl CaptureFeed {
    /// Spawn the capture thread and wait for the source to open.
    ///
    /// The source is opened on the capture thread itself, so handles never
    /// cross threads. Fails with [`FeedError::Open`] if the source cannot be
    /// opened within `options.open_timeout`.
    #[instrument(skip_all, fields(feed = %id))]
    pub fn start(
        id: FeedId,
        mut source: Box<dyn CaptureSource>,
        options: FeedOptions,
    ) -> Result<Self, FeedError> {
        let description = source.describe();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(FeedState::Stopped as u8),
            stop: AtomicBool::new(false),
            slot: LatestFrameSlot::new(),
        });

        let (open_tx, open_rx) = flume::bounded::<Result<(), CaptureError>>(1);
        let thread_shared = Arc::clone(&shared);

        let thread = thread::Builder::new()
            .name(format!("feed-{}", id.0))
            .spawn(move || {
                let mut handle = match source.open() {
                    Ok(handle) => handle,
                    Err(e) => {
                        thread_shared
                            .state
                            .store(FeedState::Failed as u8, Ordering::Release);
                        let _ = open_tx.send(Err(e));
                        return Ok(());
                    }
                };

                thread_shared
                    .state
                    .store(FeedState::Running as u8, Ordering::Release);
                if open_tx.send(Ok(())).is_err() {
                    // Owner gave up waiting
                    handle.close();
                    thread_shared
                        .state
                        .store(FeedState::Stopped as u8, Ordering::Release);
                    return Ok(());
                }

                let result = capture_loop(id, handle.as_mut(), &thread_shared, &options);
                handle.close();

                let end_state = if result.is_ok() {
                    FeedState::Stopped
                } else {
                    FeedState::Failed
                };
                thread_shared
                    .state
                    .store(end_state as u8, Ordering::Release);
                result
            })
            .map_err(|source| FeedError::Spawn { feed: id, source })?;

        let open_result = open_rx.recv_timeout(options.open_timeout);
        shared.stop.store(open_result.is_err(), Ordering::Release);

        let open_error = match open_result {
            Ok(Ok(())) => {
                info!("{} running ({})", id, description);
                return Ok(Self {
                    id,
                    description,
                    shared,
                    thread: Some(thread),
                });
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                e
            }
            Err(flume::RecvTimeoutError::Timeout) => CaptureError::OpenFailed(format!(
                "{description}: timed out after {:?}",
                options.open_timeout
            )),
            Err(flume::RecvTimeoutError::Disconnected) => {
                CaptureError::OpenFailed(format!("{description}: capture thread exited"))
            }
        };

        Err(FeedError::Open {
            feed: id,
            source: open_error,
        })
    }

    pub fn id(&self) -> FeedId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> FeedState {
        FeedState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn slot(&self) -> &LatestFrameSlot {
        &self.shared.slot
    }

    /// Ask the capture loop to exit after its current read.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Stop the capture thread and wait up to `timeout` for it to exit.
    ///
    /// The capture handle is closed by the thread itself on exit, so it is
    /// released exactly once. Returns the read error that ended the feed, if
    /// any. Calling `stop` again is a no-op.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), FeedError> {
        self.request_stop();
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!("{} did not stop within {:?}, detaching", self.id, timeout);
                return Err(FeedError::StopTimeout {
                    feed: self.id,
                    timeout,
                });
            }
            thread::sleep(Duration::from_millis(2));
        }

        match thread.join() {
            Ok(Ok(())) => {
                debug!("{} stopped", self.id);
                Ok(())
            }
            Ok(Err(source)) => Err(FeedError::Read {
                feed: self.id,
                source,
            }),
            Err(_) => Err(FeedError::Read {
                feed: self.id,
                source: CaptureError::ReadFailed("capture thread panicked".into()),
            }),
        }
    }
}

impl Drop for CaptureFeed {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn capture_loop(
    id: FeedId,
    handle: &mut dyn CaptureHandle,
    shared: &Shared,
    options: &FeedOptions,
) -> Result<(), CaptureError> {
    let mut sequence = 0u64;
    let mut consecutive_errors = 0u32;

    while !shared.stop.load(Ordering::Acquire) {
        match handle.read() {
            Ok(Some(image)) => {
                consecutive_errors = 0;
                sequence += 1;
                shared.slot.publish(FrameSample::new(id, image, sequence));
            }
            Ok(None) => {}
            Err(e) if e.is_terminal() => {
                info!("{} ended: {}", id, e);
                return Err(e);
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors > options.max_read_retries {
                    warn!("{} giving up after {} read errors: {}", id, consecutive_errors, e);
                    return Err(e);
                }
                debug!("{} read error ({}): {}", id, consecutive_errors, e);
                thread::sleep(options.retry_backoff);
            }
        }
    }

    Ok(())
}
