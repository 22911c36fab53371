//! Renderer boundary.
//!
//! The coordinator hands composites to a dedicated render thread through a
//! capacity-1 channel. A renderer that cannot keep up loses frames; it never
//! stalls the coordinator.

use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::pipeline::ShutdownSignal;

const RECV_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer is gone")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Backend(String),
}

/// One composed view plus the per-tile overlay text, in feed order.
#[derive(Debug, Clone)]
pub struct Composite {
    pub image: RgbImage,
    pub captions: Vec<String>,
}

pub trait Renderer {
    fn present(&mut self, composite: &Composite) -> Result<(), RenderError>;

    /// Polled after every present or idle wait.
    fn exit_requested(&mut self) -> bool {
        false
    }
}

/// Discards composites.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn present(&mut self, _composite: &Composite) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Keeps the latest composite on disk as `composite.png`.
pub struct PngSink {
    dir: PathBuf,
}

impl PngSink {
    pub fn new(dir: PathBuf) -> Result<Self, RenderError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("composite.png")
    }
}

impl Renderer for PngSink {
    fn present(&mut self, composite: &Composite) -> Result<(), RenderError> {
        // Write then rename so readers never see a partial file
        let tmp = self.dir.join("composite.tmp.png");
        composite.image.save(&tmp)?;
        fs::rename(&tmp, self.path())?;
        Ok(())
    }
}

/// Coordinator side of the render hand-off
#[derive(Clone)]
pub struct RenderSink {
    tx: Sender<Composite>,
}

impl RenderSink {
    /// Hand over a composite without waiting. Dropped if the renderer is busy.
    pub fn offer(&self, composite: Composite) -> Result<(), RenderError> {
        match self.tx.try_send(composite) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                metrics::counter!("argus_composites_dropped").increment(1);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(RenderError::Closed),
        }
    }
}

/// Start the render thread.
///
/// `make` runs on the render thread, so window-system handles never leave it.
/// When the renderer asks to exit, `shutdown` is triggered.
pub fn spawn_renderer<F>(
    make: F,
    shutdown: ShutdownSignal,
) -> std::io::Result<(RenderSink, JoinHandle<()>)>
where
    F: FnOnce() -> Result<Box<dyn Renderer>, RenderError> + Send + 'static,
{
    let (tx, rx) = flume::bounded(1);
    let handle = thread::Builder::new()
        .name("renderer".into())
        .spawn(move || match make() {
            Ok(renderer) => render_loop(renderer, rx, shutdown),
            Err(e) => error!("Failed to start renderer: {}", e),
        })?;
    Ok((RenderSink { tx }, handle))
}

fn render_loop(
    mut renderer: Box<dyn Renderer>,
    rx: Receiver<Composite>,
    shutdown: ShutdownSignal,
) {
    while !shutdown.is_triggered() {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(composite) => {
                if let Err(e) = renderer.present(&composite) {
                    warn!("Render error: {}", e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if renderer.exit_requested() {
            info!("Exit requested by renderer");
            shutdown.trigger();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite(w: u32, h: u32) -> Composite {
        Composite {
            image: RgbImage::new(w, h),
            captions: vec![],
        }
    }

    #[test]
    fn png_sink_overwrites_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSink::new(dir.path().join("out")).unwrap();
        sink.present(&composite(4, 2)).unwrap();
        sink.present(&composite(6, 3)).unwrap();

        let written = image::open(sink.path()).unwrap();
        assert_eq!((written.width(), written.height()), (6, 3));
    }

    struct QuitAfter(u32);

    impl Renderer for QuitAfter {
        fn present(&mut self, _composite: &Composite) -> Result<(), RenderError> {
            self.0 = self.0.saturating_sub(1);
            Ok(())
        }

        fn exit_requested(&mut self) -> bool {
            self.0 == 0
        }
    }

    #[test]
    fn renderer_exit_triggers_shutdown() {
        let shutdown = ShutdownSignal::new();
        let (sink, handle) =
            spawn_renderer(|| Ok(Box::new(QuitAfter(1)) as Box<dyn Renderer>), shutdown.clone())
                .unwrap();

        sink.offer(composite(2, 2)).unwrap();
        handle.join().unwrap();
        assert!(shutdown.is_triggered());
        assert!(matches!(sink.offer(composite(2, 2)), Err(RenderError::Closed)));
    }
}
