//! Tick loop turning whatever frames are available into detections, a
//! composite view and per-feed statistics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use super::shutdown::ShutdownSignal;
use super::stats::{FeedCounters, FeedReport, RunReport};
use crate::capture::{
    CaptureError, CaptureFeed, CaptureSource, FeedError, FeedId, FeedOptions, FeedState,
    FrameSample,
};
use crate::display::{annotate, ComposeError, Composer, Composite, Layout, RenderSink};
use crate::inference::{DetectionResult, InferenceBackend, InferenceParams};
use crate::Config;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no feeds configured")]
    NoFeeds,

    #[error("invalid coordinator options: {0}")]
    InvalidOptions(&'static str),

    #[error("feed {0} configured more than once")]
    DuplicateFeed(FeedId),

    #[error("display supports at most 4 feeds, {0} configured")]
    TooManyFeedsForDisplay(usize),

    #[error("all feeds failed. {}", .0.final_status_line())]
    AllFeedsFailed(RunReport),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    pub stats_interval: u64,
    pub idle_backoff: Duration,
    pub stop_timeout: Duration,
    pub feed: FeedOptions,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            stats_interval: 30,
            idle_backoff: Duration::from_millis(1),
            stop_timeout: Duration::from_secs(1),
            feed: FeedOptions::default(),
        }
    }
}

/// What one tick did
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// In ascending feed order
    pub results: Vec<DetectionResult>,
    pub stats_lines: Vec<String>,
    /// Feeds dropped from the active set this tick
    pub retired: Vec<FeedId>,
    pub composite_size: Option<(u32, u32)>,
}

/// Single-threaded driver over N capture feeds.
pub struct Coordinator {
    /// Active feeds, ascending by id
    feeds: Vec<CaptureFeed>,
    counters: BTreeMap<FeedId, FeedCounters>,
    /// Feeds that failed to open or were retired
    finished: BTreeMap<FeedId, FeedReport>,
    backend: Box<dyn InferenceBackend>,
    params: InferenceParams,
    composer: Option<Composer>,
    sink: Option<RenderSink>,
    shutdown: ShutdownSignal,
    options: CoordinatorOptions,
}

impl Coordinator {
    /// Start every feed. Feeds that fail to open are excluded and logged; if
    /// none opens the whole start fails with [`CoordinatorError::AllFeedsFailed`].
    pub fn start(
        sources: Vec<(FeedId, Box<dyn CaptureSource>)>,
        backend: Box<dyn InferenceBackend>,
        params: InferenceParams,
        options: CoordinatorOptions,
        shutdown: ShutdownSignal,
    ) -> Result<Self, CoordinatorError> {
        let sources = sources
            .into_iter()
            .map(|(id, source)| (id, source.describe(), Ok(source)))
            .collect();
        Self::start_all(sources, backend, params, options, shutdown)
    }

    /// Build sources from configuration and start them.
    pub fn from_config(
        config: &Config,
        backend: Box<dyn InferenceBackend>,
        shutdown: ShutdownSignal,
    ) -> Result<Self, CoordinatorError> {
        let sources = config
            .feeds
            .iter()
            .map(|feed| {
                let source = feed.source.build(&config.gstreamer);
                let description = match &source {
                    Ok(source) => source.describe(),
                    Err(_) => format!("{:?}", feed.source),
                };
                (feed.id, description, source)
            })
            .collect();
        Self::start_all(
            sources,
            backend,
            config.inference.params(),
            config.coordinator.options(),
            shutdown,
        )
    }

    fn start_all(
        mut sources: Vec<(FeedId, String, Result<Box<dyn CaptureSource>, CaptureError>)>,
        backend: Box<dyn InferenceBackend>,
        params: InferenceParams,
        options: CoordinatorOptions,
        shutdown: ShutdownSignal,
    ) -> Result<Self, CoordinatorError> {
        if sources.is_empty() {
            return Err(CoordinatorError::NoFeeds);
        }
        if options.stats_interval == 0 {
            return Err(CoordinatorError::InvalidOptions("stats_interval must be positive"));
        }
        sources.sort_by_key(|(id, _, _)| *id);
        if let Some(pair) = sources.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(CoordinatorError::DuplicateFeed(pair[0].0));
        }

        let mut coordinator = Self {
            feeds: Vec::with_capacity(sources.len()),
            counters: BTreeMap::new(),
            finished: BTreeMap::new(),
            backend,
            params,
            composer: None,
            sink: None,
            shutdown,
            options,
        };

        for (id, description, source) in sources {
            coordinator.counters.insert(id, FeedCounters::new(id));
            let started = source
                .map_err(|source| FeedError::Open { feed: id, source })
                .and_then(|source| CaptureFeed::start(id, source, options.feed));
            match started {
                Ok(feed) => coordinator.feeds.push(feed),
                Err(e) => {
                    error!("Excluding feed: {}", e);
                    coordinator.finished.insert(
                        id,
                        FeedReport {
                            feed_id: id,
                            description,
                            frames_processed: 0,
                            frames_captured: 0,
                            frames_dropped: 0,
                            mean_latency: None,
                            state: FeedState::Failed,
                            failure: Some(e.to_string()),
                        },
                    );
                }
            }
        }

        if coordinator.feeds.is_empty() {
            let report = coordinator.finish();
            return Err(CoordinatorError::AllFeedsFailed(report));
        }
        Ok(coordinator)
    }

    /// Compose annotated frames every tick; composites go to `sink` if given.
    pub fn with_display(
        mut self,
        composer: Composer,
        sink: Option<RenderSink>,
    ) -> Result<Self, CoordinatorError> {
        let total = self.counters.len();
        if total > Layout::MAX_IMAGES {
            return Err(CoordinatorError::TooManyFeedsForDisplay(total));
        }
        self.composer = Some(composer);
        self.sink = sink;
        Ok(self)
    }

    pub fn active_feeds(&self) -> Vec<FeedId> {
        self.feeds.iter().map(CaptureFeed::id).collect()
    }

    pub fn frames_processed(&self, feed: FeedId) -> u64 {
        self.counters.get(&feed).map_or(0, FeedCounters::processed)
    }

    /// One pass over all active feeds. Never waits on an empty slot.
    pub fn tick(&mut self) -> Result<TickOutcome, CoordinatorError> {
        let mut outcome = TickOutcome::default();

        // A feed that has already failed published its last frame before the
        // state change, so taking after reading the state cannot lose it.
        let mut samples = Vec::new();
        let mut failed = Vec::new();
        for (index, feed) in self.feeds.iter().enumerate() {
            let has_failed = feed.state() == FeedState::Failed;
            if let Some(sample) = feed.slot().take() {
                samples.push(sample);
            }
            if has_failed {
                failed.push(index);
            }
        }
        for index in failed.into_iter().rev() {
            let feed = self.feeds.remove(index);
            outcome.retired.push(feed.id());
            self.retire(feed);
        }
        outcome.retired.sort();

        let now = Instant::now();
        let mut tiles = Vec::with_capacity(samples.len());
        for sample in samples {
            let result = self.infer(&sample);
            let Some(counters) = self.counters.get_mut(&sample.feed_id) else {
                continue;
            };
            let processed = counters.record(sample.captured_at.elapsed());

            if self.composer.is_some() {
                let display_fps = counters.display_tick(now);
                let caption = annotate::caption(
                    sample.feed_id,
                    processed,
                    result.detections.len(),
                    display_fps,
                );
                let mut image = into_image(sample);
                annotate::draw_detections(&mut image, &result.detections);
                annotate::overlay_caption(&mut image, &caption);
                tiles.push((image, caption));
            }

            if processed % self.options.stats_interval == 0 {
                let line = counters.stats_line(now);
                info!("{}", line);
                outcome.stats_lines.push(line);
            }
            outcome.results.push(result);
        }

        if let (Some(composer), false) = (self.composer, tiles.is_empty()) {
            let (images, captions): (Vec<RgbImage>, Vec<String>) = tiles.into_iter().unzip();
            let image = composer.compose(images)?;
            outcome.composite_size = Some(image.dimensions());
            self.present(Composite { image, captions });
        }

        Ok(outcome)
    }

    /// Drive ticks until shutdown is signalled or no feed is left.
    pub fn run(mut self) -> Result<RunReport, CoordinatorError> {
        info!("Processing {} feeds", self.feeds.len());

        while !self.shutdown.is_triggered() && !self.feeds.is_empty() {
            let outcome = match self.tick() {
                Ok(outcome) => outcome,
                Err(e) => {
                    let report = self.finish();
                    info!("{}", report.final_status_line());
                    return Err(e);
                }
            };
            if outcome.results.is_empty() {
                thread::sleep(self.options.idle_backoff);
            }
        }

        let report = self.finish();
        info!("{}", report.final_status_line());
        if report.all_failed() {
            return Err(CoordinatorError::AllFeedsFailed(report));
        }
        Ok(report)
    }

    /// Signal every feed, join each with the stop timeout, and report.
    pub fn finish(&mut self) -> RunReport {
        let cancelled = self.shutdown.is_triggered();
        if cancelled {
            info!("Stopping...");
        }

        for feed in &self.feeds {
            feed.request_stop();
        }
        for feed in std::mem::take(&mut self.feeds) {
            self.retire(feed);
        }

        RunReport {
            feeds: self.finished.values().cloned().collect(),
            cancelled,
        }
    }

    fn infer(&self, sample: &FrameSample) -> DetectionResult {
        let started = Instant::now();
        let detections = match self.backend.infer(&sample.image, &self.params) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("{} frame {}: inference failed: {}", sample.feed_id, sample.sequence, e);
                metrics::counter!("argus_inference_errors", "feed" => sample.feed_id.to_string())
                    .increment(1);
                Vec::new()
            }
        };
        metrics::histogram!("argus_inference_ms").record(started.elapsed().as_secs_f64() * 1e3);

        DetectionResult {
            feed_id: sample.feed_id,
            sequence: sample.sequence,
            detections,
        }
    }

    fn present(&mut self, composite: Composite) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.offer(composite) {
            warn!("Renderer unavailable ({}), display disabled", e);
            self.sink = None;
        }
    }

    fn retire(&mut self, mut feed: CaptureFeed) {
        let id = feed.id();
        let failure = match feed.stop(self.options.stop_timeout) {
            Ok(()) => None,
            Err(e) => {
                if !self.shutdown.is_triggered() || matches!(e, FeedError::Read { .. }) {
                    warn!("Retiring feed: {}", e);
                }
                Some(e.to_string())
            }
        };
        let slot = feed.slot().stats();
        let mean_latency = self.counters.get(&id).and_then(FeedCounters::mean_latency);
        self.finished.insert(
            id,
            FeedReport {
                feed_id: id,
                description: feed.description().to_string(),
                frames_processed: self.frames_processed(id),
                frames_captured: slot.written,
                frames_dropped: slot.dropped,
                mean_latency,
                state: feed.state(),
                failure,
            },
        );
    }
}

fn into_image(sample: Arc<FrameSample>) -> RgbImage {
    match Arc::try_unwrap(sample) {
        Ok(sample) => sample.image,
        Err(shared) => shared.image.clone(),
    }
}
