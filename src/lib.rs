pub mod bench;
pub mod capture;
pub mod display;
pub mod inference;
pub mod pipeline;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capture::{FeedId, FrameSample};
use capture::gst_pipeline::GstCompat;
use capture::{FeedOptions, SourceSpec};
use display::Layout;
use inference::{InferenceParams, Precision};
use pipeline::CoordinatorOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// System configuration
///
/// Resolved once at startup by the launcher and passed down explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feeds: Vec<FeedConfig>,
    pub inference: InferenceConfig,
    pub display: DisplayConfig,
    pub coordinator: CoordinatorConfig,
    pub benchmark: BenchmarkConfig,
    pub gstreamer: GStreamerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: FeedId,
    pub source: SourceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub model: String,
    pub precision: Precision,
    pub confidence: f32,
    pub iou: f32,
    pub input_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    /// Composites wider than this are scaled down
    pub max_width: u32,
    pub target: RenderTarget,
    /// Initial window size
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderTarget {
    Window,
    Png { dir: PathBuf },
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Emit a statistics line every this many frames per feed
    pub stats_interval: u64,
    /// Sleep when a tick finds no frames
    pub idle_backoff_ms: u64,
    pub stop_timeout_ms: u64,
    pub open_timeout_ms: u64,
    pub max_read_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub frames: usize,
    pub warmup: usize,
    /// Second backend for comparison runs
    pub candidate: Option<String>,
    pub test_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GStreamerConfig {
    pub compat: GstCompat,
}

impl Default for Config {
    fn default() -> Self {
        let synthetic = || SourceSpec::Synthetic {
            width: 640,
            height: 480,
            fps: Some(30.0),
            frame_limit: None,
        };
        Self {
            feeds: vec![
                FeedConfig {
                    id: FeedId(0),
                    source: synthetic(),
                },
                FeedConfig {
                    id: FeedId(1),
                    source: synthetic(),
                },
            ],
            inference: InferenceConfig::default(),
            display: DisplayConfig::default(),
            coordinator: CoordinatorConfig::default(),
            benchmark: BenchmarkConfig::default(),
            gstreamer: GStreamerConfig::default(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let params = InferenceParams::default();
        Self {
            model: "synthetic".into(),
            precision: Precision::Fp16,
            confidence: params.confidence,
            iou: params.iou,
            input_size: params.input_size,
        }
    }
}

impl InferenceConfig {
    pub fn params(&self) -> InferenceParams {
        InferenceParams {
            confidence: self.confidence,
            iou: self.iou,
            input_size: self.input_size,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_width: 1920,
            target: RenderTarget::Window,
            width: 1280,
            height: 720,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stats_interval: 30,
            idle_backoff_ms: 1,
            stop_timeout_ms: 1000,
            open_timeout_ms: 5000,
            max_read_retries: 3,
            retry_backoff_ms: 10,
        }
    }
}

impl CoordinatorConfig {
    pub fn options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            stats_interval: self.stats_interval,
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            feed: FeedOptions {
                open_timeout: Duration::from_millis(self.open_timeout_ms),
                max_read_retries: self.max_read_retries,
                retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            },
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            frames: 100,
            warmup: 10,
            candidate: None,
            test_image: None,
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file, and `ARGUS__SECTION__KEY`
    /// environment variables.
    ///
    /// The result is not validated: callers apply command-line overrides
    /// first and then call [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ARGUS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.feeds.is_empty() {
            return invalid("at least one feed is required".into());
        }
        let mut seen = BTreeSet::new();
        for feed in &self.feeds {
            if !seen.insert(feed.id) {
                return invalid(format!("feed id {} is used more than once", feed.id.0));
            }
        }
        if self.display.enabled && self.feeds.len() > Layout::MAX_IMAGES {
            return invalid(format!(
                "display supports at most {} feeds, {} configured",
                Layout::MAX_IMAGES,
                self.feeds.len()
            ));
        }
        if self.display.max_width == 0 {
            return invalid("display.max_width must be positive".into());
        }

        let inference = &self.inference;
        if !(0.0..=1.0).contains(&inference.confidence) {
            return invalid(format!("confidence {} outside [0, 1]", inference.confidence));
        }
        if !(0.0..=1.0).contains(&inference.iou) {
            return invalid(format!("iou {} outside [0, 1]", inference.iou));
        }
        if inference.input_size == 0 {
            return invalid("inference.input_size must be positive".into());
        }

        if self.coordinator.stats_interval == 0 {
            return invalid("coordinator.stats_interval must be positive".into());
        }
        if self.benchmark.frames == 0 {
            return invalid("benchmark.frames must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn duplicate_feed_ids_rejected() {
        let mut config = Config::default();
        config.feeds[1].id = FeedId(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn five_feeds_cannot_be_displayed() {
        let mut config = Config::default();
        let template = config.feeds[0].clone();
        config.feeds = (0..5)
            .map(|i| FeedConfig {
                id: FeedId(i),
                ..template.clone()
            })
            .collect();
        config.validate().unwrap();

        config.display.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn thresholds_out_of_range_rejected() {
        let mut config = Config::default();
        config.inference.confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus.toml");
        std::fs::write(
            &path,
            r#"
[inference]
model = "synthetic:3"
confidence = 0.4

[display]
enabled = true
max_width = 1280

[display.target]
kind = "png"
dir = "out"

[[feeds]]
id = 2

[feeds.source]
kind = "synthetic"
width = 320
height = 240

[[feeds]]
id = 5

[feeds.source]
kind = "images"
path = "frames"
looping = true
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.inference.model, "synthetic:3");
        assert!((config.inference.confidence - 0.4).abs() < 1e-6);
        assert_eq!(config.inference.input_size, 640);
        assert_eq!(config.display.max_width, 1280);
        assert!(matches!(config.display.target, RenderTarget::Png { .. }));
        assert_eq!(
            config.feeds.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![FeedId(2), FeedId(5)]
        );
        assert!(matches!(
            config.feeds[1].source,
            SourceSpec::Images { looping: true, .. }
        ));
        assert_eq!(config.coordinator.stats_interval, 30);
        config.validate().unwrap();
    }

    #[test]
    fn load_leaves_validation_to_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus.toml");
        let mut toml = String::from("[display]\nenabled = true\n");
        for id in 0..5 {
            toml.push_str(&format!(
                "\n[[feeds]]\nid = {id}\n\n[feeds.source]\nkind = \"device\"\npath = \"{id}\"\n"
            ));
        }
        std::fs::write(&path, toml).unwrap();

        // Five feeds cannot be displayed, but loading still succeeds
        let mut config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.feeds.len(), 5);
        assert!(config.validate().is_err());

        // An override narrowing the feed set makes it valid
        config.feeds.truncate(2);
        config.validate().unwrap();
    }
}
