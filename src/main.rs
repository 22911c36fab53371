//! Argus multi-camera detection launcher

use std::path::PathBuf;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info};

use argus::capture::SourceSpec;
use argus::display::{spawn_renderer, Composer, NullRenderer, PngSink, RenderError, Renderer};
use argus::inference;
use argus::pipeline::{Coordinator, CoordinatorError, ShutdownSignal};
use argus::{Config, FeedConfig, FeedId, RenderTarget};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-camera capture and detection")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "ARGUS_CONFIG")]
    config: Option<PathBuf>,

    /// Camera indices; replaces the configured feeds.
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    cameras: Vec<u32>,

    /// Use generated test patterns instead of devices for --cameras.
    #[arg(long)]
    synthetic: bool,

    /// Model identifier, e.g. `synthetic:8`.
    #[arg(long)]
    model: Option<String>,

    /// Confidence threshold.
    #[arg(long)]
    conf: Option<f32>,

    /// IOU threshold for non-maximum suppression.
    #[arg(long)]
    iou: Option<f32>,

    /// Inference input size.
    #[arg(long)]
    imgsz: Option<u32>,

    /// Show the composite view.
    #[arg(long)]
    display: bool,

    /// Write the composite to DIR/composite.png instead of a window.
    #[arg(long, value_name = "DIR")]
    png_dir: Option<PathBuf>,

    /// Scale composites down to this width.
    #[arg(long)]
    max_width: Option<u32>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if !self.cameras.is_empty() {
            config.feeds = self
                .cameras
                .iter()
                .map(|&n| FeedConfig {
                    id: FeedId(n),
                    source: if self.synthetic {
                        SourceSpec::Synthetic {
                            width: 640,
                            height: 480,
                            fps: Some(30.0),
                            frame_limit: None,
                        }
                    } else {
                        SourceSpec::Device {
                            path: n.to_string(),
                        }
                    },
                })
                .collect();
        }
        if let Some(model) = &self.model {
            config.inference.model = model.clone();
        }
        if let Some(conf) = self.conf {
            config.inference.confidence = conf;
        }
        if let Some(iou) = self.iou {
            config.inference.iou = iou;
        }
        if let Some(imgsz) = self.imgsz {
            config.inference.input_size = imgsz;
        }
        if let Some(dir) = &self.png_dir {
            config.display.enabled = true;
            config.display.target = RenderTarget::Png { dir: dir.clone() };
        }
        if self.display {
            config.display.enabled = true;
        }
        if let Some(max_width) = self.max_width {
            config.display.max_width = max_width;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("argus=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!("Argus launching...");
    info!(
        "Feeds: {:?}",
        config.feeds.iter().map(|f| f.id).collect::<Vec<_>>()
    );
    info!("Model: {}", config.inference.model);
    info!("Confidence: {}", config.inference.confidence);

    let backend = inference::from_model_id(&config.inference.model, config.inference.precision)?;
    let shutdown = ShutdownSignal::new();

    let renderer = if config.display.enabled {
        let make = renderer_factory(&config)?;
        Some(spawn_renderer(make, shutdown.clone())?)
    } else {
        None
    };

    let coordinator = Coordinator::from_config(&config, backend, shutdown.clone())?;
    let coordinator = match &renderer {
        Some((sink, _)) => coordinator
            .with_display(Composer::new(config.display.max_width), Some(sink.clone()))?,
        None => coordinator,
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.trigger();
        }
    });

    info!("Processing cameras... Press Ctrl-C to quit");
    let outcome = tokio::task::spawn_blocking(move || coordinator.run()).await?;

    // Coordinator is done; let the render thread drain and exit
    shutdown.trigger();
    if let Some((sink, handle)) = renderer {
        drop(sink);
        if handle.join().is_err() {
            error!("Render thread panicked");
        }
    }

    match outcome {
        Ok(report) => {
            info!(
                "Argus shutting down ({})",
                if report.cancelled { "cancelled" } else { "all feeds ended" }
            );
            Ok(())
        }
        Err(CoordinatorError::AllFeedsFailed(report)) => Err(eyre!(
            "no feed remained viable. {}",
            report.final_status_line()
        )),
        Err(e) => Err(e.into()),
    }
}

type RendererFactory = Box<dyn FnOnce() -> Result<Box<dyn Renderer>, RenderError> + Send>;

fn renderer_factory(config: &Config) -> Result<RendererFactory> {
    match &config.display.target {
        RenderTarget::Null => Ok(Box::new(|| -> Result<Box<dyn Renderer>, RenderError> {
            Ok(Box::new(NullRenderer::default()))
        })),
        RenderTarget::Png { dir } => {
            let dir = dir.clone();
            Ok(Box::new(move || -> Result<Box<dyn Renderer>, RenderError> {
                Ok(Box::new(PngSink::new(dir)?))
            }))
        }
        RenderTarget::Window => window_factory(config.display.width, config.display.height),
    }
}

#[cfg(feature = "sdl-display")]
fn window_factory(width: u32, height: u32) -> Result<RendererFactory> {
    use argus::display::Sdl2Display;
    Ok(Box::new(move || -> Result<Box<dyn Renderer>, RenderError> {
        Ok(Box::new(Sdl2Display::new(width, height)?))
    }))
}

#[cfg(not(feature = "sdl-display"))]
fn window_factory(_width: u32, _height: u32) -> Result<RendererFactory> {
    Err(eyre!(
        "window display needs the `sdl-display` feature; \
         use --png-dir or display.target.kind = \"null\""
    ))
}
