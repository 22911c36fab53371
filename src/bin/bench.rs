//! argus-bench - measure and compare inference backend latency.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use tracing::{info, warn};

use argus::bench::{self, BenchmarkParams, BenchmarkStats, ACCURACY_TOLERANCE};
use argus::inference::{self, InferenceParams, Precision};
use argus::Config;

const RULE: &str = "============================================================";

#[derive(Parser, Debug)]
#[command(author, version, about = "Inference backend benchmark")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "ARGUS_CONFIG")]
    config: Option<PathBuf>,

    /// Baseline model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Second model to compare against the baseline.
    #[arg(long)]
    candidate: Option<String>,

    /// Timed inference calls.
    #[arg(long)]
    frames: Option<usize>,

    /// Discarded calls before timing.
    #[arg(long)]
    warmup: Option<usize>,

    /// Synthetic input size.
    #[arg(long)]
    imgsz: Option<u32>,

    /// Build the candidate at FP32 instead of FP16.
    #[arg(long)]
    fp32: bool,

    /// Compare detection counts of baseline and candidate on one image.
    #[arg(long)]
    accuracy: bool,

    /// Image for the accuracy check; synthetic noise otherwise.
    #[arg(long)]
    test_image: Option<PathBuf>,
}

fn main() -> Result<()> {
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
    if let Some(model) = args.model {
        config.inference.model = model;
    }
    if let Some(candidate) = args.candidate {
        config.benchmark.candidate = Some(candidate);
    }
    if let Some(frames) = args.frames {
        config.benchmark.frames = frames;
    }
    if let Some(warmup) = args.warmup {
        config.benchmark.warmup = warmup;
    }
    if let Some(imgsz) = args.imgsz {
        config.inference.input_size = imgsz;
    }
    if args.test_image.is_some() {
        config.benchmark.test_image = args.test_image;
    }
    if args.fp32 {
        config.inference.precision = Precision::Fp32;
    }
    config.validate()?;

    let params = BenchmarkParams {
        samples: config.benchmark.frames,
        warmup: config.benchmark.warmup,
        input_size: config.inference.input_size,
    };
    let inference_params = config.inference.params();

    // Baseline always runs at FP32; the precision flag applies to the candidate
    let baseline = inference::from_model_id(&config.inference.model, Precision::Fp32)?;
    let candidate = config
        .benchmark
        .candidate
        .as_deref()
        .map(|model| inference::from_model_id(model, config.inference.precision))
        .transpose()?;

    println!("Frames: {}", params.samples);
    println!("Warmup: {}", params.warmup);
    println!("Image size: {}", params.input_size);

    match &candidate {
        None => {
            let stats = bench::benchmark(baseline.as_ref(), &params, &inference_params)?;
            println!("\nBenchmark Results ({}):", baseline.name());
            println!("{stats}");
        }
        Some(candidate) => {
            println!("\n{RULE}\nPERFORMANCE COMPARISON\n{RULE}");
            let cmp = bench::compare(
                baseline.as_ref(),
                candidate.as_ref(),
                &params,
                &inference_params,
            )?;
            print_stats(baseline.name(), &cmp.a);
            print_stats(candidate.name(), &cmp.b);
            println!("\nSpeedup:");
            println!("  Inference time: {:.2}x faster", cmp.speedup);
            println!("  FPS increase:   {:.2}x", cmp.throughput_gain);
            println!("  Time saved:     {:.2} ms per frame", cmp.time_saved_ms);
            println!("{RULE}");
        }
    }

    if args.accuracy {
        let Some(candidate) = &candidate else {
            warn!("--accuracy needs --candidate; skipping");
            return Ok(());
        };
        let image = match &config.benchmark.test_image {
            Some(path) => image::open(path)
                .wrap_err_with(|| format!("could not load {}", path.display()))?
                .to_rgb8(),
            None => {
                info!("No test image given, using synthetic input");
                bench::synthetic_input(params.input_size)
            }
        };
        accuracy(baseline.as_ref(), candidate.as_ref(), &image, &inference_params)?;
    }

    Ok(())
}

fn print_stats(name: &str, stats: &BenchmarkStats) {
    println!("\n{name}:");
    println!("{stats}");
}

fn accuracy(
    a: &dyn inference::InferenceBackend,
    b: &dyn inference::InferenceBackend,
    image: &image::RgbImage,
    params: &InferenceParams,
) -> Result<()> {
    println!("\n{RULE}\nACCURACY TEST\n{RULE}");
    let check = bench::accuracy_delta(a, b, image, params)?;
    println!("\n{} detections: {}", a.name(), check.count_a);
    println!("{} detections: {}", b.name(), check.count_b);
    println!("Difference: {}", check.difference);
    if check.within_tolerance {
        println!("\nResults are similar (within {ACCURACY_TOLERANCE} detection difference)");
    } else {
        println!("\nWarning: results differ significantly");
        println!("  Lower precision can shift borderline detections");
    }
    println!("{RULE}");
    Ok(())
}
