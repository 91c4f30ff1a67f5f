// Argus command line interface
// Runs the detection pipeline against a camera or a folder of images

use anyhow::{bail, Context};
use argus_eye::models::manager::{download_url, KNOWN_MODELS};
use argus_eye::models::{ModelManager, COCO_CLASSES};
use argus_eye::source::CameraSlot;
use argus_eye::{
    ChannelSink, Detector, FrameSource, ModelConfig, PipelineConfig, PipelineController, PipelineHandle,
    ReplaySource,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "argus")]
#[command(about = "Real-time object detection from a camera or image sequence", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection pipeline
    Run(RunArgs),

    /// Print the class table of the default model
    Classes,

    /// Download model weights into the model directory
    DownloadModel {
        /// Model file name, e.g. yolov8n.onnx
        #[arg(default_value = "yolov8n.onnx")]
        name: String,

        /// Model directory
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file (TOML or JSON)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Camera: device index, "front" or "back"
    #[arg(long)]
    camera: Option<String>,

    /// Replay images from this directory instead of a camera
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Start the replay over after the last image
    #[arg(long = "loop", requires = "replay")]
    looping: bool,

    /// Model file name inside the model directory
    #[arg(long)]
    model: Option<String>,

    /// Model directory
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Do not fetch missing model weights
    #[arg(long)]
    no_download: bool,

    /// Confidence threshold in [0, 1]
    #[arg(long, short)]
    threshold: Option<f32>,

    /// Process one in every N frames
    #[arg(long)]
    frame_skip: Option<u32>,

    /// Processing width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Processing height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Minimum milliseconds between cycles
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Detection log written on exit
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Also write the log as JSON here
    #[arg(long)]
    json_log: Option<PathBuf>,

    /// Stop after this many consecutive failed reads
    #[arg(long)]
    max_read_failures: Option<u32>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Save every annotated frame as PNG into this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::Classes => show_classes(),
        Commands::DownloadModel { name, model_dir } => download_model(name, model_dir).await?,
    }

    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let log_path = config.log_path.clone();

    let manager = ModelManager::new(Arc::new(config.model.clone()));
    let detector = manager
        .load_detector()
        .await
        .context("Failed to load detection model")?;
    info!(
        "Model {} ready ({} classes)",
        config.model.model_name,
        detector.num_classes()
    );

    let source = open_source(&args, &config)?;
    let sink = Arc::new(ChannelSink::default());
    let controller = PipelineController::new(config, source, detector)
        .context("Invalid pipeline configuration")?
        .with_sink(sink.clone());

    let printer = tokio::spawn(print_records(sink.clone()));
    let snapshots = args
        .snapshot_dir
        .clone()
        .map(|dir| tokio::spawn(save_snapshots(sink.clone(), dir)));

    let mut handle = PipelineHandle::new(controller);
    handle.start().context("Failed to start pipeline")?;
    println!("🎥 Pipeline running, press Ctrl+C to stop");

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Ctrl+C handler failed: {}", e);
            }
            info!("Interrupted");
        }
        _ = deadline => info!("Run duration reached"),
        _ = handle.join() => warn!("Pipeline ended on its own"),
    }

    handle.stop().await;
    printer.abort();
    if let Some(task) = snapshots {
        task.abort();
    }

    handle
        .flush_log()
        .with_context(|| format!("Failed to write detection log to {:?}", log_path))?;
    println!("📝 Detection log written to {:?}", log_path);

    if let Some(json_path) = &args.json_log {
        handle
            .controller()
            .lock()
            .log()
            .flush_json(json_path)
            .with_context(|| format!("Failed to write JSON log to {:?}", json_path))?;
        println!("📝 JSON log written to {:?}", json_path);
    }

    println!("📊 Statistics:");
    println!("{}", serde_json::to_string_pretty(&handle.stats())?);
    Ok(())
}

fn build_config(args: &RunArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("Failed to load {:?}", path))?,
        None => PipelineConfig::default(),
    };

    if let Some(camera) = &args.camera {
        config.video_source = parse_camera(camera)?;
    }
    if let Some(model) = &args.model {
        config.model.model_name = model.clone();
    }
    if let Some(dir) = &args.model_dir {
        config.model.model_dir = dir.clone();
    }
    if args.no_download {
        config.model.auto_download = false;
    }
    if let Some(threshold) = args.threshold {
        config.confidence_threshold = threshold;
    }
    if let Some(frame_skip) = args.frame_skip {
        config.frame_skip = frame_skip;
    }
    if let Some(width) = args.width {
        config.target_size.0 = width;
    }
    if let Some(height) = args.height {
        config.target_size.1 = height;
    }
    if let Some(interval) = args.interval_ms {
        config.cycle_interval_ms = interval;
    }
    if let Some(path) = &args.log_path {
        config.log_path = path.clone();
    }
    if args.max_read_failures.is_some() {
        config.max_consecutive_read_failures = args.max_read_failures;
    }

    config.validate()?;
    Ok(config)
}

fn parse_camera(value: &str) -> anyhow::Result<u32> {
    if let Ok(index) = value.parse::<u32>() {
        return Ok(index);
    }
    let slot: CameraSlot = value.parse()?;
    Ok(slot.index())
}

fn open_source(args: &RunArgs, config: &PipelineConfig) -> anyhow::Result<Box<dyn FrameSource>> {
    if let Some(dir) = &args.replay {
        return Ok(Box::new(ReplaySource::new(dir).looping(args.looping)));
    }
    camera_source(config)
}

#[cfg(feature = "opencv")]
fn camera_source(config: &PipelineConfig) -> anyhow::Result<Box<dyn FrameSource>> {
    let (width, height) = config.target_size;
    Ok(Box::new(
        argus_eye::source::CameraSource::new().with_requested_size(width, height),
    ))
}

#[cfg(not(feature = "opencv"))]
fn camera_source(_config: &PipelineConfig) -> anyhow::Result<Box<dyn FrameSource>> {
    bail!("Camera capture needs the `opencv` feature; use --replay <dir> or rebuild with --features opencv")
}

async fn print_records(sink: Arc<ChannelSink>) {
    let mut records = sink.subscribe_records();
    loop {
        match records.recv().await {
            Ok(record) => println!("{}", record),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Display fell behind, {} records not shown", missed);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn save_snapshots(sink: Arc<ChannelSink>, dir: PathBuf) {
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        error!("Cannot create snapshot directory {:?}: {}", dir, e);
        return;
    }

    let mut frames = sink.subscribe_frames();
    let mut saved: u64 = 0;
    while frames.changed().await.is_ok() {
        let Some(image) = frames.borrow_and_update().as_ref().map(|frame| frame.to_rgb_image()) else {
            continue;
        };
        saved += 1;
        let path = dir.join(format!("frame_{:06}.png", saved));
        let result = tokio::task::spawn_blocking(move || image.save(&path).map(|_| path)).await;
        match result {
            Ok(Ok(path)) => debug!("Saved {:?}", path),
            Ok(Err(e)) => warn!("Failed to save snapshot: {}", e),
            Err(e) => warn!("Snapshot task failed: {}", e),
        }
    }
}

fn show_classes() {
    for (id, name) in COCO_CLASSES.iter().enumerate() {
        println!("{:>3}  {}", id, name);
    }
}

async fn download_model(name: String, model_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let Some(url) = download_url(&name) else {
        eprintln!("❌ Unknown model: {}", name);
        eprintln!("Available models:");
        for (known, params) in KNOWN_MODELS {
            eprintln!("  {} ({} parameters)", known, params);
        }
        bail!("Unknown model {}", name);
    };

    let mut config = ModelConfig {
        model_name: name.clone(),
        ..ModelConfig::default()
    };
    if let Some(dir) = model_dir {
        config.model_dir = dir;
    }

    let manager = ModelManager::new(Arc::new(config));
    println!("⬇️  Downloading {}...", name);
    let path = manager.ensure_model(&name, &url, "").await?;
    println!("✅ Model saved to {:?}", path);
    Ok(())
}
