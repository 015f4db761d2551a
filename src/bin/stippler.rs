use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stippler::gpu::{DeviceProfile, GpuDevice, GpuStippleBackend};
use stippler::{
    create_backend, BackendKind, FrameError, FrameSource, ImageSequence, LatestFrame, PngSequence,
    RenderMode, RunOutcome, StageBackend, StaticFrame, StippleConfig, StipplePipeline, Surface, WeightMode,
};

#[derive(Parser, Debug)]
#[command(name = "stippler", version, about = "Weighted Voronoi stippling")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relax the sites on one image and write the final stipple PNG.
    Still(StillArgs),
    /// Stipple every image in a directory into numbered PNGs.
    Sequence(SequenceArgs),
}

#[derive(Parser, Debug)]
struct CommonArgs {
    /// JSON config. Flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,

    /// Device limits for `--backend gpu`. `embedded` caps them to a small GPU's.
    #[arg(long, value_enum, default_value_t = ProfileChoice::Native)]
    gpu_profile: ProfileChoice,

    /// Number of sites.
    #[arg(long)]
    sites: Option<u32>,

    /// Seed string for the initial site layout.
    #[arg(long)]
    seed: Option<String>,

    /// Disc radius of the heaviest site, in pixels.
    #[arg(long)]
    falloff: Option<f32>,

    /// Render mode.
    #[arg(long, value_enum)]
    mode: Option<ModeChoice>,

    /// Disc color for `--mode tinted`, as `r,g,b` in [0, 1].
    #[arg(long, value_parser = parse_rgb, default_value = "1,1,1")]
    tint: [f32; 3],

    /// Let bright pixels attract sites instead of dark ones.
    #[arg(long)]
    bright: bool,
}

#[derive(Parser, Debug)]
struct StillArgs {
    /// Input image (PNG or JPEG).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Lloyd iterations before the image is written.
    #[arg(long, default_value_t = 50)]
    iterations: u32,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct SequenceArgs {
    /// Directory of input frames, processed in file-name order.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,

    /// Extra iterations on the first frame so the sites start settled.
    #[arg(long, default_value_t = 0)]
    warmup: u32,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    Gpu,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileChoice {
    Native,
    Embedded,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Grayscale,
    Passthrough,
    Tinted,
}

fn parse_rgb(s: &str) -> Result<[f32; 3], String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        &[r, g, b] => Ok([r, g, b]),
        _ => Err(format!("expected r,g,b, got '{s}'")),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Still(args) => cmd_still(args),
        Command::Sequence(args) => cmd_sequence(args),
    }
}

fn build_config(common: &CommonArgs, width: u32, height: u32) -> anyhow::Result<StippleConfig> {
    let mut config = match &common.config {
        Some(path) => StippleConfig::load(path).with_context(|| format!("load config '{}'", path.display()))?,
        None => StippleConfig::default(),
    };
    config.width = width;
    config.height = height;
    if let Some(n) = common.sites {
        config.site_count = n;
    }
    if let Some(seed) = &common.seed {
        config.initial_seed = seed.clone();
    }
    if let Some(k) = common.falloff {
        config.falloff = k;
    }
    if let Some(mode) = common.mode {
        config.render_mode = match mode {
            ModeChoice::Grayscale => RenderMode::Grayscale,
            ModeChoice::Passthrough => RenderMode::Passthrough,
            ModeChoice::Tinted => RenderMode::Tinted { color: common.tint },
        };
    }
    if common.bright {
        config.weight_mode = WeightMode::Brightness;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_backend(common: &CommonArgs, config: &StippleConfig) -> anyhow::Result<Box<dyn StageBackend>> {
    match common.backend {
        BackendChoice::Cpu => Ok(create_backend(BackendKind::Cpu, config)?),
        BackendChoice::Gpu => {
            let profile = match common.gpu_profile {
                ProfileChoice::Native => DeviceProfile::Native,
                ProfileChoice::Embedded => DeviceProfile::Embedded,
            };
            let gpu = GpuDevice::new_with_profile(profile).context("open gpu device")?;
            Ok(Box::new(GpuStippleBackend::new(gpu, config)?))
        }
    }
}

fn open_frame(path: &Path) -> anyhow::Result<stippler::Frame> {
    let img = image::open(path).with_context(|| format!("open image '{}'", path.display()))?;
    Ok(stippler::Frame::from_dynamic_image(&img))
}

/// Force `runs` frames through the pipeline.
fn drive<S: FrameSource, O: Surface>(
    pipeline: &mut StipplePipeline<Box<dyn StageBackend>, S, O>,
    runs: u32,
) -> anyhow::Result<u32> {
    let trigger = pipeline.trigger_handle();
    let mut completed = 0;
    for _ in 0..runs {
        trigger.force_frame();
        match pipeline.run_pending()? {
            RunOutcome::Completed(_) => completed += 1,
            RunOutcome::Skipped { error: FrameError::Exhausted, .. } => break,
            RunOutcome::Skipped { .. } | RunOutcome::NoTrigger => {}
            RunOutcome::Halted => anyhow::bail!("pipeline halted"),
        }
    }
    Ok(completed)
}

fn cmd_still(args: StillArgs) -> anyhow::Result<()> {
    let frame = open_frame(&args.in_path)?;
    let config = build_config(&args.common, frame.width(), frame.height())?;
    let backend = open_backend(&args.common, &config)?;
    info!(backend = backend.name(), sites = config.site_count, iterations = args.iterations, "stippling still");

    let mut pipeline = StipplePipeline::new(backend, StaticFrame::new(frame), LatestFrame::new());
    drive(&mut pipeline, args.iterations.max(1))?;

    let image = pipeline
        .surface_mut()
        .take()
        .context("no frame was rendered")?;
    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_sequence(args: SequenceArgs) -> anyhow::Result<()> {
    let mut source = ImageSequence::open(&args.in_dir, false)
        .with_context(|| format!("read directory '{}'", args.in_dir.display()))?;
    let frame_count = u32::try_from(source.len()).context("too many frames")?;
    anyhow::ensure!(frame_count > 0, "no PNG or JPEG files in '{}'", args.in_dir.display());

    let first = source.acquire().context("decode first frame")?;
    let config = build_config(&args.common, first.width(), first.height())?;
    let mut backend = open_backend(&args.common, &config)?;
    info!(backend = backend.name(), frames = frame_count, "stippling sequence");

    for _ in 0..args.warmup {
        backend.clear_accumulators()?;
        backend.assign(&first)?;
        backend.reduce()?;
    }

    // Reopen so the first frame is also written.
    let source = ImageSequence::open(&args.in_dir, false)
        .with_context(|| format!("read directory '{}'", args.in_dir.display()))?;
    let surface = PngSequence::create(&args.out, "stipple")
        .with_context(|| format!("create output dir '{}'", args.out.display()))?;
    let mut pipeline = StipplePipeline::new(backend, source, surface);
    let written = drive(&mut pipeline, frame_count)?;

    let stats = pipeline.stats();
    eprintln!(
        "wrote {written} frames to {} ({} skipped, {} present failures)",
        args.out.display(),
        stats.frames_skipped,
        stats.present_failures
    );
    Ok(())
}
