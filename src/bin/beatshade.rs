use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use beatshade::{BeatshadeError, RenderConfig, RenderMode};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "beatshade", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the clip (requires `ffmpeg` on PATH).
    Render(ConfigArgs),
    /// Print the filter graph program without running anything.
    Graph(ConfigArgs),
    /// Print the beat/shade timeline as JSON.
    Timeline(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Background video (looped).
    #[arg(long)]
    video: Option<PathBuf>,

    /// Audio track.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Output MP4 path.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output length in seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Assumed tempo.
    #[arg(long)]
    bpm: Option<f64>,

    /// Seed for beat jitter.
    #[arg(long)]
    seed: Option<u64>,

    /// Beat times from an external analyzer (JSON list of seconds).
    #[arg(long)]
    beats: Option<PathBuf>,

    /// Graph construction mode.
    #[arg(long, value_enum)]
    mode: Option<ModeChoice>,

    /// Kill ffmpeg after this many seconds.
    #[arg(long)]
    timeout: Option<f64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Pulse,
    Timeline,
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<RenderConfig> {
        let mut cfg = match &self.config {
            Some(path) => RenderConfig::from_path(path)?,
            None => RenderConfig::default(),
        };

        if let Some(v) = &self.video {
            cfg.video = v.clone();
        }
        if let Some(v) = &self.audio {
            cfg.audio = v.clone();
        }
        if let Some(v) = &self.out {
            cfg.output = v.clone();
        }
        if let Some(v) = self.duration {
            cfg.duration = v;
        }
        if let Some(v) = self.bpm {
            cfg.bpm = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = Some(v);
        }
        if let Some(v) = &self.beats {
            cfg.beats_file = Some(v.clone());
        }
        if let Some(m) = self.mode {
            cfg.mode = match m {
                ModeChoice::Pulse => RenderMode::Pulse,
                ModeChoice::Timeline => RenderMode::Timeline,
            };
        }
        if let Some(v) = self.timeout {
            cfg.timeout_secs = Some(v);
        }
        Ok(cfg)
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let result = match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Graph(args) => cmd_graph(args),
        Command::Timeline(args) => cmd_timeline(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<BeatshadeError>() {
                Some(BeatshadeError::EngineExecution { status, stderr }) => {
                    eprintln!("ffmpeg failed ({status}):");
                    eprintln!("{stderr}");
                }
                _ => eprintln!("error: {err:#}"),
            }
            ExitCode::from(exit_code(&err))
        }
    }
}

const EXIT_FAILURE: u8 = 1;
const EXIT_MISSING_INPUT: u8 = 2;
const EXIT_ENGINE_FAILED: u8 = 3;
/// `EX_USAGE` from sysexits.h, kept apart from the missing-input code.
const EXIT_USAGE: u8 = 64;

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BeatshadeError>() {
        Some(BeatshadeError::MissingInput { .. }) => EXIT_MISSING_INPUT,
        Some(BeatshadeError::EngineExecution { .. }) => EXIT_ENGINE_FAILED,
        _ => EXIT_FAILURE,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_render(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = args.load()?;
    let engine = cfg.engine();
    let mut rng = cfg.rng();

    let report = beatshade::render(&cfg, &engine, &mut rng)?;

    println!("wrote {}", report.output.display());
    match &report.stream {
        Some(info) => println!("  stream: {info}"),
        None => println!("  stream: unavailable (probe failed)"),
    }
    println!("  size:   {:.1} MB", report.size_mb);
    println!(
        "  beats:  {} ({} shade changes)",
        report.beats,
        report.timeline.shade_changes()
    );
    Ok(())
}

fn cmd_graph(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = args.load()?;
    cfg.validate()?;
    let program = beatshade::build(cfg.strategy().as_ref(), &cfg.layout)?;
    println!("{program}");
    Ok(())
}

fn cmd_timeline(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = args.load()?;
    let mut rng = cfg.rng();
    let plan = beatshade::plan(&cfg, &mut rng)?;
    let json = serde_json::to_string_pretty(&plan.timeline).context("serialize timeline")?;
    println!("{json}");
    Ok(())
}
