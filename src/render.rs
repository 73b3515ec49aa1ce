use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rand::RngCore;

use crate::config::RenderConfig;
use crate::engine::{MediaEngine, RenderJob, StreamInfo};
use crate::foundation::error::{BeatshadeError, BeatshadeResult};
use crate::graph::FilterGraph;
use crate::graph::builder::build;
use crate::timeline::{Timeline, assign};

/// Beats, shade timeline and graph for one run, before anything is executed.
#[derive(Clone, Debug)]
pub struct RenderPlan {
    pub beats: Vec<f64>,
    pub timeline: Timeline,
    pub program: FilterGraph,
}

/// What a successful run produced.
#[derive(Clone, Debug)]
pub struct RenderReport {
    pub output: PathBuf,
    /// `None` when the probe failed; the render itself still succeeded.
    pub stream: Option<StreamInfo>,
    pub size_mb: f64,
    pub beats: usize,
    pub timeline: Timeline,
}

/// Fail with [`BeatshadeError::MissingInput`] unless both inputs exist.
pub fn ensure_inputs(cfg: &RenderConfig) -> BeatshadeResult<()> {
    for (kind, path) in [("background video", &cfg.video), ("audio", &cfg.audio)] {
        if !path.exists() {
            return Err(BeatshadeError::missing_input(kind, path.clone()));
        }
    }
    Ok(())
}

/// Compute beats, timeline and graph without touching the inputs or the engine.
pub fn plan(cfg: &RenderConfig, rng: &mut dyn RngCore) -> BeatshadeResult<RenderPlan> {
    cfg.validate()?;

    let beats = cfg.beat_source().beats(cfg.duration, rng)?;
    let timeline = assign(&beats, cfg.palette.len())?;
    let program = build(cfg.strategy().as_ref(), &cfg.layout)?;

    Ok(RenderPlan {
        beats,
        timeline,
        program,
    })
}

/// Run the whole pipeline.
///
/// Inputs are checked first; when either is missing the engine is never invoked.
#[tracing::instrument(skip_all, fields(output = %cfg.output.display(), mode = ?cfg.mode))]
pub fn render(
    cfg: &RenderConfig,
    engine: &dyn MediaEngine,
    rng: &mut dyn RngCore,
) -> BeatshadeResult<RenderReport> {
    ensure_inputs(cfg)?;

    let plan = plan(cfg, rng)?;
    tracing::info!(
        beats = plan.beats.len(),
        shade_changes = plan.timeline.shade_changes(),
        "planned render"
    );
    tracing::debug!(program = %plan.program, "filter graph");

    ensure_parent_dir(&cfg.output)?;
    let job = RenderJob {
        video: &cfg.video,
        audio: &cfg.audio,
        output: &cfg.output,
        program: &plan.program,
        encoder: &cfg.encoder,
        duration: cfg.duration,
    };
    let args = job.args();

    tracing::info!("running media engine, this can take several minutes");
    let out = engine.execute(&args, cfg.timeout())?;
    if !out.success {
        return Err(BeatshadeError::engine(out.status, out.stderr));
    }

    let stream = match engine.probe(&cfg.output) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::warn!(error = %e, "could not probe rendered output");
            None
        }
    };

    let bytes = std::fs::metadata(&cfg.output)
        .with_context(|| format!("stat output '{}'", cfg.output.display()))?
        .len();
    let size_mb = bytes as f64 / (1024.0 * 1024.0);

    tracing::info!(size_mb, "render finished");
    Ok(RenderReport {
        output: cfg.output.clone(),
        stream,
        size_mb,
        beats: plan.beats.len(),
        timeline: plan.timeline,
    })
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> BeatshadeResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
