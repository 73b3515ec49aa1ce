use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use rand::SeedableRng as _;
use rand::rngs::StdRng;

use crate::beats::{BeatSource, DEFAULT_JITTER_SEC};
use crate::engine::{EncoderSettings, FfmpegEngine};
use crate::foundation::error::{BeatshadeError, BeatshadeResult};
use crate::graph::builder::Layout;
use crate::graph::strategy::{
    ChannelMix, DEFAULT_TRANSITION_SEC, PaletteSequence, PulseTreatment, ShadingStrategy,
};
use crate::palette::Palette;

/// Which graph the render uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// One red treatment with a time-based pulse.
    #[default]
    Pulse,
    /// One branch per palette shade, cross-faded in sequence.
    Timeline,
}

/// Everything one run needs. Every field has a default, so a config file only lists overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    /// Output length in seconds; also the span the beats and palette segments cover.
    pub duration: f64,
    pub bpm: f64,
    pub start_offset: f64,
    pub jitter: f64,
    /// Seed for beat jitter. `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Precomputed beats from an external analyzer, replacing the fixed tempo.
    pub beats_file: Option<PathBuf>,
    pub mode: RenderMode,
    pub layout: Layout,
    pub palette: Palette,
    pub palette_mix: ChannelMix,
    pub transition: f64,
    pub pulse: PulseTreatment,
    pub encoder: EncoderSettings,
    /// Kill the engine after this many seconds.
    pub timeout_secs: Option<f64>,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            video: PathBuf::from("silk_background.mp4"),
            audio: PathBuf::from("audio2.mp3"),
            output: PathBuf::from("red_silk_final.mp4"),
            duration: 18.19,
            bpm: 128.0,
            start_offset: 0.5,
            jitter: DEFAULT_JITTER_SEC,
            seed: None,
            beats_file: None,
            mode: RenderMode::Pulse,
            layout: Layout::default(),
            palette: Palette::red_silk(),
            palette_mix: ChannelMix::RED_BIAS,
            transition: DEFAULT_TRANSITION_SEC,
            pulse: PulseTreatment::default(),
            encoder: EncoderSettings::default(),
            timeout_secs: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl RenderConfig {
    /// Load a JSON config. Relative paths stay relative to the working directory.
    pub fn from_path(path: impl AsRef<Path>) -> BeatshadeResult<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config '{}'", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> BeatshadeResult<()> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(BeatshadeError::validation("duration must be finite and > 0"));
        }
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(BeatshadeError::validation("bpm must be finite and > 0"));
        }
        if !self.start_offset.is_finite() || self.start_offset < 0.0 {
            return Err(BeatshadeError::validation(
                "start offset must be finite and >= 0",
            ));
        }
        if let Some(t) = self.timeout_secs
            && (!t.is_finite() || t <= 0.0)
        {
            return Err(BeatshadeError::validation("timeout must be finite and > 0"));
        }
        self.layout.validate()?;
        self.strategy().validate()
    }

    pub fn beat_source(&self) -> BeatSource {
        match &self.beats_file {
            Some(path) => BeatSource::ExternalAnalyzer { path: path.clone() },
            None => BeatSource::FixedTempo {
                bpm: self.bpm,
                start_offset: self.start_offset,
                jitter: self.jitter,
            },
        }
    }

    pub fn strategy(&self) -> Box<dyn ShadingStrategy> {
        match self.mode {
            RenderMode::Pulse => Box::new(self.pulse),
            RenderMode::Timeline => Box::new(PaletteSequence {
                palette: self.palette.clone(),
                duration: self.duration,
                transition: self.transition,
                mix: self.palette_mix,
            }),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs_f64)
    }

    /// Fresh random source for one run.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn engine(&self) -> FfmpegEngine {
        FfmpegEngine::new(&self.ffmpeg, &self.ffprobe)
    }
}
