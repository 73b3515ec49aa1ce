//! Beat timestamps.
//!
//! Beat detection is a fixed-tempo approximation: beats are laid out at `60 / bpm` second
//! intervals with a small uniform jitter. A real analyzer can be plugged in through
//! [`BeatSource::ExternalAnalyzer`], which reads precomputed beat times from disk.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rand::{Rng as _, RngCore};

use crate::foundation::error::{BeatshadeError, BeatshadeResult};

/// Default jitter half-width in seconds.
pub const DEFAULT_JITTER_SEC: f64 = 0.05;

/// Upper bound on beats in one run.
pub const MAX_BEATS: usize = 1_000_000;

/// Lay out beats from `start_offset` until `duration` at a fixed tempo.
///
/// Each gap is `60 / bpm` plus a uniform sample from `[-jitter, jitter]`. With `jitter == 0`
/// nothing is drawn from `rng` and the output is fully deterministic.
///
/// The result is strictly increasing, lies in `[start_offset, duration)` and is empty exactly
/// when `start_offset >= duration`.
#[tracing::instrument(skip(rng))]
pub fn generate(
    duration: f64,
    bpm: f64,
    start_offset: f64,
    jitter: f64,
    rng: &mut dyn RngCore,
) -> BeatshadeResult<Vec<f64>> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(BeatshadeError::validation("duration must be finite and > 0"));
    }
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(BeatshadeError::validation("bpm must be finite and > 0"));
    }
    if !start_offset.is_finite() || start_offset < 0.0 {
        return Err(BeatshadeError::validation(
            "start offset must be finite and >= 0",
        ));
    }

    let interval = 60.0 / bpm;
    if !jitter.is_finite() || jitter < 0.0 || jitter >= interval {
        return Err(BeatshadeError::validation(format!(
            "jitter must be in [0, {interval}) for {bpm} bpm"
        )));
    }

    let expected = (duration - start_offset).max(0.0) / interval;
    if expected >= MAX_BEATS as f64 {
        return Err(BeatshadeError::validation(format!(
            "{bpm} bpm over {duration}s gives more than {MAX_BEATS} beats"
        )));
    }

    let mut beats = Vec::with_capacity(expected as usize + 1);
    let mut t = start_offset;
    while t < duration {
        if beats.len() == MAX_BEATS {
            return Err(BeatshadeError::validation(format!(
                "jittered tempo produced more than {MAX_BEATS} beats"
            )));
        }
        beats.push(t);
        let offset = if jitter > 0.0 {
            rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        let next = t + (interval + offset);
        if next <= t {
            return Err(BeatshadeError::validation(format!(
                "beat interval is too small to advance past {t}s"
            )));
        }
        t = next;
    }

    tracing::debug!(count = beats.len(), "generated beats");
    Ok(beats)
}

/// Where beat timestamps come from.
#[derive(Clone, Debug, PartialEq)]
pub enum BeatSource {
    /// Fixed tempo with jitter.
    FixedTempo {
        bpm: f64,
        start_offset: f64,
        jitter: f64,
    },
    /// Beat times produced ahead of time by an external analyzer, stored as JSON.
    ExternalAnalyzer { path: PathBuf },
}

impl BeatSource {
    pub fn fixed_tempo(bpm: f64, start_offset: f64) -> Self {
        Self::FixedTempo {
            bpm,
            start_offset,
            jitter: DEFAULT_JITTER_SEC,
        }
    }

    /// Produce beats covering `[0, duration)`.
    pub fn beats(&self, duration: f64, rng: &mut dyn RngCore) -> BeatshadeResult<Vec<f64>> {
        match self {
            Self::FixedTempo {
                bpm,
                start_offset,
                jitter,
            } => generate(duration, *bpm, *start_offset, *jitter, rng),
            Self::ExternalAnalyzer { path } => load_beats(path, duration),
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum BeatFile {
    Bare(Vec<f64>),
    Wrapped { beats: Vec<f64> },
}

/// Read analyzer output: either `[0.5, 0.97, ...]` or `{"beats": [...]}`.
///
/// Times are sorted, de-duplicated and clipped to `[0, duration)`. JSON has no NaN or
/// infinity, and out-of-range literals such as `1e400` fail to parse.
pub fn load_beats(path: &Path, duration: f64) -> BeatshadeResult<Vec<f64>> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(BeatshadeError::validation("duration must be finite and > 0"));
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("read beats file '{}'", path.display()))?;
    let parsed: BeatFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse beats file '{}'", path.display()))?;
    let raw = match parsed {
        BeatFile::Bare(v) => v,
        BeatFile::Wrapped { beats } => beats,
    };

    let mut beats: Vec<f64> = raw
        .into_iter()
        .filter(|t| *t >= 0.0 && *t < duration)
        .collect();
    beats.sort_by(f64::total_cmp);
    beats.dedup();

    tracing::debug!(count = beats.len(), path = %path.display(), "loaded analyzer beats");
    Ok(beats)
}
