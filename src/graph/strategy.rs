//! Color treatments applied to the keyed foreground.
//!
//! The builder owns normalization, masking and compositing; a [`ShadingStrategy`] decides how
//! many branches exist, which filters recolor each branch and how branches are joined.

use crate::foundation::core::{as_written, format_number};
use crate::foundation::error::{BeatshadeError, BeatshadeResult};
use crate::graph::{Filter, Label, Stage};
use crate::palette::{ColorShade, Palette};

/// Cross-fade length between palette segments, in seconds.
pub const DEFAULT_TRANSITION_SEC: f64 = 0.3;

pub trait ShadingStrategy {
    fn name(&self) -> &'static str;

    fn branch_count(&self) -> usize;

    /// Recoloring chain for one branch, applied after the luma key.
    fn treatment(&self, branch: usize) -> Vec<Filter>;

    /// Join the per-branch outputs into `out`. Only called with two or more branches.
    fn sequence(&self, _shaded: &[Label], _out: &Label) -> BeatshadeResult<Vec<Stage>> {
        Err(BeatshadeError::validation(format!(
            "strategy '{}' cannot join multiple branches",
            self.name()
        )))
    }

    fn validate(&self) -> BeatshadeResult<()> {
        Ok(())
    }
}

/// Per-channel gains for `colorchannelmixer`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChannelMix {
    pub rr: f64,
    pub gg: f64,
    pub bb: f64,
}

impl ChannelMix {
    /// Red amplified, green and blue attenuated.
    pub const RED_BIAS: Self = Self {
        rr: 1.5,
        gg: 0.4,
        bb: 0.2,
    };

    pub const STRONG_RED: Self = Self {
        rr: 1.6,
        gg: 0.3,
        bb: 0.2,
    };

    fn filter(&self) -> Filter {
        Filter::new("colorchannelmixer")
            .num("rr", self.rr)
            .num("gg", self.gg)
            .num("bb", self.bb)
    }

    fn validate(&self) -> BeatshadeResult<()> {
        if ![self.rr, self.gg, self.bb].iter().all(|v| v.is_finite()) {
            return Err(BeatshadeError::validation("channel gains must be finite"));
        }
        Ok(())
    }
}

/// `hue`, `eq` and `colorchannelmixer` for one shade.
pub fn shade_filters(shade: &ColorShade, hue_saturation: f64, mix: ChannelMix) -> Vec<Filter> {
    vec![
        Filter::new("hue")
            .num("h", shade.hue)
            .num("s", hue_saturation),
        Filter::new("eq")
            .num("saturation", shade.saturation)
            .num("brightness", shade.brightness_offset())
            .num("contrast", shade.contrast),
        mix.filter(),
    ]
}

/// One branch per palette entry, cross-faded at evenly spaced offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct PaletteSequence {
    pub palette: Palette,
    /// Total clip length the segments are spread over.
    pub duration: f64,
    pub transition: f64,
    pub mix: ChannelMix,
}

impl PaletteSequence {
    pub fn new(palette: Palette, duration: f64) -> Self {
        Self {
            palette,
            duration,
            transition: DEFAULT_TRANSITION_SEC,
            mix: ChannelMix::RED_BIAS,
        }
    }

    /// Cross-fade start times: `k * duration / n` for `k = 1..n`.
    pub fn offsets(&self) -> Vec<f64> {
        let n = self.palette.len();
        let segment = self.duration / n as f64;
        (1..n).map(|k| k as f64 * segment).collect()
    }
}

impl ShadingStrategy for PaletteSequence {
    fn name(&self) -> &'static str {
        "timeline"
    }

    fn branch_count(&self) -> usize {
        self.palette.len()
    }

    fn treatment(&self, branch: usize) -> Vec<Filter> {
        match self.palette.get(branch) {
            Some(shade) => shade_filters(shade, shade.saturation, self.mix),
            None => Vec::new(),
        }
    }

    fn sequence(&self, shaded: &[Label], out: &Label) -> BeatshadeResult<Vec<Stage>> {
        let offsets = self.offsets();
        if shaded.len() != offsets.len() + 1 {
            return Err(BeatshadeError::validation(format!(
                "expected {} shaded branches, got {}",
                offsets.len() + 1,
                shaded.len()
            )));
        }

        let mut stages = Vec::with_capacity(offsets.len());
        let mut acc = shaded[0].clone();
        for (k, offset) in offsets.iter().enumerate() {
            let next = if k + 1 == offsets.len() {
                out.clone()
            } else {
                Label::new(format!("xf{}", k + 1))
            };
            stages.push(Stage::new(
                [acc, shaded[k + 1].clone()],
                [Filter::new("xfade")
                    .arg("transition", "fade")
                    .num("duration", self.transition)
                    .num("offset", *offset)],
                [next.clone()],
            ));
            acc = next;
        }
        Ok(stages)
    }

    fn validate(&self) -> BeatshadeResult<()> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(BeatshadeError::validation(
                "sequence duration must be finite and > 0",
            ));
        }
        let segment = self.duration / self.palette.len() as f64;
        let transition = as_written(self.transition);
        if !transition.is_finite() || transition <= 0.0 || transition >= segment {
            return Err(BeatshadeError::validation(format!(
                "transition must be in (0, {segment}) for {} shades over {}s",
                self.palette.len(),
                self.duration
            )));
        }
        self.mix.validate()
    }
}

/// Sinusoidal red-channel pulse with fixed green/blue attenuation, as a `geq` filter.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Pulse {
    pub base: f64,
    pub depth: f64,
    /// Angular rate of the sine, in radians per second.
    pub rate: f64,
    pub green: f64,
    pub blue: f64,
}

impl Default for Pulse {
    fn default() -> Self {
        Self {
            base: 0.9,
            depth: 0.1,
            rate: 3.14,
            green: 0.4,
            blue: 0.3,
        }
    }
}

impl Pulse {
    /// Red gain at `t` seconds.
    pub fn red_gain(&self, t: f64) -> f64 {
        self.base + self.depth * (t * self.rate).sin()
    }

    fn filter(&self) -> Filter {
        Filter::new("geq")
            .arg(
                "r",
                format!(
                    "r(X,Y)*({}+{}*sin(T*{}))",
                    format_number(self.base),
                    format_number(self.depth),
                    format_number(self.rate)
                ),
            )
            .arg("g", format!("g(X,Y)*{}", format_number(self.green)))
            .arg("b", format!("b(X,Y)*{}", format_number(self.blue)))
    }
}

/// Single strong-red treatment modulated over time. No discrete shade switching.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PulseTreatment {
    pub shade: ColorShade,
    /// Saturation handed to the `hue` filter, separate from the `eq` saturation.
    pub hue_saturation: f64,
    pub mix: ChannelMix,
    pub pulse: Pulse,
}

impl Default for PulseTreatment {
    fn default() -> Self {
        Self {
            shade: ColorShade::new(0.0, 3.5, 1.2, 1.5),
            hue_saturation: 5.0,
            mix: ChannelMix::STRONG_RED,
            pulse: Pulse::default(),
        }
    }
}

impl ShadingStrategy for PulseTreatment {
    fn name(&self) -> &'static str {
        "pulse"
    }

    fn branch_count(&self) -> usize {
        1
    }

    fn treatment(&self, _branch: usize) -> Vec<Filter> {
        let mut chain = shade_filters(&self.shade, self.hue_saturation, self.mix);
        chain.push(self.pulse.filter());
        chain
    }

    fn validate(&self) -> BeatshadeResult<()> {
        self.shade.validate()?;
        self.mix.validate()?;
        let p = self.pulse;
        let params = [self.hue_saturation, p.base, p.depth, p.rate, p.green, p.blue];
        if !params.iter().all(|v| v.is_finite()) {
            return Err(BeatshadeError::validation("pulse parameters must be finite"));
        }
        Ok(())
    }
}
