use crate::foundation::error::{BeatshadeError, BeatshadeResult};

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> BeatshadeResult<Self> {
        if den == 0 {
            return Err(BeatshadeError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(BeatshadeError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Parse an ffmpeg-style rate such as `60/1` or `30000/1001`.
    pub fn parse_ratio(s: &str) -> Option<Self> {
        let (num, den) = s.trim().split_once('/')?;
        let num = num.parse::<u32>().ok()?;
        let den = den.parse::<u32>().ok()?;
        Self::new(num, den).ok()
    }
}

impl std::fmt::Display for Fps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    pub fn validate(self) -> BeatshadeResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BeatshadeError::validation("canvas width/height must be > 0"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(BeatshadeError::validation(
                "canvas width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(())
    }
}

/// Decimal places kept when a number is written into a filter argument.
pub const FILTER_DECIMALS: usize = 9;

/// Format a parameter the way it should appear in filter arguments.
///
/// Rounds to [`FILTER_DECIMALS`] and strips trailing zeros, so `1.3 - 1.0` prints as `0.3`.
pub fn format_number(v: f64) -> String {
    let s = format!("{v:.prec$}", prec = FILTER_DECIMALS);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// The value ffmpeg will read back once `v` has gone through [`format_number`].
///
/// Range checks on anything written into the graph use this, not the raw value.
pub fn as_written(v: f64) -> f64 {
    format_number(v).parse().unwrap_or(v)
}
