use crate::foundation::error::{BeatshadeError, BeatshadeResult};

/// One color treatment.
///
/// `brightness` is a multiplier around 1.0; the `eq` filter receives `brightness - 1.0`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColorShade {
    pub hue: f64,
    pub saturation: f64,
    pub brightness: f64,
    pub contrast: f64,
}

impl ColorShade {
    pub const fn new(hue: f64, saturation: f64, brightness: f64, contrast: f64) -> Self {
        Self {
            hue,
            saturation,
            brightness,
            contrast,
        }
    }

    pub fn brightness_offset(&self) -> f64 {
        self.brightness - 1.0
    }

    pub fn validate(&self) -> BeatshadeResult<()> {
        let all_finite = [self.hue, self.saturation, self.brightness, self.contrast]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(BeatshadeError::validation("shade parameters must be finite"));
        }
        if self.saturation < 0.0 {
            return Err(BeatshadeError::validation("shade saturation must be >= 0"));
        }
        Ok(())
    }
}

pub const BRIGHT_RED: ColorShade = ColorShade::new(0.0, 3.0, 1.3, 1.3);
pub const DEEP_RED: ColorShade = ColorShade::new(0.0, 4.0, 0.9, 1.5);
pub const VIVID_RED: ColorShade = ColorShade::new(0.0, 3.5, 1.5, 1.4);
pub const DARK_RED: ColorShade = ColorShade::new(0.0, 2.5, 0.8, 1.6);
pub const PURE_RED: ColorShade = ColorShade::new(0.0, 3.2, 1.2, 1.35);

/// Ordered, non-empty list of shades. Read-only once built.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<ColorShade>", into = "Vec<ColorShade>")]
pub struct Palette {
    shades: Vec<ColorShade>,
}

impl Palette {
    pub fn new(shades: Vec<ColorShade>) -> BeatshadeResult<Self> {
        if shades.is_empty() {
            return Err(BeatshadeError::validation("palette must not be empty"));
        }
        for shade in &shades {
            shade.validate()?;
        }
        Ok(Self { shades })
    }

    /// The five red shades used by default.
    pub fn red_silk() -> Self {
        Self {
            shades: vec![BRIGHT_RED, DEEP_RED, VIVID_RED, DARK_RED, PURE_RED],
        }
    }

    pub fn len(&self) -> usize {
        self.shades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shades.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ColorShade> {
        self.shades.get(idx)
    }

    pub fn shades(&self) -> &[ColorShade] {
        &self.shades
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::red_silk()
    }
}

impl TryFrom<Vec<ColorShade>> for Palette {
    type Error = BeatshadeError;

    fn try_from(shades: Vec<ColorShade>) -> Result<Self, Self::Error> {
        Self::new(shades)
    }
}

impl From<Palette> for Vec<ColorShade> {
    fn from(p: Palette) -> Self {
        p.shades
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_palette_has_five_reds() {
        let p = Palette::default();
        assert_eq!(p.len(), 5);
        assert_eq!(p.get(1), Some(&DEEP_RED));
        assert!(p.shades().iter().all(|s| s.hue == 0.0));
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert!(Palette::new(vec![]).is_err());
        assert!(serde_json::from_str::<Palette>("[]").is_err());
    }

    #[test]
    fn non_finite_shade_is_rejected() {
        let bad = ColorShade::new(0.0, f64::INFINITY, 1.0, 1.0);
        assert!(Palette::new(vec![bad]).is_err());
    }

    #[test]
    fn brightness_offset_is_relative_to_one() {
        assert!((BRIGHT_RED.brightness_offset() - 0.3).abs() < 1e-12);
        assert!((DARK_RED.brightness_offset() + 0.2).abs() < 1e-12);
    }

    #[test]
    fn palette_reads_from_json_list() {
        let p: Palette = serde_json::from_str(
            r#"[{"hue": 10.0, "saturation": 2.0, "brightness": 1.0, "contrast": 1.2}]"#,
        )
        .unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.get(0).unwrap().hue, 10.0);
    }
}
