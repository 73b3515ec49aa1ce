use crate::foundation::core::{Canvas, as_written};
use crate::foundation::error::{BeatshadeError, BeatshadeResult};
use crate::graph::strategy::ShadingStrategy;
use crate::graph::{Filter, FilterGraph, Label, Stage};

/// Output geometry and luma-key settings shared by every strategy.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Luma above which pixels are isolated for recoloring, in `[0, 1]`.
    pub key_threshold: f64,
    pub key_tolerance: f64,
    pub key_softness: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            width: 1728,
            height: 1920,
            fps: 60,
            key_threshold: 0.2,
            key_tolerance: 0.3,
            key_softness: 0.2,
        }
    }
}

impl Layout {
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    pub fn validate(&self) -> BeatshadeResult<()> {
        self.canvas().validate()?;
        if self.fps == 0 {
            return Err(BeatshadeError::validation("fps must be > 0"));
        }
        for (name, v) in [
            ("key_threshold", self.key_threshold),
            ("key_tolerance", self.key_tolerance),
            ("key_softness", self.key_softness),
        ] {
            if !(0.0..=1.0).contains(&as_written(v)) {
                return Err(BeatshadeError::validation(format!(
                    "{name} must be in [0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Name of the graph's video output.
pub const FINAL_LABEL: &str = "final";

/// Assemble the processing graph for `strategy`.
///
/// Layout: normalize `0:v` to the canvas, fan it out to one branch per strategy branch, key
/// each branch on luma, recolor the keyed foreground and overlay it on its own background,
/// then let the strategy join the branches. A single branch writes `[final]` directly.
#[tracing::instrument(skip_all, fields(strategy = strategy.name()))]
pub fn build(strategy: &dyn ShadingStrategy, layout: &Layout) -> BeatshadeResult<FilterGraph> {
    layout.validate()?;
    strategy.validate()?;

    let n = strategy.branch_count();
    if n == 0 {
        return Err(BeatshadeError::validation(
            "strategy must produce at least one branch",
        ));
    }

    let mut stages = Vec::with_capacity(2 + n * 4 + n.saturating_sub(1));
    let base = Label::new("base");
    stages.push(normalize_stage(layout, base.clone()));

    let branch_inputs = if n == 1 {
        vec![base]
    } else {
        let fanout: Vec<Label> = (0..n).map(|i| Label::new(format!("base{i}"))).collect();
        stages.push(Stage::new(
            [base],
            [Filter::new("split").positional(n)],
            fanout.clone(),
        ));
        fanout
    };

    let final_label = Label::new(FINAL_LABEL);
    let mut shaded = Vec::with_capacity(n);
    for (i, input) in branch_inputs.into_iter().enumerate() {
        let out = if n == 1 {
            final_label.clone()
        } else {
            Label::new(format!("shade{i}"))
        };
        let treatment = strategy.treatment(i);
        if treatment.is_empty() {
            return Err(BeatshadeError::validation(format!(
                "strategy '{}' returned no treatment for branch {i}",
                strategy.name()
            )));
        }
        stages.extend(branch_stages(i, input, layout, treatment, out.clone()));
        shaded.push(out);
    }

    if n > 1 {
        stages.extend(strategy.sequence(&shaded, &final_label)?);
    }

    let graph = FilterGraph::new(stages, final_label)?;
    tracing::debug!(stages = graph.stages().len(), "built filter graph");
    Ok(graph)
}

fn normalize_stage(layout: &Layout, out: Label) -> Stage {
    Stage::new(
        [Label::input_video(0)],
        [
            Filter::new("scale")
                .positional(layout.width)
                .positional(layout.height)
                .arg("force_original_aspect_ratio", "increase"),
            Filter::new("crop")
                .positional(layout.width)
                .positional(layout.height),
            Filter::new("fps").positional(layout.fps),
        ],
        [out],
    )
}

fn branch_stages(
    i: usize,
    input: Label,
    layout: &Layout,
    treatment: Vec<Filter>,
    out: Label,
) -> [Stage; 4] {
    let bg = Label::new(format!("bg{i}"));
    let fg = Label::new(format!("fg{i}"));
    let keyed = Label::new(format!("keyed{i}"));
    let colored = Label::new(format!("colored{i}"));

    [
        Stage::new(
            [input],
            [Filter::new("split").positional(2)],
            [bg.clone(), fg.clone()],
        ),
        Stage::new(
            [fg],
            [Filter::new("lumakey")
                .num("threshold", layout.key_threshold)
                .num("tolerance", layout.key_tolerance)
                .num("softness", layout.key_softness)],
            [keyed.clone()],
        ),
        Stage::new([keyed], treatment, [colored.clone()]),
        Stage::new(
            [bg, colored],
            [Filter::new("overlay").positional(0).positional(0)],
            [out],
        ),
    ]
}
