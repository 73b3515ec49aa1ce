//! Filter graph model.
//!
//! A [`FilterGraph`] is a list of [`Stage`]s. Each stage reads labelled streams, runs a chain of
//! [`Filter`]s and writes labelled streams. The graph is kept as records and only turned into
//! ffmpeg `-filter_complex` text by its `Display` impl.

use std::collections::BTreeSet;
use std::fmt;

use crate::foundation::core::format_number;
use crate::foundation::error::{BeatshadeError, BeatshadeResult};

pub mod builder;
pub mod strategy;

/// A named stream between stages, or an input stream specifier such as `0:v`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Video stream of the `index`-th `-i` input.
    pub fn input_video(index: usize) -> Self {
        Self(format!("{index}:v"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stream specifiers address command inputs rather than other stages.
    pub fn is_input_stream(&self) -> bool {
        self.0.contains(':')
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterArg {
    Positional(String),
    Named { key: String, value: String },
}

/// One filter invocation, e.g. `lumakey=threshold=0.2:tolerance=0.3`.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<FilterArg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn positional(mut self, value: impl ToString) -> Self {
        self.args.push(FilterArg::Positional(value.to_string()));
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push(FilterArg::Named {
            key: key.into(),
            value: value.to_string(),
        });
        self
    }

    /// Named numeric argument, formatted compactly.
    pub fn num(self, key: impl Into<String>, value: f64) -> Self {
        self.arg(key, format_number(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[FilterArg] {
        &self.args
    }

    /// Value of a named argument.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            FilterArg::Named { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    fn validate(&self) -> BeatshadeResult<()> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(BeatshadeError::validation(format!(
                "invalid filter name '{}'",
                self.name
            )));
        }
        for arg in &self.args {
            let value = match arg {
                FilterArg::Positional(v) => v,
                FilterArg::Named { key, value } => {
                    if key.is_empty() || key.contains(['=', ':', ',', ';', '[', ']', '\'']) {
                        return Err(BeatshadeError::validation(format!(
                            "invalid argument key '{key}' for filter '{}'",
                            self.name
                        )));
                    }
                    value
                }
            };
            if value.contains('\'') {
                return Err(BeatshadeError::validation(format!(
                    "argument of filter '{}' must not contain a single quote",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| matches!(c, ',' | ';' | ':' | '[' | ']' | '=' | '\\') || c.is_whitespace());
    if needs_quotes {
        write!(f, "'{value}'")
    } else {
        f.write_str(value)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match arg {
                FilterArg::Positional(v) => write_value(f, v)?,
                FilterArg::Named { key, value } => {
                    write!(f, "{key}=")?;
                    write_value(f, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Labelled inputs, a filter chain, labelled outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub inputs: Vec<Label>,
    pub chain: Vec<Filter>,
    pub outputs: Vec<Label>,
}

impl Stage {
    pub fn new(
        inputs: impl IntoIterator<Item = Label>,
        chain: impl IntoIterator<Item = Filter>,
        outputs: impl IntoIterator<Item = Label>,
    ) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            chain: chain.into_iter().collect(),
            outputs: outputs.into_iter().collect(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for l in &self.inputs {
            write!(f, "{l}")?;
        }
        for (i, filter) in self.chain.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for l in &self.outputs {
            write!(f, "{l}")?;
        }
        Ok(())
    }
}

/// A validated processing graph ending in one video output label.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterGraph {
    stages: Vec<Stage>,
    output: Label,
}

impl FilterGraph {
    /// Check wiring and wrap `stages`.
    ///
    /// Every stage label must be produced before it is read and read exactly once, except
    /// `output`, which must be produced and left unread.
    pub fn new(stages: Vec<Stage>, output: Label) -> BeatshadeResult<Self> {
        let mut produced = BTreeSet::new();
        let mut open = BTreeSet::new();

        for stage in &stages {
            if stage.chain.is_empty() {
                return Err(BeatshadeError::validation("stage has an empty filter chain"));
            }
            if stage.inputs.is_empty() || stage.outputs.is_empty() {
                return Err(BeatshadeError::validation(
                    "stage needs at least one input and one output label",
                ));
            }
            for filter in &stage.chain {
                filter.validate()?;
            }
            for input in &stage.inputs {
                if input.is_input_stream() {
                    continue;
                }
                if !open.remove(input) {
                    return Err(BeatshadeError::validation(format!(
                        "label {input} is read before it is produced or read twice"
                    )));
                }
            }
            for out in &stage.outputs {
                if out.is_input_stream() || !produced.insert(out.clone()) {
                    return Err(BeatshadeError::validation(format!(
                        "label {out} is produced more than once or is not a stage label"
                    )));
                }
                open.insert(out.clone());
            }
        }

        if !open.remove(&output) {
            return Err(BeatshadeError::validation(format!(
                "output label {output} is not produced by the graph"
            )));
        }
        if let Some(dangling) = open.first() {
            return Err(BeatshadeError::validation(format!(
                "label {dangling} is produced but never read"
            )));
        }

        Ok(Self { stages, output })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn output(&self) -> &Label {
        &self.output
    }

    /// All filters in graph order.
    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.stages.iter().flat_map(|s| s.chain.iter())
    }

    /// Count filters named `name`.
    pub fn count_filters(&self, name: &str) -> usize {
        self.filters().filter(|f| f.name() == name).count()
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_renders_positional_then_named() {
        let f = Filter::new("scale")
            .positional(1728)
            .positional(1920)
            .arg("force_original_aspect_ratio", "increase");
        assert_eq!(
            f.to_string(),
            "scale=1728:1920:force_original_aspect_ratio=increase"
        );
        assert_eq!(Filter::new("null").to_string(), "null");
    }

    #[test]
    fn values_with_metacharacters_are_quoted() {
        let f = Filter::new("geq")
            .arg("r", "r(X,Y)*(0.9+0.1*sin(T*3.14))")
            .arg("g", "g(X,Y)*0.4");
        assert_eq!(
            f.to_string(),
            "geq=r='r(X,Y)*(0.9+0.1*sin(T*3.14))':g='g(X,Y)*0.4'"
        );
    }

    #[test]
    fn stage_renders_labels_around_chain() {
        let s = Stage::new(
            [Label::new("bg0"), Label::new("colored0")],
            [Filter::new("overlay").positional(0).positional(0)],
            [Label::new("shade0")],
        );
        assert_eq!(s.to_string(), "[bg0][colored0]overlay=0:0[shade0]");
    }

    #[test]
    fn graph_rejects_unknown_or_reused_labels() {
        let read_unknown = vec![Stage::new(
            [Label::new("nowhere")],
            [Filter::new("null")],
            [Label::new("final")],
        )];
        assert!(FilterGraph::new(read_unknown, Label::new("final")).is_err());

        let read_twice = vec![
            Stage::new([Label::input_video(0)], [Filter::new("null")], [Label::new("a")]),
            Stage::new([Label::new("a")], [Filter::new("null")], [Label::new("b")]),
            Stage::new([Label::new("a")], [Filter::new("null")], [Label::new("final")]),
        ];
        assert!(FilterGraph::new(read_twice, Label::new("final")).is_err());
    }

    #[test]
    fn graph_rejects_dangling_outputs() {
        let stages = vec![Stage::new(
            [Label::input_video(0)],
            [Filter::new("split").positional(2)],
            [Label::new("final"), Label::new("spare")],
        )];
        assert!(FilterGraph::new(stages, Label::new("final")).is_err());
    }

    #[test]
    fn graph_rejects_single_quotes_in_values() {
        let stages = vec![Stage::new(
            [Label::input_video(0)],
            [Filter::new("drawtext").arg("text", "it's")],
            [Label::new("final")],
        )];
        assert!(FilterGraph::new(stages, Label::new("final")).is_err());
    }

    #[test]
    fn graph_joins_stages_with_semicolons() {
        let stages = vec![
            Stage::new([Label::input_video(0)], [Filter::new("null")], [Label::new("a")]),
            Stage::new([Label::new("a")], [Filter::new("null")], [Label::new("final")]),
        ];
        let g = FilterGraph::new(stages, Label::new("final")).unwrap();
        assert_eq!(g.to_string(), "[0:v]null[a];[a]null[final]");
        assert_eq!(g.count_filters("null"), 2);
        assert_eq!(g.output().as_str(), "final");
    }
}
