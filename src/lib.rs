//! beatshade renders a short color-graded clip from a looping background video and an audio
//! track.
//!
//! - Lay out beat timestamps ([`beats`]) and assign palette shades to them ([`timeline`])
//! - Build an ffmpeg filter graph for a shading strategy ([`graph`])
//! - Run `ffmpeg`, then read the result back with `ffprobe` ([`engine`], [`render`])
#![forbid(unsafe_code)]

mod foundation;

pub mod beats;
pub mod config;
pub mod engine;
pub mod graph;
pub mod palette;
pub mod render;
pub mod timeline;

pub use crate::foundation::core::{Canvas, Fps, as_written, format_number};
pub use crate::foundation::error::{BeatshadeError, BeatshadeResult};

pub use crate::beats::{BeatSource, generate};
pub use crate::config::{RenderConfig, RenderMode};
pub use crate::engine::{
    EncoderSettings, EngineOutput, FfmpegEngine, MediaEngine, RenderJob, StreamInfo,
};
pub use crate::graph::builder::{Layout, build};
pub use crate::graph::strategy::{
    ChannelMix, PaletteSequence, Pulse, PulseTreatment, ShadingStrategy,
};
pub use crate::graph::{Filter, FilterGraph, Label, Stage};
pub use crate::palette::{ColorShade, Palette};
pub use crate::render::{RenderPlan, RenderReport, ensure_inputs, plan, render};
pub use crate::timeline::{Timeline, TimelineEntry, assign};
