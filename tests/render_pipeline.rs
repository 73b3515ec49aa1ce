use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beatshade::{
    BeatshadeError, BeatshadeResult, EngineOutput, Fps, MediaEngine, RenderConfig, RenderMode,
    StreamInfo,
};
use rand::SeedableRng as _;
use rand::rngs::StdRng;

/// Records invocations and writes a fake output file on success.
struct FakeEngine {
    exit_code: i32,
    stderr: &'static str,
    probe_ok: bool,
    calls: RefCell<Vec<Vec<OsString>>>,
    timeouts: RefCell<Vec<Option<Duration>>>,
}

impl FakeEngine {
    fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            stderr: "",
            probe_ok: true,
            calls: RefCell::new(Vec::new()),
            timeouts: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl MediaEngine for FakeEngine {
    fn execute(
        &self,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> BeatshadeResult<EngineOutput> {
        self.calls.borrow_mut().push(args.to_vec());
        self.timeouts.borrow_mut().push(timeout);
        if self.exit_code == 0 {
            let out = PathBuf::from(args.last().unwrap());
            std::fs::write(&out, vec![0u8; 2 * 1024 * 1024]).unwrap();
        }
        Ok(EngineOutput {
            success: self.exit_code == 0,
            code: Some(self.exit_code),
            status: format!("exit status: {}", self.exit_code),
            stdout: String::new(),
            stderr: self.stderr.to_string(),
            timed_out: false,
        })
    }

    fn probe(&self, _path: &Path) -> BeatshadeResult<StreamInfo> {
        if self.probe_ok {
            Ok(StreamInfo {
                width: 1728,
                height: 1920,
                fps: Some(Fps::new(60, 1).unwrap()),
                bit_rate: Some(45_000_000),
            })
        } else {
            Err(BeatshadeError::probe("ffprobe exploded"))
        }
    }
}

fn workspace(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("render_pipeline").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config_with_inputs(dir: &Path) -> RenderConfig {
    let video = dir.join("bg.mp4");
    let audio = dir.join("track.mp3");
    std::fs::write(&video, b"video").unwrap();
    std::fs::write(&audio, b"audio").unwrap();
    RenderConfig {
        video,
        audio,
        output: dir.join("out").join("final.mp4"),
        seed: Some(3),
        ..RenderConfig::default()
    }
}

#[test]
fn missing_video_never_reaches_the_engine() {
    let dir = workspace("missing_video");
    let cfg = RenderConfig {
        video: dir.join("nonexistent.mp4"),
        audio: dir.join("nonexistent.mp3"),
        output: dir.join("final.mp4"),
        ..RenderConfig::default()
    };
    let engine = FakeEngine::new(0);

    let err = beatshade::render(&cfg, &engine, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(matches!(err, BeatshadeError::MissingInput { .. }), "{err}");
    assert_eq!(engine.calls(), 0);
    assert!(!cfg.output.exists());
}

#[test]
fn missing_audio_never_reaches_the_engine() {
    let dir = workspace("missing_audio");
    let mut cfg = config_with_inputs(&dir);
    cfg.audio = dir.join("gone.mp3");
    let engine = FakeEngine::new(0);

    let err = beatshade::render(&cfg, &engine, &mut StdRng::seed_from_u64(1)).unwrap_err();
    match err {
        BeatshadeError::MissingInput { kind, .. } => assert_eq!(kind, "audio"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.calls(), 0);
}

#[test]
fn successful_render_reports_probe_and_size() {
    let dir = workspace("success");
    let cfg = RenderConfig {
        timeout_secs: Some(600.0),
        ..config_with_inputs(&dir)
    };
    let engine = FakeEngine::new(0);

    let report = beatshade::render(&cfg, &engine, &mut StdRng::seed_from_u64(1)).unwrap();
    assert_eq!(engine.calls(), 1);
    assert_eq!(engine.timeouts.borrow()[0], Some(Duration::from_secs(600)));
    assert_eq!(report.output, cfg.output);
    assert!((report.size_mb - 2.0).abs() < 1e-9);
    assert_eq!(report.stream.as_ref().unwrap().width, 1728);
    assert_eq!(report.beats, report.timeline.len());
    assert!(report.beats > 30);

    let args: Vec<String> = engine.calls.borrow()[0]
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let fc = args.iter().position(|a| a == "-filter_complex").unwrap();
    assert!(args[fc + 1].contains("geq="));
    assert!(args.contains(&"[final]".to_string()));
    assert!(args.contains(&"1:a".to_string()));
}

#[test]
fn timeline_mode_sends_the_crossfade_program() {
    let dir = workspace("timeline_mode");
    let cfg = RenderConfig {
        mode: RenderMode::Timeline,
        ..config_with_inputs(&dir)
    };
    let engine = FakeEngine::new(0);

    beatshade::render(&cfg, &engine, &mut StdRng::seed_from_u64(1)).unwrap();
    let calls = engine.calls.borrow();
    let program = calls[0]
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .find(|a| a.contains("xfade"))
        .unwrap();
    assert_eq!(program.matches("xfade=").count(), 4);
    assert_eq!(program.matches("lumakey=").count(), 5);
}

#[test]
fn engine_failure_surfaces_stderr() {
    let dir = workspace("engine_failure");
    let cfg = config_with_inputs(&dir);
    let engine = FakeEngine {
        stderr: "[AVFilterGraph @ 0x0] No such filter: 'lumakey'",
        ..FakeEngine::new(1)
    };

    let err = beatshade::render(&cfg, &engine, &mut StdRng::seed_from_u64(1)).unwrap_err();
    match err {
        BeatshadeError::EngineExecution { stderr, .. } => {
            assert_eq!(stderr, "[AVFilterGraph @ 0x0] No such filter: 'lumakey'");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.calls(), 1);
}

#[test]
fn probe_failure_does_not_fail_the_run() {
    let dir = workspace("probe_failure");
    let cfg = config_with_inputs(&dir);
    let engine = FakeEngine {
        probe_ok: false,
        ..FakeEngine::new(0)
    };

    let report = beatshade::render(&cfg, &engine, &mut StdRng::seed_from_u64(1)).unwrap();
    assert!(report.stream.is_none());
    assert!(report.size_mb > 0.0);
}

#[test]
fn same_seed_gives_same_timeline() {
    let cfg = RenderConfig {
        seed: Some(11),
        ..RenderConfig::default()
    };
    let a = beatshade::plan(&cfg, &mut cfg.rng()).unwrap();
    let b = beatshade::plan(&cfg, &mut cfg.rng()).unwrap();
    assert_eq!(a.timeline, b.timeline);
    assert_eq!(a.program.to_string(), b.program.to_string());
}
