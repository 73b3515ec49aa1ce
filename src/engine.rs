//! The external media engine: `ffmpeg` for rendering, `ffprobe` for reading results back.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::foundation::core::Fps;
use crate::foundation::error::{BeatshadeError, BeatshadeResult};
use crate::graph::FilterGraph;

/// Encoder parameters passed after the stream maps.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub pix_fmt: String,
    pub profile: String,
    pub level: String,
    pub bitrate: String,
    pub maxrate: String,
    pub bufsize: String,
    pub b_frames: u32,
    pub gop: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "slow".to_string(),
            crf: 15,
            pix_fmt: "yuv420p".to_string(),
            profile: "high".to_string(),
            level: "5.1".to_string(),
            bitrate: "45M".to_string(),
            maxrate: "55M".to_string(),
            bufsize: "110M".to_string(),
            b_frames: 3,
            gop: 120,
            audio_codec: "aac".to_string(),
            audio_bitrate: "320k".to_string(),
            audio_sample_rate: 48_000,
        }
    }
}

impl EncoderSettings {
    fn push_args(&self, args: &mut Vec<OsString>) {
        let pairs: [(&str, String); 14] = [
            ("-c:v", self.video_codec.clone()),
            ("-preset", self.preset.clone()),
            ("-crf", self.crf.to_string()),
            ("-pix_fmt", self.pix_fmt.clone()),
            ("-profile:v", self.profile.clone()),
            ("-level", self.level.clone()),
            ("-b:v", self.bitrate.clone()),
            ("-maxrate", self.maxrate.clone()),
            ("-bufsize", self.bufsize.clone()),
            ("-bf", self.b_frames.to_string()),
            ("-g", self.gop.to_string()),
            ("-c:a", self.audio_codec.clone()),
            ("-b:a", self.audio_bitrate.clone()),
            ("-ar", self.audio_sample_rate.to_string()),
        ];
        for (flag, value) in pairs {
            args.push(flag.into());
            args.push(value.into());
        }
    }
}

/// Everything one `ffmpeg` render invocation needs.
#[derive(Clone, Debug)]
pub struct RenderJob<'a> {
    pub video: &'a Path,
    pub audio: &'a Path,
    pub output: &'a Path,
    pub program: &'a FilterGraph,
    pub encoder: &'a EncoderSettings,
    /// Hard cap on the output length, in seconds.
    pub duration: f64,
}

impl RenderJob<'_> {
    /// Command line (without the program name) for this job.
    ///
    /// The video input loops forever; `-t` bounds the output. Any existing output is
    /// overwritten.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(48);
        for a in ["-y", "-stream_loop", "-1", "-i"] {
            args.push(a.into());
        }
        args.push(self.video.into());
        args.push("-i".into());
        args.push(self.audio.into());
        args.push("-filter_complex".into());
        args.push(self.program.to_string().into());
        args.push("-map".into());
        args.push(self.program.output().to_string().into());
        args.push("-map".into());
        args.push("1:a".into());
        self.encoder.push_args(&mut args);
        args.push("-t".into());
        args.push(self.duration.to_string().into());
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(self.output.into());
        args
    }
}

/// Captured result of one engine process.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Human-readable exit status.
    pub status: String,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Stream properties read back from a rendered file.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<Fps>,
    pub bit_rate: Option<u64>,
}

impl std::fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if let Some(fps) = self.fps {
            write!(f, " @ {fps} fps")?;
        }
        if let Some(br) = self.bit_rate {
            write!(f, ", {:.1} Mb/s", br as f64 / 1_000_000.0)?;
        }
        Ok(())
    }
}

/// Seam between orchestration and the external tools.
pub trait MediaEngine {
    /// Run a render command, capturing its output on every path.
    ///
    /// `Err` only when the process could not be started or waited on; a nonzero exit comes
    /// back as `Ok` with `success == false`.
    fn execute(
        &self,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> BeatshadeResult<EngineOutput>;

    /// Read the first video stream's properties from `path`.
    fn probe(&self, path: &Path) -> BeatshadeResult<StreamInfo>;
}

/// System `ffmpeg`/`ffprobe` binaries.
#[derive(Clone, Debug)]
pub struct FfmpegEngine {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegEngine {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Return `true` when the configured `ffmpeg` answers `-version`.
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl MediaEngine for FfmpegEngine {
    fn execute(
        &self,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> BeatshadeResult<EngineOutput> {
        run_captured(&self.ffmpeg, args, timeout)
    }

    fn probe(&self, path: &Path) -> BeatshadeResult<StreamInfo> {
        let out = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,bit_rate",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| BeatshadeError::probe(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(BeatshadeError::probe(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        parse_probe_json(&out.stdout)
    }
}

/// Parse `ffprobe -of json -show_entries stream=...` output.
pub fn parse_probe_json(bytes: &[u8]) -> BeatshadeResult<StreamInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        bit_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| BeatshadeError::probe(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| BeatshadeError::probe("no video stream found"))?;

    Ok(StreamInfo {
        width: stream
            .width
            .ok_or_else(|| BeatshadeError::probe("missing video width from ffprobe"))?,
        height: stream
            .height
            .ok_or_else(|| BeatshadeError::probe("missing video height from ffprobe"))?,
        fps: stream.r_frame_rate.as_deref().and_then(Fps::parse_ratio),
        bit_rate: stream.bit_rate.and_then(|s| s.trim().parse::<u64>().ok()),
    })
}

type Drain = std::thread::JoinHandle<std::io::Result<Vec<u8>>>;

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Drain {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        pipe.read_to_end(&mut bytes)?;
        Ok(bytes)
    })
}

fn join_drain(handle: Option<Drain>, what: &str) -> BeatshadeResult<String> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| anyhow::anyhow!("{what} drain thread panicked"))?
        .map_err(|e| anyhow::anyhow!("{what} read failed: {e}"))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawn `program`, drain stdout/stderr on helper threads and wait, killing the child if
/// `timeout` elapses first.
pub fn run_captured(
    program: &Path,
    args: &[OsString],
    timeout: Option<Duration>,
) -> BeatshadeResult<EngineOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BeatshadeError::launch(program.display().to_string(), e.to_string()))?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let (status, timed_out) = wait_with_timeout(&mut child, timeout)
        .map_err(|e| anyhow::anyhow!("failed to wait for '{}': {e}", program.display()))?;

    let stdout = join_drain(stdout, "stdout")?;
    let stderr = join_drain(stderr, "stderr")?;

    let status_text = if timed_out {
        format!(
            "timed out after {:.1}s",
            timeout.unwrap_or_default().as_secs_f64()
        )
    } else {
        status.to_string()
    };

    Ok(EngineOutput {
        success: status.success() && !timed_out,
        code: status.code(),
        status: status_text,
        stdout,
        stderr,
        timed_out,
    })
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<(std::process::ExitStatus, bool)> {
    let Some(limit) = timeout else {
        return Ok((child.wait()?, false));
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if started.elapsed() >= limit {
            // The process may exit between try_wait and kill.
            let _ = child.kill();
            return Ok((child.wait()?, true));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::{Layout, build};
    use crate::graph::strategy::PulseTreatment;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn render_args_follow_engine_contract() {
        let program = build(&PulseTreatment::default(), &Layout::default()).unwrap();
        let encoder = EncoderSettings::default();
        let job = RenderJob {
            video: Path::new("silk_background.mp4"),
            audio: Path::new("audio2.mp3"),
            output: Path::new("out/red_silk_final.mp4"),
            program: &program,
            encoder: &encoder,
            duration: 18.19,
        };
        let args = as_strings(&job.args());

        assert_eq!(
            &args[..8],
            &[
                "-y",
                "-stream_loop",
                "-1",
                "-i",
                "silk_background.mp4",
                "-i",
                "audio2.mp3",
                "-filter_complex"
            ]
        );
        assert_eq!(args[8], program.to_string());
        assert_eq!(&args[9..13], &["-map", "[final]", "-map", "1:a"]);

        let flag = |name: &str| {
            let i = args.iter().position(|a| a == name).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(flag("-c:v"), "libx264");
        assert_eq!(flag("-crf"), "15");
        assert_eq!(flag("-maxrate"), "55M");
        assert_eq!(flag("-bufsize"), "110M");
        assert_eq!(flag("-c:a"), "aac");
        assert_eq!(flag("-b:a"), "320k");
        assert_eq!(flag("-ar"), "48000");
        assert_eq!(flag("-t"), "18.19");
        assert_eq!(flag("-movflags"), "+faststart");
        assert_eq!(args.last().unwrap(), "out/red_silk_final.mp4");
    }

    #[test]
    fn probe_json_is_parsed() {
        let json = br#"{
            "programs": [],
            "streams": [
                { "width": 1728, "height": 1920, "r_frame_rate": "60/1", "bit_rate": "44877312" }
            ]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.width, 1728);
        assert_eq!(info.height, 1920);
        assert_eq!(info.fps, Some(Fps { num: 60, den: 1 }));
        assert_eq!(info.bit_rate, Some(44_877_312));
        assert_eq!(info.to_string(), "1728x1920 @ 60 fps, 44.9 Mb/s");
    }

    #[test]
    fn probe_json_tolerates_missing_bitrate() {
        let json = br#"{"streams": [{ "width": 64, "height": 64, "r_frame_rate": "0/0" }]}"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.fps, None);
        assert_eq!(info.bit_rate, None);
        assert_eq!(info.to_string(), "64x64");
    }

    #[test]
    fn probe_json_without_streams_is_an_error() {
        assert!(parse_probe_json(br#"{"streams": []}"#).is_err());
        assert!(parse_probe_json(b"not json").is_err());
    }

    #[test]
    fn missing_binary_is_a_launch_failure() {
        let err = run_captured(
            Path::new("beatshade-definitely-not-a-real-binary"),
            &[],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BeatshadeError::Launch { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_captured() {
        let args: Vec<OsString> = vec!["-c".into(), "echo oops >&2; exit 3".into()];
        let out = run_captured(Path::new("sh"), &args, None).unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child() {
        let args: Vec<OsString> = vec!["-c".into(), "exec sleep 5".into()];
        let out = run_captured(Path::new("sh"), &args, Some(Duration::from_millis(100))).unwrap();
        assert!(out.timed_out);
        assert!(!out.success);
        assert!(out.status.starts_with("timed out"));
    }
}
