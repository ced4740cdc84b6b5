//! Composition of the captured tracks into the final recording.
//!
//! The two video captures are scaled into the left and right halves of the
//! canvas and the two audio captures are mixed. A missing capture is replaced
//! by a black half or by silence for the length of the recording. The work is
//! done by an `ffmpeg` child process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::capture::{CaptureFormat, CapturedTrack};
use super::{RecorderError, RecorderResult};

/// Output stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
}

/// Everything one composition needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeJob {
    pub left_video: Option<CapturedTrack>,
    pub right_video: Option<CapturedTrack>,
    pub left_audio: Option<CapturedTrack>,
    pub right_audio: Option<CapturedTrack>,
    pub duration: Duration,
    pub format: StreamFormat,
    pub output: PathBuf,
}

/// Turns a set of captures into one recording file.
#[async_trait]
pub trait MediaComposer: Send + Sync {
    async fn compose(&self, job: &ComposeJob) -> RecorderResult<()>;
}

/// [`MediaComposer`] backed by the `ffmpeg` command line tool.
#[derive(Debug, Clone)]
pub struct FfmpegComposer {
    binary: PathBuf,
}

impl FfmpegComposer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaComposer for FfmpegComposer {
    async fn compose(&self, job: &ComposeJob) -> RecorderResult<()> {
        let args = ffmpeg_args(job);
        info!(output = %job.output.display(), "Composing recording with ffmpeg");
        debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                RecorderError::Encoder(format!(
                    "Failed to start {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(RecorderError::Encoder(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }
        Ok(())
    }
}

fn push_input(args: &mut Vec<String>, track: &CapturedTrack, fps: u32) {
    if track.format == CaptureFormat::AnnexB {
        args.extend(["-framerate".to_string(), fps.to_string()]);
    }
    args.extend(["-i".to_string(), track.path.to_string_lossy().to_string()]);
}

fn push_generated(args: &mut Vec<String>, source: String) {
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        source,
    ]);
}

/// Command line for one composition. Inputs are, in order, left video,
/// right video, left audio, right audio.
pub fn ffmpeg_args(job: &ComposeJob) -> Vec<String> {
    let format = job.format;
    let half = (format.width / 2).max(1);
    let seconds = format!("{:.3}", job.duration.as_secs_f64().max(0.001));

    let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];

    for video in [&job.left_video, &job.right_video] {
        match video {
            Some(track) => push_input(&mut args, track, format.fps),
            None => push_generated(
                &mut args,
                format!(
                    "color=c=black:s={half}x{}:r={}:d={seconds}",
                    format.height, format.fps
                ),
            ),
        }
    }
    for audio in [&job.left_audio, &job.right_audio] {
        match audio {
            Some(track) => push_input(&mut args, track, format.fps),
            None => push_generated(
                &mut args,
                format!(
                    "anullsrc=r={}:cl=stereo:d={seconds}",
                    format.sample_rate
                ),
            ),
        }
    }

    let fit = |input: usize, label: &str| {
        format!(
            "[{input}:v]scale={half}:{h}:force_original_aspect_ratio=decrease,\
             pad={half}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps={fps}[{label}]",
            h = format.height,
            fps = format.fps,
        )
    };
    let filter = format!(
        "{};{};[l][r]hstack=inputs=2[v];\
         [2:a]aresample={rate}[la];[3:a]aresample={rate}[ra];\
         [la][ra]amix=inputs=2:duration=longest[a]",
        fit(0, "l"),
        fit(1, "r"),
        rate = format.sample_rate,
    );

    args.extend([
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-c:v".to_string(),
        "libvpx".to_string(),
        "-b:v".to_string(),
        "2M".to_string(),
        "-c:a".to_string(),
        "libopus".to_string(),
        "-t".to_string(),
        seconds,
        job.output.to_string_lossy().to_string(),
    ]);
    args
}
