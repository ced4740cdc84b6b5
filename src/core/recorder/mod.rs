//! Recording of the combined avatar output.
//!
//! On first use the recorder binds the two participants' media elements.
//! Starting a recording opens a capture on each element, so the received RTP
//! of all four tracks is written to per-track files as it arrives. Stopping
//! closes the captures and composes them into one WebM file: both avatars
//! side by side on the canvas, with their audio mixed.

mod capture;
mod composer;

pub use capture::{CaptureFormat, CaptureTarget, CapturedTrack, TrackCapture};
pub use composer::{ComposeJob, FfmpegComposer, MediaComposer, StreamFormat, ffmpeg_args};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::session::MediaElement;

/// Errors that can occur while recording.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Writing the recording or a capture file failed
    #[error("Failed to write recording {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A capture writer rejected a packet or could not be finalized
    #[error("Capture error: {0}")]
    Capture(String),

    /// No capture container exists for the track's codec
    #[error("Unsupported codec for capture: {0}")]
    UnsupportedCodec(String),

    /// Composing the captures into the recording failed
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Recording was started before the media sources were bound
    #[error("Recorder is not set up")]
    NotSetUp,
}

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Recording output and stream parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    pub downloads_dir: PathBuf,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    /// The `ffmpeg` executable used for composition.
    pub ffmpeg_path: PathBuf,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("."),
            file_name: "avatar_recording.webm".to_string(),
            width: 1920,
            height: 1080,
            fps: 30,
            sample_rate: 48_000,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl RecorderSettings {
    pub fn output_path(&self) -> PathBuf {
        self.downloads_dir.join(&self.file_name)
    }

    /// Directory the per-track captures are written under, one subdirectory per recording.
    pub fn capture_dir(&self) -> PathBuf {
        self.downloads_dir.join(format!(".{}.parts", self.file_name))
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat {
            width: self.width,
            height: self.height,
            fps: self.fps,
            sample_rate: self.sample_rate,
        }
    }

    fn target(&self, dir: &Path, name: &str) -> CaptureTarget {
        CaptureTarget {
            stem: dir.join(name),
            width: u16::try_from(self.width / 2).unwrap_or(u16::MAX),
            height: u16::try_from(self.height).unwrap_or(u16::MAX),
            fps: self.fps,
        }
    }
}

/// The four media elements a recording is made from.
#[derive(Debug, Clone)]
pub struct RecorderSources {
    pub left_video: Arc<MediaElement>,
    pub right_video: Arc<MediaElement>,
    pub left_audio: Arc<MediaElement>,
    pub right_audio: Arc<MediaElement>,
}

impl RecorderSources {
    fn named(&self) -> [(&'static str, &Arc<MediaElement>); 4] {
        [
            ("left_video", &self.left_video),
            ("right_video", &self.right_video),
            ("left_audio", &self.left_audio),
            ("right_audio", &self.right_audio),
        ]
    }
}

#[derive(Debug)]
struct ActiveRecording {
    started: Instant,
    capture_dir: PathBuf,
}

struct RecorderInner {
    settings: RecorderSettings,
    sources: Mutex<Option<RecorderSources>>,
    composer: Arc<dyn MediaComposer>,
    active: Mutex<Option<ActiveRecording>>,
    recordings: AtomicU64,
}

/// Captures both avatars and composes them into one recording.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<RecorderInner>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("settings", &self.inner.settings)
            .field("is_set_up", &self.is_set_up())
            .field("is_recording", &self.is_recording())
            .finish()
    }
}

impl Recorder {
    pub fn new(settings: RecorderSettings) -> Self {
        let composer = Arc::new(FfmpegComposer::new(settings.ffmpeg_path.clone()));
        Self::with_composer(settings, composer)
    }

    pub fn with_composer(settings: RecorderSettings, composer: Arc<dyn MediaComposer>) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                settings,
                sources: Mutex::new(None),
                composer,
                active: Mutex::new(None),
                recordings: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.inner.settings
    }

    pub fn is_set_up(&self) -> bool {
        self.inner.sources.lock().is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    /// Bind the media sources. Only the first call has any effect.
    pub fn setup(&self, sources: RecorderSources) -> bool {
        let mut slot = self.inner.sources.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(sources);
        info!(
            width = self.inner.settings.width,
            height = self.inner.settings.height,
            fps = self.inner.settings.fps,
            "Recorder set up"
        );
        true
    }

    /// Begin recording. Returns false if already recording.
    pub fn start(&self) -> RecorderResult<bool> {
        let sources = self
            .inner
            .sources
            .lock()
            .clone()
            .ok_or(RecorderError::NotSetUp)?;

        let mut active = self.inner.active.lock();
        if active.is_some() {
            return Ok(false);
        }

        let settings = &self.inner.settings;
        let sequence = self.inner.recordings.fetch_add(1, Ordering::SeqCst);
        let capture_dir = settings.capture_dir().join(sequence.to_string());
        std::fs::create_dir_all(&capture_dir).map_err(|source| RecorderError::Io {
            path: capture_dir.display().to_string(),
            source,
        })?;

        for (name, element) in sources.named() {
            element.begin_capture(settings.target(&capture_dir, name));
        }
        *active = Some(ActiveRecording {
            started: Instant::now(),
            capture_dir,
        });
        info!("Recording started");
        Ok(true)
    }

    /// Stop recording and compose the file. Returns `None` if not recording.
    ///
    /// On failure the capture files are left in place.
    pub async fn stop(&self) -> RecorderResult<Option<PathBuf>> {
        // The captures are closed under the same guard that ends the
        // recording, so a concurrent start cannot claim them.
        let (active, job) = {
            let mut guard = self.inner.active.lock();
            let Some(active) = guard.take() else {
                return Ok(None);
            };
            let Some(sources) = self.inner.sources.lock().clone() else {
                return Err(RecorderError::NotSetUp);
            };
            let job = ComposeJob {
                left_video: sources.left_video.end_capture(),
                right_video: sources.right_video.end_capture(),
                left_audio: sources.left_audio.end_capture(),
                right_audio: sources.right_audio.end_capture(),
                duration: active.started.elapsed(),
                format: self.inner.settings.format(),
                output: self.inner.settings.output_path(),
            };
            (active, job)
        };

        let captured = [
            &job.left_video,
            &job.right_video,
            &job.left_audio,
            &job.right_audio,
        ]
        .iter()
        .filter(|track| track.is_some())
        .count();
        if captured < 4 {
            warn!(captured, "Some tracks produced no media, filling with black and silence");
        }

        if let Some(parent) = job.output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| RecorderError::Io {
                        path: parent.display().to_string(),
                        source,
                    })?;
            }
        }

        if let Err(e) = self.inner.composer.compose(&job).await {
            warn!(
                captures = %active.capture_dir.display(),
                "Recording could not be composed, keeping the captures"
            );
            return Err(e);
        }

        if let Err(e) = tokio::fs::remove_dir_all(&active.capture_dir).await {
            debug!("Could not remove {}: {e}", active.capture_dir.display());
        }
        // Only succeeds once no other recording is capturing.
        let _ = tokio::fs::remove_dir(self.inner.settings.capture_dir()).await;
        info!(
            path = %job.output.display(),
            seconds = job.duration.as_secs_f64(),
            captured,
            "Recording saved"
        );
        Ok(Some(job.output))
    }

    /// End any recording without saving it.
    pub fn shutdown(&self) {
        let active = {
            let mut guard = self.inner.active.lock();
            let Some(active) = guard.take() else {
                return;
            };
            if let Some(sources) = self.inner.sources.lock().clone() {
                for (_, element) in sources.named() {
                    element.end_capture();
                }
            }
            active
        };
        warn!("Recorder shut down while recording, discarding captures");
        if let Err(e) = std::fs::remove_dir_all(&active.capture_dir) {
            debug!("Could not remove {}: {e}", active.capture_dir.display());
        }
        let _ = std::fs::remove_dir(self.inner.settings.capture_dir());
    }
}
