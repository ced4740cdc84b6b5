//! Per-track capture of received RTP into a container file.
//!
//! Packets are written as they arrive, without decoding: VP8 and VP9 go to
//! IVF, H.264 to an Annex B stream, and Opus to Ogg.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;
use webrtc::media::io::Writer;
use webrtc::media::io::h264_writer::H264Writer;
use webrtc::media::io::ivf_reader::IVFFileHeader;
use webrtc::media::io::ivf_writer::IVFWriter;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::rtp::packet::Packet;

use super::{RecorderError, RecorderResult};
use crate::core::events::TrackKind;
use crate::core::session::TrackInfo;

/// Where and how one media element should be captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    /// Path without extension; the extension follows the track's codec.
    pub stem: PathBuf,
    pub width: u16,
    pub height: u16,
    pub fps: u32,
}

/// Container a codec is captured into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Ivf([u8; 4]),
    AnnexB,
    Ogg,
}

impl CaptureFormat {
    /// Pick the container for a codec mime type such as `video/VP8`.
    pub fn for_codec(mime_type: &str) -> Option<Self> {
        match mime_type.to_ascii_lowercase().as_str() {
            "video/vp8" => Some(Self::Ivf(*b"VP80")),
            "video/vp9" => Some(Self::Ivf(*b"VP90")),
            "video/h264" => Some(Self::AnnexB),
            "audio/opus" => Some(Self::Ogg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ivf(_) => "ivf",
            Self::AnnexB => "h264",
            Self::Ogg => "ogg",
        }
    }
}

/// A finished capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedTrack {
    pub path: PathBuf,
    pub kind: TrackKind,
    pub format: CaptureFormat,
    pub packets: u64,
}

/// Open writer for one remote track.
pub struct TrackCapture {
    path: PathBuf,
    kind: TrackKind,
    format: CaptureFormat,
    ssrc: u32,
    writer: Box<dyn Writer + Send>,
    packets: u64,
}

impl std::fmt::Debug for TrackCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackCapture")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("ssrc", &self.ssrc)
            .field("packets", &self.packets)
            .finish()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> RecorderError {
    RecorderError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn writer_error(path: &Path, error: webrtc::media::Error) -> RecorderError {
    RecorderError::Capture(format!("{}: {error}", path.display()))
}

impl TrackCapture {
    /// Create the capture file for `track` and write its container header.
    pub fn create(target: &CaptureTarget, kind: TrackKind, track: &TrackInfo) -> RecorderResult<Self> {
        let format = CaptureFormat::for_codec(&track.codec)
            .ok_or_else(|| RecorderError::UnsupportedCodec(track.codec.clone()))?;
        let path = target.stem.with_extension(format.extension());
        let file = File::create(&path).map_err(|e| io_error(&path, e))?;

        let writer: Box<dyn Writer + Send> = match format {
            CaptureFormat::Ivf(four_cc) => {
                let header = IVFFileHeader {
                    signature: *b"DKIF",
                    version: 0,
                    header_size: 32,
                    four_cc,
                    width: target.width,
                    height: target.height,
                    timebase_denominator: target.fps,
                    timebase_numerator: 1,
                    num_frames: 0,
                    unused: 0,
                };
                Box::new(IVFWriter::new(file, &header).map_err(|e| writer_error(&path, e))?)
            }
            CaptureFormat::AnnexB => Box::new(H264Writer::new(file)),
            CaptureFormat::Ogg => {
                let channels = u8::try_from(track.channels).unwrap_or(2).max(1);
                Box::new(
                    OggWriter::new(file, track.clock_rate, channels)
                        .map_err(|e| writer_error(&path, e))?,
                )
            }
        };

        debug!(path = %path.display(), codec = %track.codec, ssrc = track.ssrc, "Capture file created");
        Ok(Self {
            path,
            kind,
            format,
            ssrc: track.ssrc,
            writer,
            packets: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Write one packet. Packets from another SSRC are skipped and return false.
    pub fn write(&mut self, packet: &Packet) -> RecorderResult<bool> {
        if packet.header.ssrc != self.ssrc {
            return Ok(false);
        }
        self.writer
            .write_rtp(packet)
            .map_err(|e| writer_error(&self.path, e))?;
        self.packets += 1;
        Ok(true)
    }

    /// Finalize the container and hand back the file.
    pub fn finish(mut self) -> RecorderResult<CapturedTrack> {
        self.writer
            .close()
            .map_err(|e| writer_error(&self.path, e))?;
        Ok(CapturedTrack {
            path: self.path,
            kind: self.kind,
            format: self.format,
            packets: self.packets,
        })
    }
}
