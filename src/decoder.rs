//! External decoder boundary.
//!
//! Frames come from an FFmpeg-compatible executable that writes raw pixels
//! to stdout. Dimensions are probed first from the decoder's stream banner.

use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::config::PixelFormat;
use crate::error::{ExtractError, Result};
use crate::frame::VideoFrame;

const READ_BUFFER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    path: PathBuf,
    pixel_format: PixelFormat,
}

impl FfmpegDecoder {
    pub fn new(path: impl Into<PathBuf>, pixel_format: PixelFormat) -> Self {
        Self {
            path: path.into(),
            pixel_format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Whether the executable can be launched at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    /// Read `(width, height)` from the decoder's stream description.
    pub fn probe_dimensions(&self, video_path: &Path) -> Result<(usize, usize)> {
        let output = Command::new(&self.path)
            .arg("-i")
            .arg(video_path)
            .arg("-hide_banner")
            .output()
            .map_err(|e| {
                let reason = format!("cannot run decoder {}: {e}", self.path.display());
                ExtractError::decode(video_path, reason)
            })?;

        // ffmpeg exits non-zero when given no output file, so only the banner matters here.
        let info = String::from_utf8_lossy(&output.stderr);
        parse_video_dimensions(&info)
            .ok_or_else(|| ExtractError::decode(video_path, "cannot parse video dimensions"))
    }

    /// Start decoding. `max_frames` caps the number of frames produced.
    pub fn open(&self, video_path: &Path, max_frames: Option<usize>) -> Result<FrameStream> {
        if max_frames == Some(0) {
            return Err(ExtractError::invalid("max_frames must be positive"));
        }
        let (width, height) = self.probe_dimensions(video_path)?;
        let channels = self.pixel_format.channels();
        debug!(width, height, channels, video = %video_path.display(), "probed video");

        let mut cmd = Command::new(&self.path);
        cmd.arg("-i")
            .arg(video_path)
            .args(["-f", "rawvideo", "-pix_fmt", self.pixel_format.ffmpeg_name()])
            .args(["-an", "-threads", "0"]);
        if let Some(limit) = max_frames {
            cmd.args(["-frames:v", &limit.to_string()]);
        }
        cmd.arg("-").stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            ExtractError::decode(video_path, format!("failed to spawn decoder: {e}"))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::decode(video_path, "decoder stdout unavailable"))?;

        Ok(FrameStream {
            video_path: video_path.to_path_buf(),
            child: Some(child),
            reader: BufReader::with_capacity(READ_BUFFER_BYTES, stdout),
            width,
            height,
            channels,
            limit: max_frames,
            produced: 0,
            done: false,
        })
    }
}

/// Frames in decode order, read straight from the decoder's stdout.
///
/// Yields an error and stops on a non-zero exit status, output that ends in
/// the middle of a frame, or a stream with no frames at all.
pub struct FrameStream {
    video_path: PathBuf,
    child: Option<Child>,
    reader: BufReader<ChildStdout>,
    width: usize,
    height: usize,
    channels: usize,
    limit: Option<usize>,
    produced: usize,
    done: bool,
}

impl FrameStream {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn frame_size(&self) -> usize {
        self.width * self.height * self.channels
    }

    pub fn produced(&self) -> usize {
        self.produced
    }

    fn fail(&mut self, reason: impl Into<String>) -> Option<Result<VideoFrame>> {
        self.done = true;
        self.stop_child();
        Some(Err(ExtractError::decode(&self.video_path, reason)))
    }

    /// Reap the decoder after a clean end of stream.
    fn finish(&mut self) -> Option<Result<VideoFrame>> {
        self.done = true;
        let status = match self.child.take() {
            Some(mut child) => child.wait(),
            None => return None,
        };
        match status {
            Ok(status) if !status.success() => {
                let reason = format!("decoder exited with {status}");
                self.fail(reason)
            }
            Err(e) => self.fail(format!("failed to wait for decoder: {e}")),
            Ok(_) if self.produced == 0 => self.fail("decoder produced no frames"),
            Ok(_) => None,
        }
    }

    fn stop_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Iterator for FrameStream {
    type Item = Result<VideoFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            self.done = true;
            // The decoder may still be writing; it is not needed past the limit.
            self.stop_child();
            return None;
        }

        let mut buf = vec![0u8; self.frame_size()];
        match read_full(&mut self.reader, &mut buf) {
            Ok(0) => self.finish(),
            Ok(n) if n < buf.len() => {
                let reason = format!(
                    "truncated frame {}: got {n} of {} bytes",
                    self.produced,
                    buf.len()
                );
                self.fail(reason)
            }
            Ok(_) => {
                let index = self.produced;
                self.produced += 1;
                let frame =
                    VideoFrame::with_channels(index, self.width, self.height, self.channels, buf);
                if frame.is_err() {
                    self.done = true;
                    self.stop_child();
                }
                Some(frame)
            }
            Err(e) => self.fail(format!("failed to read decoder output: {e}")),
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if self.child.is_some() {
            warn!(video = %self.video_path.display(), "decoder stream dropped early");
            self.stop_child();
        }
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read (0 at EOF).
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Parse `WxH` from the first `Video:` line of decoder output.
pub fn parse_video_dimensions(probe_info: &str) -> Option<(usize, usize)> {
    for line in probe_info.lines() {
        if !line.contains("Video:") {
            continue;
        }
        for part in line.split_whitespace() {
            let Some((w, rest)) = part.split_once('x') else {
                continue;
            };
            let h = rest.split(|c: char| !c.is_ascii_digit()).next().unwrap_or(rest);
            if let (Ok(width), Ok(height)) = (w.parse::<usize>(), h.parse::<usize>()) {
                if width > 0 && height > 0 {
                    return Some((width, height));
                }
            }
        }
    }
    None
}
