use anyhow::{anyhow, Context};
use image::RgbImage;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::error::{ConvertError, FailedAttempt, Result};

/// Source metadata from ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub has_audio: bool,
}

/// Probe a video file with ffprobe. Fails with `SourceUnreadable` when the
/// file cannot be opened or carries no video stream.
pub fn probe(path: &Path) -> Result<VideoMeta> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams")
        .arg("-show_format")
        .arg(path)
        .output()
        .map_err(|e| ConvertError::SourceUnreadable(format!("could not run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(ConvertError::SourceUnreadable(format!(
            "ffprobe failed for {}",
            path.display()
        )));
    }

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| ConvertError::SourceUnreadable(format!("bad ffprobe output: {}", e)))?;
    meta_from_json(&value)
}

fn meta_from_json(value: &serde_json::Value) -> Result<VideoMeta> {
    let streams = value
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or_else(|| ConvertError::SourceUnreadable("no streams in probe output".into()))?;

    let mut meta: Option<VideoMeta> = None;
    let mut has_audio = false;

    for stream in streams {
        match stream.get("codec_type").and_then(|t| t.as_str()) {
            Some("video") if meta.is_none() => {
                let width = stream.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                let height = stream.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                let fps = stream
                    .get("avg_frame_rate")
                    .and_then(|v| v.as_str())
                    .and_then(parse_fps)
                    .unwrap_or(0.0);
                let mut frame_count = stream
                    .get("nb_frames")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                if frame_count == 0 {
                    // Some containers omit nb_frames; estimate from duration.
                    let duration = stream
                        .get("duration")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse::<f64>().ok())
                        .or_else(|| {
                            value
                                .get("format")
                                .and_then(|f| f.get("duration"))
                                .and_then(|d| d.as_str())
                                .and_then(|s| s.parse::<f64>().ok())
                        });
                    if let Some(d) = duration {
                        frame_count = (d * fps).round() as u64;
                    }
                }
                meta = Some(VideoMeta {
                    width,
                    height,
                    fps,
                    frame_count,
                    has_audio: false,
                });
            }
            Some("audio") => has_audio = true,
            _ => {}
        }
    }

    let mut meta = meta
        .ok_or_else(|| ConvertError::SourceUnreadable("no video stream in source".into()))?;
    if meta.width == 0 || meta.height == 0 {
        return Err(ConvertError::SourceUnreadable(
            "video stream reports zero dimensions".into(),
        ));
    }
    meta.has_audio = has_audio;
    Ok(meta)
}

fn parse_fps(raw: &str) -> Option<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        Some(num / den)
    } else {
        raw.parse().ok()
    }
}

/// Frame-by-frame reader: an ffmpeg child decoding the source to rgb24
/// rawvideo on stdout.
pub struct VideoSource {
    child: Child,
    stdout: ChildStdout,
    path: PathBuf,
    width: u32,
    height: u32,
}

impl VideoSource {
    /// Start decoding `path` at its native dimensions.
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(path)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ConvertError::SourceUnreadable(format!("could not run ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConvertError::SourceUnreadable("ffmpeg stdout unavailable".into()))?;
        Ok(Self {
            child,
            stdout,
            path: path.to_path_buf(),
            width,
            height,
        })
    }

    /// Read the next decoded frame, or `None` at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; len];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let img = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| anyhow!("decoded frame buffer has wrong length"))?;
        Ok(Some(img))
    }

    /// Reposition the read cursor back to frame 0 by restarting the
    /// decoder. Needed because the first frame is consumed up front to
    /// size the output writer.
    pub fn rewind(&mut self) -> Result<()> {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let fresh = Self::open(&self.path, self.width, self.height)?;
        // Drop of the old value re-reaps the already-waited child, which
        // is harmless.
        let _ = std::mem::replace(self, fresh);
        Ok(())
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Encoder candidates, most compatible first.
pub const CODEC_CANDIDATES: &[&str] = &["libx264", "mpeg4"];

/// Container writer: an ffmpeg child consuming rgb24 rawvideo on stdin and
/// encoding to `path` with the first usable codec candidate.
pub struct VideoSink {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    codec: String,
    width: u32,
    height: u32,
}

impl VideoSink {
    /// Try each codec candidate in order; record why each rejected one was
    /// skipped and fail with `NoCodecAvailable` when none opens.
    pub fn open(path: &Path, fps: f64, width: u32, height: u32) -> Result<Self> {
        let mut attempts: Vec<FailedAttempt> = Vec::new();
        let encoders = list_encoders();

        for &codec in CODEC_CANDIDATES {
            match &encoders {
                Ok(listing) if !listing.contains(codec) => {
                    attempts.push(FailedAttempt {
                        name: codec.to_string(),
                        reason: "not present in ffmpeg -encoders".to_string(),
                    });
                    continue;
                }
                Err(reason) => {
                    attempts.push(FailedAttempt {
                        name: codec.to_string(),
                        reason: reason.clone(),
                    });
                    continue;
                }
                _ => {}
            }
            match Self::spawn(path, codec, fps, width, height) {
                Ok(sink) => return Ok(sink),
                Err(e) => attempts.push(FailedAttempt {
                    name: codec.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        Err(ConvertError::NoCodecAvailable(attempts))
    }

    fn spawn(path: &Path, codec: &str, fps: f64, width: u32, height: u32) -> anyhow::Result<Self> {
        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(format!("{}", fps))
            .arg("-i")
            .arg("pipe:0")
            .arg("-c:v")
            .arg(codec)
            // yuv420p wants even dimensions; pad rather than rescale.
            .arg("-vf")
            .arg("pad=ceil(iw/2)*2:ceil(ih/2)*2")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawning ffmpeg encoder")?;
        let stdin = child.stdin.take().context("ffmpeg stdin unavailable")?;
        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            codec: codec.to_string(),
            width,
            height,
        })
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let (w, h) = frame.dimensions();
        if (w, h) != (self.width, self.height) {
            return Err(ConvertError::InvalidDimension(format!(
                "frame is {}x{}, writer expects {}x{}",
                w, h, self.width, self.height
            )));
        }
        let writer = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("writer already finished"))?;
        writer.write_all(frame.as_raw())?;
        Ok(())
    }

    /// Flush, close the pipe, and wait for the encoder to exit.
    pub fn finish(mut self) -> Result<()> {
        if let Some(mut writer) = self.stdin.take() {
            writer.flush()?;
        }
        let status = self.child.wait()?;
        if !status.success() {
            return Err(anyhow!("ffmpeg encoder ({}) exited with {}", self.codec, status).into());
        }
        Ok(())
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        // Dropping without finish(): close the pipe and reap.
        self.stdin.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn list_encoders() -> std::result::Result<String, String> {
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-encoders")
        .output()
        .map_err(|e| format!("could not run ffmpeg: {}", e))?;
    if !output.status.success() {
        return Err("ffmpeg -encoders failed".to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fps_parsing() {
        assert_eq!(parse_fps("30"), Some(30.0));
        assert_eq!(parse_fps("30000/1001").map(|f| (f * 1000.0).round()), Some(29970.0));
        assert_eq!(parse_fps("0/0"), None);
        assert_eq!(parse_fps("garbage"), None);
    }

    #[test]
    fn meta_from_full_probe() {
        let v = json!({
            "streams": [
                {"codec_type": "video", "width": 640, "height": 360,
                 "avg_frame_rate": "24/1", "nb_frames": "240"},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"duration": "10.0"}
        });
        let meta = meta_from_json(&v).unwrap();
        assert_eq!(meta.width, 640);
        assert_eq!(meta.height, 360);
        assert_eq!(meta.fps, 24.0);
        assert_eq!(meta.frame_count, 240);
        assert!(meta.has_audio);
    }

    #[test]
    fn meta_estimates_frames_from_duration() {
        let v = json!({
            "streams": [
                {"codec_type": "video", "width": 320, "height": 240,
                 "avg_frame_rate": "10/1"}
            ],
            "format": {"duration": "3.0"}
        });
        let meta = meta_from_json(&v).unwrap();
        assert_eq!(meta.frame_count, 30);
        assert!(!meta.has_audio);
    }

    #[test]
    fn meta_without_video_stream_is_unreadable() {
        let v = json!({"streams": [{"codec_type": "audio"}]});
        assert!(matches!(
            meta_from_json(&v),
            Err(ConvertError::SourceUnreadable(_))
        ));
    }

    #[test]
    fn meta_with_zero_dimensions_is_unreadable() {
        let v = json!({
            "streams": [{"codec_type": "video", "width": 0, "height": 0,
                         "avg_frame_rate": "30/1", "nb_frames": "10"}]
        });
        assert!(matches!(
            meta_from_json(&v),
            Err(ConvertError::SourceUnreadable(_))
        ));
    }
}
