use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::FailedAttempt;
use crate::video;
use crate::Quality;

/// Result of an audio mux attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxOutcome {
    /// Final file written with the original audio track.
    Muxed,
    /// The original source has no audio stream; the silent video was
    /// promoted to the final path unchanged.
    NoAudioPresent,
    /// Every strategy failed; the intermediate file is untouched and the
    /// caller degrades to a silent final video.
    Failed,
}

/// Outcome plus the per-strategy failure reasons, for the job log.
#[derive(Debug)]
pub struct MuxReport {
    pub outcome: MuxOutcome,
    pub attempts: Vec<FailedAttempt>,
}

/// True when an ffmpeg binary answers `-version`; audio support and the
/// quality re-encode both depend on it.
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Video encode arguments for a quality tier. The (CRF, preset) pairs are
/// load-bearing for output compatibility.
pub fn quality_video_args(quality: Quality) -> Vec<&'static str> {
    match quality {
        Quality::High => vec!["-c:v", "libx264", "-crf", "18", "-preset", "medium"],
        Quality::Medium => vec!["-c:v", "libx264", "-crf", "23", "-preset", "fast"],
        Quality::Low => vec!["-c:v", "libx264", "-crf", "28", "-preset", "ultrafast"],
    }
}

/// Combine the intermediate (silent ASCII) video's picture stream with the
/// original source's audio stream into `final_path`.
///
/// Strategy, first success wins:
/// 1. no audio stream in the original: promote the intermediate by rename;
/// 2. ffmpeg with quality tuning, aac audio, explicit stream mapping and
///    `-shortest` truncation;
/// 3. simplified ffmpeg command without quality tuning.
///
/// On `Muxed` the intermediate file is deleted; on `NoAudioPresent` it has
/// been renamed to the final path; on `Failed` it is left in place for the
/// caller. Exactly one of {renamed, deleted, left for caller} holds on
/// every path.
pub fn mux_audio(
    intermediate: &Path,
    original: &Path,
    quality: Quality,
    final_path: &Path,
) -> MuxReport {
    let mut attempts: Vec<FailedAttempt> = Vec::new();

    match video::probe(original) {
        Ok(meta) if !meta.has_audio => {
            return match promote_silent(intermediate, final_path) {
                Ok(()) => MuxReport {
                    outcome: MuxOutcome::NoAudioPresent,
                    attempts,
                },
                Err(e) => {
                    attempts.push(FailedAttempt {
                        name: "promote silent video".into(),
                        reason: e.to_string(),
                    });
                    MuxReport {
                        outcome: MuxOutcome::Failed,
                        attempts,
                    }
                }
            };
        }
        Ok(_) => {}
        // Probe failure is not fatal: let ffmpeg itself decide below.
        Err(e) => attempts.push(FailedAttempt {
            name: "audio probe".into(),
            reason: e.to_string(),
        }),
    }

    // Primary: quality-tuned encode with explicit stream mapping.
    let mut primary = Command::new("ffmpeg");
    primary
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg("-i")
        .arg(intermediate)
        .arg("-i")
        .arg(original)
        .args(quality_video_args(quality))
        .args(["-c:a", "aac", "-b:a", "128k"])
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .arg("-shortest")
        .args(["-movflags", "+faststart"])
        .arg(final_path);
    match run_tool("ffmpeg quality mux", &mut primary) {
        Ok(()) => {
            let _ = fs::remove_file(intermediate);
            return MuxReport {
                outcome: MuxOutcome::Muxed,
                attempts,
            };
        }
        Err(a) => attempts.push(a),
    }

    // Fallback: direct mapping without quality tuning.
    let mut simple = Command::new("ffmpeg");
    simple
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg("-i")
        .arg(intermediate)
        .arg("-i")
        .arg(original)
        .args(["-c:v", "libx264", "-c:a", "aac"])
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .arg("-shortest")
        .arg(final_path);
    match run_tool("ffmpeg simple mux", &mut simple) {
        Ok(()) => {
            let _ = fs::remove_file(intermediate);
            MuxReport {
                outcome: MuxOutcome::Muxed,
                attempts,
            }
        }
        Err(a) => {
            attempts.push(a);
            // A failed run may have left a partial output behind.
            let _ = fs::remove_file(final_path);
            MuxReport {
                outcome: MuxOutcome::Failed,
                attempts,
            }
        }
    }
}

/// Re-encode the silent intermediate to the final path with the requested
/// quality tier. Used when audio was not requested (or unavailable).
/// Returns the failure reason when ffmpeg is missing or exits non-zero so
/// the caller can fall back to a plain rename.
pub fn reencode_silent(
    intermediate: &Path,
    quality: Quality,
    final_path: &Path,
) -> Result<(), FailedAttempt> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg("-i")
        .arg(intermediate)
        .args(quality_video_args(quality))
        .args(["-movflags", "+faststart"])
        .arg(final_path);
    run_tool("ffmpeg re-encode", &mut cmd)?;
    let _ = fs::remove_file(intermediate);
    Ok(())
}

/// Rename the intermediate file to the final path (promote, not copy).
pub fn promote_silent(intermediate: &Path, final_path: &Path) -> std::io::Result<()> {
    fs::rename(intermediate, final_path)
}

fn run_tool(name: &str, cmd: &mut Command) -> Result<(), FailedAttempt> {
    match cmd.output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(FailedAttempt {
            name: name.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Err(e) => Err(FailedAttempt {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_are_exact() {
        assert_eq!(
            quality_video_args(Quality::High),
            ["-c:v", "libx264", "-crf", "18", "-preset", "medium"]
        );
        assert_eq!(
            quality_video_args(Quality::Medium),
            ["-c:v", "libx264", "-crf", "23", "-preset", "fast"]
        );
        assert_eq!(
            quality_video_args(Quality::Low),
            ["-c:v", "libx264", "-crf", "28", "-preset", "ultrafast"]
        );
    }

    #[test]
    fn promote_moves_not_copies() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("job_temp.mp4");
        let final_path = dir.path().join("job_ascii.mp4");
        fs::write(&temp, b"video bytes").unwrap();

        promote_silent(&temp, &final_path).unwrap();

        assert!(!temp.exists());
        assert!(final_path.exists());
        assert_eq!(fs::read(&final_path).unwrap(), b"video bytes");
    }
}
