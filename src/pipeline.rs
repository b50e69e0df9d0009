use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use crate::error::{ConvertError, Result};
use crate::jobs::{JobStatus, JobTracker};
use crate::mux::{self, MuxOutcome};
use crate::raster::{self, GlyphPainter};
use crate::video::{self, VideoSink, VideoSource};
use crate::Settings;

/// Progress share reserved for frame generation; the remainder covers
/// audio muxing / re-encoding.
const GENERATION_SHARE: f64 = 50.0;
/// Emit a job log line at least every this many frames.
const LOG_EVERY_FRAMES: u64 = 30;

fn generation_progress(frames_written: u64, total_frames: u64) -> f64 {
    if total_frames == 0 {
        return 0.0;
    }
    // Metadata frame counts can undershoot the real stream; never let the
    // generation phase claim more than its share.
    ((frames_written as f64 / total_frames as f64) * GENERATION_SHARE).min(GENERATION_SHARE)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn temp_path(output_dir: &Path, job_id: &str) -> PathBuf {
    output_dir.join(format!("{}_temp.mp4", job_id))
}

fn final_path(output_dir: &Path, job_id: &str) -> PathBuf {
    output_dir.join(format!("{}_ascii.mp4", job_id))
}

/// Run a conversion on a dedicated background thread.
///
/// The handle is returned (not detached) so a front end can join workers
/// on shutdown; all results still flow exclusively through the tracker.
pub fn spawn(
    tracker: JobTracker,
    job_id: String,
    input: PathBuf,
    output_dir: PathBuf,
    settings: Settings,
) -> thread::JoinHandle<()> {
    thread::spawn(move || run(&tracker, &job_id, &input, &output_dir, &settings))
}

/// Convert `input` into an ASCII-art video under `output_dir`.
///
/// Every outcome is communicated via the tracker: no error ever crosses
/// this boundary, and the job is marked completed (terminal) whether it
/// succeeded or failed.
pub fn run(tracker: &JobTracker, job_id: &str, input: &Path, output_dir: &Path, settings: &Settings) {
    tracker.set_status(job_id, JobStatus::Converting);
    let temp = temp_path(output_dir, job_id);

    match convert(tracker, job_id, input, output_dir, settings) {
        Ok(output) => {
            tracker.set_progress(job_id, 100.0, "Conversion completed!");
            tracker.append_log(job_id, "SUCCESS: ASCII video created!");
            tracker.append_log(job_id, &format!("File saved as: {}", output.display()));
            tracker.mark_completed(job_id, output);
        }
        Err(e) => {
            let msg = format!("Conversion failed: {}", e);
            tracker.append_log(job_id, &format!("ERROR: {}", msg));
            tracker.mark_failed(job_id, &msg);
            let _ = fs::remove_file(&temp);
        }
    }
}

fn convert(
    tracker: &JobTracker,
    job_id: &str,
    input: &Path,
    output_dir: &Path,
    settings: &Settings,
) -> Result<PathBuf> {
    tracker.append_log(
        job_id,
        &format!("Starting conversion of: {}", display_name(input)),
    );

    settings.validate()?;
    let palette = settings.resolve_palette()?;
    let audio_capable = mux::ffmpeg_available();
    let include_audio = settings.include_audio && audio_capable;

    tracker.append_log(
        job_id,
        &format!(
            "Settings - Width: {}, Contrast: {}, Font: {}",
            settings.ascii_width, settings.contrast, settings.font_size
        ),
    );
    tracker.append_log(
        job_id,
        &format!("Output - MP4 Quality: {}", settings.quality),
    );
    if include_audio {
        tracker.append_log(job_id, "Audio: ENABLED - will include original audio");
    } else {
        tracker.append_log(job_id, "Audio: DISABLED - video only");
    }

    let meta = video::probe(input)?;
    if meta.frame_count == 0 {
        return Err(ConvertError::SourceUnreadable("video has no frames".into()));
    }
    tracker.append_log(
        job_id,
        &format!("Video info - Frames: {}, FPS: {:.1}", meta.frame_count, meta.fps),
    );

    fs::create_dir_all(output_dir)?;
    let temp = temp_path(output_dir, job_id);
    let out = final_path(output_dir, job_id);
    tracker.append_log(job_id, &format!("Output will be: {}", display_name(&out)));

    // First frame is decoded up front: the writer needs the final pixel
    // dimensions before anything can be written, then the cursor goes back
    // to frame 0.
    let mut source = VideoSource::open(input, meta.width, meta.height)?;
    let first = source
        .read_frame()?
        .ok_or_else(|| ConvertError::SourceUnreadable("could not read first frame".into()))?;

    let painter = GlyphPainter::resolve();
    if painter.is_fallback() {
        tracker.append_log(
            job_id,
            "WARNING: no monospace font found, using built-in block glyphs",
        );
    }

    let first_grid =
        raster::to_character_grid(&first, settings.ascii_width, &palette, settings.contrast)?;
    let (out_w, out_h) = raster::rendered_size(&first_grid, settings.font_size);
    tracker.append_log(job_id, &format!("Output video size: {}x{}", out_w, out_h));
    source.rewind()?;

    let mut sink = VideoSink::open(&temp, meta.fps, out_w, out_h)?;
    tracker.append_log(
        job_id,
        &format!("Encoding intermediate video with {}", sink.codec()),
    );
    tracker.append_log(job_id, "Generating ASCII video frames...");

    let mut frames_written: u64 = 0;
    while let Some(frame) = source.read_frame()? {
        let grid =
            raster::to_character_grid(&frame, settings.ascii_width, &palette, settings.contrast)?;
        let rendered = raster::render(&grid, settings.font_size, &painter);
        sink.write_frame(&rendered)?;

        frames_written += 1;
        let progress = generation_progress(frames_written, meta.frame_count);
        tracker.set_progress(
            job_id,
            progress,
            &format!(
                "Generating ASCII frames {}/{}",
                frames_written, meta.frame_count
            ),
        );
        if frames_written % LOG_EVERY_FRAMES == 0 {
            tracker.append_log(
                job_id,
                &format!(
                    "Generated {}/{} ASCII frames ({:.1}%)",
                    frames_written, meta.frame_count, progress
                ),
            );
        }
    }
    drop(source);
    sink.finish()?;
    tracker.append_log(
        job_id,
        &format!("ASCII video frames generated: {}", display_name(&temp)),
    );

    if include_audio {
        tracker.append_log(job_id, "Adding original audio...");
        tracker.set_progress(job_id, 75.0, "Adding audio to ASCII video...");
        let report = mux::mux_audio(&temp, input, settings.quality, &out);
        for attempt in &report.attempts {
            tracker.append_log(job_id, &format!("WARNING: {}", attempt));
        }
        match report.outcome {
            MuxOutcome::Muxed => {
                tracker.append_log(job_id, "Audio successfully added");
            }
            MuxOutcome::NoAudioPresent => {
                tracker.append_log(job_id, "Original video has no audio");
            }
            MuxOutcome::Failed => {
                // Degraded but successful: keep the silent video.
                tracker.append_log(job_id, "WARNING: audio mux failed, saving video without audio");
                mux::promote_silent(&temp, &out)?;
            }
        }
    } else {
        if settings.include_audio && !audio_capable {
            tracker.append_log(
                job_id,
                "WARNING: no audio tool available, producing silent video",
            );
        }
        tracker.set_progress(job_id, 75.0, "Re-encoding ASCII video...");
        match mux::reencode_silent(&temp, settings.quality, &out) {
            Ok(()) => tracker.append_log(
                job_id,
                &format!("Re-encoded ASCII video at {} quality", settings.quality),
            ),
            Err(attempt) => {
                tracker.append_log(job_id, &format!("WARNING: {}", attempt));
                mux::promote_silent(&temp, &out)?;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_progress_is_bounded_and_monotonic() {
        assert_eq!(generation_progress(0, 10), 0.0);
        assert_eq!(generation_progress(5, 10), 25.0);
        assert_eq!(generation_progress(10, 10), 50.0);
        // Metadata undershoot never pushes past the generation share.
        assert_eq!(generation_progress(14, 10), 50.0);
        assert_eq!(generation_progress(3, 0), 0.0);

        let mut prev = 0.0;
        for written in 0..=20 {
            let p = generation_progress(written, 20);
            assert!(p >= prev);
            prev = p;
        }
    }

    #[test]
    fn job_file_naming() {
        let dir = Path::new("/outputs");
        assert_eq!(temp_path(dir, "abc"), PathBuf::from("/outputs/abc_temp.mp4"));
        assert_eq!(
            final_path(dir, "abc"),
            PathBuf::from("/outputs/abc_ascii.mp4")
        );
    }

    #[test]
    fn unreadable_source_marks_job_failed_not_panicked() {
        let tracker = JobTracker::new();
        let id = JobTracker::new_job_id();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does_not_exist.mp4");
        tracker.create(&id, "does_not_exist.mp4", missing.clone());

        run(&tracker, &id, &missing, dir.path(), &Settings::default());

        let job = tracker.snapshot(&id).unwrap();
        assert!(job.completed);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
        assert!(job.output_path.is_none());
        assert!(job.logs.iter().any(|l| l.contains("ERROR")));
    }

    #[test]
    fn spawned_worker_is_joinable() {
        let tracker = JobTracker::new();
        let id = JobTracker::new_job_id();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mp4");
        tracker.create(&id, "missing.mp4", missing.clone());

        let handle = spawn(
            tracker.clone(),
            id.clone(),
            missing,
            dir.path().to_path_buf(),
            Settings::default(),
        );
        handle.join().expect("worker must not panic");
        assert!(tracker.snapshot(&id).unwrap().completed);
    }
}
