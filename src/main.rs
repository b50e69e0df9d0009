use anyhow::{anyhow, Context, Result};
use asciivid::{mux, pipeline, AppConfig, JobTracker, Quality};
use clap::Parser;
use dialoguer::FuzzySelect;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(version, about = "Convert a video into a monospaced ASCII-art video.")]
struct Args {
    /// Input video file
    input: Option<PathBuf>,

    /// Output directory for the converted video
    #[arg(long, default_value = "outputs")]
    out: PathBuf,

    /// Target character columns (width)
    #[arg(long)]
    width: Option<u32>,

    /// Contrast multiplier applied to luminance
    #[arg(long)]
    contrast: Option<f32>,

    /// Font size in pixels for the rendered glyphs
    #[arg(long)]
    font_size: Option<u32>,

    /// Character palette (detailed, simple, blocks)
    #[arg(long)]
    palette: Option<String>,

    /// Include the original audio track in the output
    #[arg(long, default_value_t = false)]
    audio: bool,

    /// Output quality tier (high, medium, low)
    #[arg(long)]
    quality: Option<Quality>,

    /// Print the full job log when the conversion finishes
    #[arg(long, default_value_t = false)]
    log_details: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !mux::ffmpeg_available() {
        eprintln!("Warning: ffmpeg not found on PATH; conversion will fail without it.");
    }

    // --- Pick input interactively when none was given ---
    let input = match args.input {
        Some(p) => p,
        None => {
            let files = find_media_files()?;
            if files.is_empty() {
                return Err(anyhow!("No media files found in current directory."));
            }
            let selection = FuzzySelect::with_theme(&dialoguer::theme::ColorfulTheme::default())
                .with_prompt("Choose an input file")
                .default(0)
                .items(&files)
                .interact()?;
            PathBuf::from(&files[selection])
        }
    };
    if !input.is_file() {
        return Err(anyhow!("Input file does not exist: {}", input.display()));
    }

    // --- Merge CLI flags over the configured defaults ---
    let cfg = AppConfig::load()?;
    let mut settings = cfg.settings(args.audio);
    if let Some(w) = args.width {
        settings.ascii_width = w;
    }
    if let Some(c) = args.contrast {
        settings.contrast = c;
    }
    if let Some(f) = args.font_size {
        settings.font_size = f;
    }
    if let Some(p) = args.palette {
        settings.palette = p;
    }
    if let Some(q) = args.quality {
        settings.quality = q;
    }
    settings.validate().map_err(|e| anyhow!(e.to_string()))?;

    // --- Start the conversion job and poll it ---
    let tracker = JobTracker::new();
    let job_id = JobTracker::new_job_id();
    let filename = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input")
        .to_string();
    tracker.create(&job_id, &filename, input.clone());

    let worker = pipeline::spawn(
        tracker.clone(),
        job_id.clone(),
        input,
        args.out.clone(),
        settings,
    );

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut logs_printed = 0;
    loop {
        let job = tracker
            .snapshot(&job_id)
            .context("job disappeared from tracker")?;
        pb.set_position(job.progress as u64);
        pb.set_message(job.status_text.clone());
        for line in &job.logs[logs_printed..] {
            pb.println(line);
        }
        logs_printed = job.logs.len();
        if job.completed {
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
    worker.join().ok();

    let job = tracker.snapshot(&job_id).unwrap();
    if let Some(error) = job.error {
        pb.finish_with_message("Failed");
        return Err(anyhow!(error));
    }
    pb.finish_with_message("Done");

    let output = job
        .output_path
        .ok_or_else(|| anyhow!("job completed without an output file"))?;
    println!("\nASCII video saved to {}", output.display());

    if args.log_details {
        println!("\n--- Conversion Log ---");
        for line in &job.logs {
            println!("{}", line);
        }
    }

    Ok(())
}

fn find_media_files() -> Result<Vec<String>> {
    Ok(WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path().extension().is_some_and(|ext| {
                    matches!(
                        ext.to_str(),
                        Some("mp4" | "mkv" | "mov" | "avi" | "webm")
                    )
                })
        })
        .map(|e| e.path().to_str().unwrap_or("").to_string())
        .collect())
}
