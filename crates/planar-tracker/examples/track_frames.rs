//! Track the sheet through a sequence of image files.
//!
//! Usage: track_frames <config.json> <frame>... [--report out.json]

use std::{env, path::PathBuf, time::Instant};

use image::ImageReader;
use planar_tracker::{detect, TrackReport, TrackStatus, TrackerConfig};
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let mut args = env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("Usage: track_frames <config.json> <frame>... [--report out.json]");
        return Ok(());
    };

    let mut frames = Vec::new();
    let mut report_path = PathBuf::from("track_report.json");
    while let Some(arg) = args.next() {
        if arg == "--report" {
            if let Some(p) = args.next() {
                report_path = PathBuf::from(p);
            }
        } else {
            frames.push(PathBuf::from(arg));
        }
    }

    let config = TrackerConfig::load_json(&config_path)?;
    let mut tracker = config.build_tracker()?;
    let mut report = TrackReport::new(Some(config));

    for path in &frames {
        let img = ImageReader::open(path)?.decode()?.to_rgb8();
        let start = Instant::now();
        let result = detect::process_rgb_image(&mut tracker, &img);
        let elapsed = start.elapsed();

        match (&result.status, &result.pose) {
            (TrackStatus::Accepted, Some(pose)) => println!(
                "{}: accepted t=({:.1}, {:.1}, {:.1}) rmse={:.2}px in {:.1?}",
                path.display(),
                pose.tvec.x,
                pose.tvec.y,
                pose.tvec.z,
                result.rmse.unwrap_or(f64::NAN),
                elapsed
            ),
            (status, _) => println!("{}: {status:?} in {elapsed:.1?}", path.display()),
        }
        report.push(Some(path.display().to_string()), result);
    }

    let s = report.summary();
    println!(
        "{} frames: {} accepted, {} rejected, {} persisted, {} lost",
        s.frames, s.accepted, s.rejected, s.persisted, s.lost
    );
    report.write_json(&report_path)?;
    println!("wrote report to {}", report_path.display());
    Ok(())
}

fn init_logging() {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
    #[cfg(not(feature = "tracing"))]
    let _ = planar_tracker::core::init_with_level(log::LevelFilter::Info);
}
