//! Run the alignment engine on local files.
//!
//! ```text
//! lapcmp-analyze pair LAP_A LAP_B OUT_DIR
//! lapcmp-analyze segments VIDEO A_START A_END B_START B_END OUT_DIR
//! ```
//!
//! An end of 0 means "to the end of the video".

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use lapcmp_media::{analyze_pair, analyze_segments, EngineConfig};
use lapcmp_models::SegmentRange;

const USAGE: &str = "usage:\n  lapcmp-analyze pair LAP_A LAP_B OUT_DIR\n  lapcmp-analyze segments VIDEO A_START A_END B_START B_END OUT_DIR";

enum Command {
    Pair {
        lap_a: PathBuf,
        lap_b: PathBuf,
        out_dir: PathBuf,
    },
    Segments {
        video: PathBuf,
        seg_a: SegmentRange,
        seg_b: SegmentRange,
        out_dir: PathBuf,
    },
}

fn seconds(arg: &str) -> Result<f64> {
    arg.parse::<f64>()
        .with_context(|| format!("not a number of seconds: {arg}"))
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args {
        [mode, a, b, out] if mode == "pair" => Ok(Command::Pair {
            lap_a: a.into(),
            lap_b: b.into(),
            out_dir: out.into(),
        }),
        [mode, video, a0, a1, b0, b1, out] if mode == "segments" => Ok(Command::Segments {
            video: video.into(),
            seg_a: SegmentRange::new(seconds(a0)?, seconds(a1)?),
            seg_b: SegmentRange::new(seconds(b0)?, seconds(b1)?),
            out_dir: out.into(),
        }),
        _ => bail!("{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    lapcmp_worker::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    let engine = EngineConfig::from_env();

    let (outcome, out_dir) = match command {
        Command::Pair {
            lap_a,
            lap_b,
            out_dir,
        } => (analyze_pair(&lap_a, &lap_b, &out_dir, &engine).await?, out_dir),
        Command::Segments {
            video,
            seg_a,
            seg_b,
            out_dir,
        } => (
            analyze_segments(&video, seg_a, seg_b, &out_dir, &engine).await?,
            out_dir,
        ),
    };

    info!(out_dir = %out_dir.display(), files = ?outcome.files, "{}", outcome.summary);
    for file in &outcome.files {
        println!("{}", out_dir.join(file).display());
    }
    Ok(())
}
