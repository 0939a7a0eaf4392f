//! End-to-end engine tests. Skipped when FFmpeg is not installed.

use image::{Rgb, RgbImage};
use lapcmp_media::{
    analyze_pair, analyze_segments, check_ffmpeg, check_ffprobe, cut_segment, probe_video,
    EngineConfig, MediaError,
};
use lapcmp_models::{Insights, SegmentRange};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const FPS: u32 = 30;

fn ffmpeg_available() -> bool {
    if check_ffmpeg().is_ok() && check_ffprobe().is_ok() {
        return true;
    }
    eprintln!("ffmpeg/ffprobe not found, skipping");
    false
}

/// Solid background with one rectangle sliding right at `speed` px/frame.
fn moving_rect_frame(index: u32, speed: f32) -> RgbImage {
    let left = (10.0 + index as f32 * speed) as u32 % (WIDTH - 30);
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        if x >= left && x < left + 30 && (40..80).contains(&y) {
            Rgb([230, 200, 40])
        } else {
            Rgb([30, 60, 120])
        }
    })
}

async fn write_video(path: &Path, frames: u32, speed: f32) {
    let mut child = Command::new("ffmpeg")
        .args([
            "-y",
            "-v",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", WIDTH, HEIGHT),
            "-framerate",
            &FPS.to_string(),
            "-i",
            "pipe:0",
            "-c:v",
            "mpeg4",
            "-q:v",
            "2",
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(path)
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    for i in 0..frames {
        stdin
            .write_all(moving_rect_frame(i, speed).as_raw())
            .await
            .unwrap();
    }
    drop(stdin);
    assert!(child.wait().await.unwrap().success());
}

async fn write_test_source(path: &Path, seconds: u32) {
    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={}:size={}x{}:rate=25", seconds, WIDTH, HEIGHT),
            "-c:v",
            "mpeg4",
            "-g",
            "1",
        ])
        .arg(path)
        .status()
        .await
        .unwrap();
    assert!(status.success());
}

fn read_deltas(path: &Path) -> Vec<(f64, f64)> {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("distance,deltaT"));
    lines
        .map(|line| {
            let (d, t) = line.split_once(',').unwrap();
            (d.parse().unwrap(), t.parse().unwrap())
        })
        .collect()
}

#[tokio::test]
async fn test_pair_end_to_end() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let lap_a = dir.path().join("lapA.mp4");
    let lap_b = dir.path().join("lapB.mp4");
    write_video(&lap_a, 2 * FPS, 1.0).await;
    write_video(&lap_b, 2 * FPS, 2.0).await;

    let out = dir.path().join("out");
    let outcome = analyze_pair(&lap_a, &lap_b, &out, &EngineConfig::default())
        .await
        .unwrap();

    assert_eq!(outcome.summary, "Analysis complete");
    assert_eq!(
        outcome.files,
        vec!["overlay.mp4", "metrics.csv", "insights.json"]
    );
    for file in &outcome.files {
        assert!(out.join(file).exists(), "{} missing", file);
    }

    let rows = read_deltas(&out.join("metrics.csv"));
    assert!(!rows.is_empty());
    assert!(rows.windows(2).all(|w| w[1].0 >= w[0].0));
    assert!(rows.iter().all(|(_, dt)| dt.abs() <= 2.0 + 1e-9));

    let insights: Insights =
        serde_json::from_slice(&std::fs::read(out.join("insights.json")).unwrap()).unwrap();
    assert_eq!(insights, Insights::default());

    let overlay = probe_video(out.join("overlay.mp4")).await.unwrap();
    assert_eq!((overlay.width, overlay.height), (2 * WIDTH, HEIGHT));
    assert!((overlay.fps.unwrap() - FPS as f64).abs() < 0.5);
}

#[tokio::test]
async fn test_single_frame_input_is_insufficient_motion() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let still = dir.path().join("still.mp4");
    let moving = dir.path().join("moving.mp4");
    write_video(&still, 1, 0.0).await;
    write_video(&moving, 10, 2.0).await;

    let err = analyze_pair(&still, &moving, dir.path().join("out"), &EngineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::InsufficientMotion(_)), "{err}");
    assert!(!dir.path().join("out").join("overlay.mp4").exists());
}

#[tokio::test]
async fn test_segment_to_end_of_source() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.mp4");
    write_test_source(&source, 4).await;
    let source_duration = probe_video(&source).await.unwrap().duration;

    let tail = dir.path().join("tail.mp4");
    cut_segment(&source, &tail, SegmentRange::new(1.0, 0.0))
        .await
        .unwrap();
    let tail_duration = probe_video(&tail).await.unwrap().duration;
    assert!(
        (tail_duration - (source_duration - 1.0)).abs() < 0.25,
        "source {source_duration}, tail {tail_duration}"
    );

    let middle = dir.path().join("middle.mp4");
    cut_segment(&source, &middle, SegmentRange::new(0.5, 2.0))
        .await
        .unwrap();
    let middle_duration = probe_video(&middle).await.unwrap().duration;
    assert!((middle_duration - 1.5).abs() < 0.25, "middle {middle_duration}");
}

#[tokio::test]
async fn test_segment_failure_is_reported() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.mp4");
    std::fs::write(&bogus, b"not a video").unwrap();

    let err = cut_segment(&bogus, dir.path().join("A.mp4"), SegmentRange::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::SegmentExtraction { .. }), "{err}");
}

#[tokio::test]
async fn test_segments_end_to_end() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("video.mp4");
    write_test_source(&source, 4).await;

    let out = dir.path().join("out");
    let outcome = analyze_segments(
        &source,
        SegmentRange::new(0.0, 2.0),
        SegmentRange::new(2.0, 0.0),
        &out,
        &EngineConfig::default(),
    )
    .await
    .unwrap();

    assert!(out.join("A.mp4").exists());
    assert!(out.join("B.mp4").exists());
    assert_eq!(outcome.files.len(), 3);
}
