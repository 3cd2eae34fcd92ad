//! Replays recorded landmark frames (JSON lines) through a coaching session.
//!
//! Each line: `{"exercise": "squat", "landmarks": [{"x":..,"y":..,"z":..,"visibility":..}, ...]}`.
//! `exercise` may be omitted to keep the current one; an empty `landmarks`
//! list is a frame with no person.

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use rep_coach::config::Config;
use rep_coach::exercise::ExerciseKind;
use rep_coach::pose::{Landmark, Pose};
use rep_coach::session::Session;

const CONFIG_PATH: &str = "coach.toml";

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    #[serde(default)]
    exercise: Option<String>,
    #[serde(default)]
    landmarks: Vec<Landmark>,
}

fn main() -> Result<()> {
    let mut json_output = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json_output = true,
            _ if path.is_none() => path = Some(arg),
            other => bail!("unexpected argument: {}", other),
        }
    }
    let Some(path) = path else {
        bail!("usage: landmark_replay [--json] FRAMES.jsonl");
    };

    let config = Config::load_or_default(CONFIG_PATH);
    let mut session = Session::from_config(config.analysis.exercise()?, &config.analysis);

    let file = File::open(&path).with_context(|| format!("failed to open {}", path))?;
    let mut frames = 0u32;
    let mut missing = 0u32;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid frame", line_no + 1))?;

        if let Some(name) = &frame.exercise {
            let exercise = name
                .parse::<ExerciseKind>()
                .with_context(|| format!("line {}", line_no + 1))?;
            if session.set_exercise(exercise) {
                eprintln!("line {}: exercise -> {} (counter reset)", line_no + 1, exercise);
            }
        }

        let pose = Pose::from_landmarks(&frame.landmarks)
            .with_context(|| format!("line {}", line_no + 1))?;
        let report = session.analyze(pose.as_ref());
        frames += 1;
        if !report.has_pose {
            missing += 1;
        }

        if json_output {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "{:>5} {} reps={} stage={} angle={:.1} score={} | {}",
                frames,
                report.exercise,
                report.count,
                report.stage.map(|s| s.as_str()).unwrap_or("-"),
                report.primary_angle,
                report.score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                report.feedback
            );
        }
    }

    let summary = session.summary();
    eprintln!(
        "Frames: {}, no person: {}, {} reps: {}, avg score: {}",
        frames,
        missing,
        summary.exercise,
        summary.reps,
        summary.avg_score.map(|s| format!("{:.1}", s)).unwrap_or_else(|| "-".to_string())
    );
    for rep in &summary.rep_metrics {
        eprintln!(
            "  rep {:>3}: frames {}-{} peak={:.1} score={} issues={}",
            rep.rep_index,
            rep.start_frame,
            rep.end_frame,
            rep.peak_angle,
            rep.score,
            rep.issues.len()
        );
    }
    Ok(())
}
