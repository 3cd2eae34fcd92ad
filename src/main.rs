use anyhow::Result;
use std::io::{self, Write};
use rep_coach::config::Config;
use rep_coach::exercise::{pose_with_angles, ExerciseKind};
use rep_coach::protocol::FrameReport;
use rep_coach::session::Session;

const CONFIG_PATH: &str = "coach.toml";

/// 種目ごとの「良い姿勢」角度
fn neutral_posture(exercise: ExerciseKind) -> f32 {
    exercise.posture_rule().target
}

fn print_report(report: &FrameReport) {
    println!(
        "  reps={} stage={} angle={:.1} score={}",
        report.count,
        report.stage.map(|s| s.as_str()).unwrap_or("-"),
        report.primary_angle,
        report.score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("  {}", report.feedback);
}

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let mut session = Session::from_config(config.analysis.exercise()?, &config.analysis);

    println!("=== Rep Coach - Console ===");
    println!("種目: {}", session.exercise());
    println!();
    println!("コマンド:");
    println!("  e NAME        - 種目を変更 (pullup / squat / shoulderabduction)");
    println!("  a DEG [POST]  - 主角度 DEG (姿勢角度 POST) のフレームを入力 (例: a 80)");
    println!("  n             - 人物なしのフレームを入力");
    println!("  r             - カウンターをリセット");
    println!("  s             - 現在の状態を表示");
    println!("  q             - 終了");
    println!();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();

        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "e" if parts.len() == 2 => match parts[1].parse::<ExerciseKind>() {
                Ok(exercise) => {
                    if session.set_exercise(exercise) {
                        println!("種目を {} に変更しました (カウンターをリセット)", exercise);
                    } else {
                        println!("種目は {} のままです", exercise);
                    }
                }
                Err(e) => println!("{}", e),
            },
            "a" if parts.len() == 2 || parts.len() == 3 => {
                let primary: f32 = parts[1].parse()?;
                let posture: f32 = match parts.get(2) {
                    Some(p) => p.parse()?,
                    None => neutral_posture(session.exercise()),
                };
                let pose = pose_with_angles(session.exercise(), primary, posture);
                print_report(&session.analyze(Some(&pose)));
            }
            "n" => {
                print_report(&session.analyze(None));
            }
            "r" => {
                session.reset();
                println!("リセットしました");
            }
            "s" => {
                println!("現在の状態:");
                println!("  種目: {}", session.exercise());
                println!("  レップ: {}", session.count());
                println!("  ステージ: {}", session.stage().map(|s| s.as_str()).unwrap_or("-"));
                let summary = session.summary();
                match summary.avg_score {
                    Some(avg) => println!("  平均スコア: {:.1}", avg),
                    None => println!("  平均スコア: -"),
                }
                for rep in &summary.rep_metrics {
                    println!("    #{} 最深 {:.1}度 スコア {}", rep.rep_index, rep.peak_angle, rep.score);
                }
            }
            "q" => {
                println!("終了します");
                break;
            }
            _ => {
                println!("不明なコマンド: {}", parts[0]);
            }
        }
    }

    Ok(())
}
