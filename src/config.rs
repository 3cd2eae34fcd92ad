use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::exercise::ExerciseKind;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// 待ち受けアドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// フレームごとのレポートをログに出す
    #[serde(default)]
    pub verbose: bool,
}

fn default_listen_addr() -> String { "0.0.0.0:5000".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            verbose: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// セッション開始時の種目
    #[serde(default = "default_exercise")]
    pub default_exercise: String,
    /// 参照ランドマークの可視度がこれ未満なら「人物なし」扱い (0で無効)
    #[serde(default)]
    pub min_visibility: f32,
}

fn default_exercise() -> String { ExerciseKind::PullUp.name().to_string() }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_exercise: default_exercise(),
            min_visibility: 0.0,
        }
    }
}

impl AnalysisConfig {
    pub fn exercise(&self) -> Result<ExerciseKind> {
        Ok(self.default_exercise.parse::<ExerciseKind>()?)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        config.analysis.exercise()?;
        Ok(config)
    }

    /// 読み込めなければデフォルト設定を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config: {:#} (using defaults)", e);
                Self::default()
            }
        }
    }
}
