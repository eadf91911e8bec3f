pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_ENV: &str = "VDCFLOW_CONFIG";

const CONFIG_FILE: &str = "vdcflow.yaml";
const CONFIG_DIR: &str = ".vdcflow";
const GLOBAL_CONFIG_FILE: &str = "config.yaml";

/// エンジン全体の設定
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// install のリトライ設定
    pub retry: RetrySettings,
    /// デプロイ完了待ちのポーリング設定
    pub poll: PollSettings,
    /// 状態ファイルの保存先（未指定時はメモリ上のみ）
    pub state_dir: Option<PathBuf>,
}

/// リトライ対象とするエラーの範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryScope {
    /// すべてのエラーをリトライする（従来の挙動）
    #[default]
    Always,
    /// 一時的なエラーのみリトライする
    Transient,
}

/// install のリトライ設定（Exponential Backoff）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_secs: f64,
    pub multiplier: f64,
    pub scope: RetryScope,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_secs: 3.0,
            multiplier: 2.0,
            scope: RetryScope::Always,
        }
    }
}

/// 範囲外の値は `Duration::ZERO` / `Duration::MAX` に丸める
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        secs(self.initial_delay_secs)
    }
}

/// デプロイ完了待ちのポーリング設定（固定間隔）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: f64,
    pub timeout_secs: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5.0,
            timeout_secs: 60.0,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}

impl EngineConfig {
    /// 設定値の整合性を確認
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("retry.initial_delay_secs", self.retry.initial_delay_secs),
            ("retry.multiplier", self.retry.multiplier),
            ("poll.interval_secs", self.poll.interval_secs),
            ("poll.timeout_secs", self.poll.timeout_secs),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{} には有限の値を指定してください",
                    field
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts は 1 以上を指定してください".to_string(),
            ));
        }
        if !(self.retry.initial_delay_secs >= 0.0) {
            return Err(ConfigError::Invalid(
                "retry.initial_delay_secs は 0 以上を指定してください".to_string(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "retry.multiplier は 1 以上を指定してください".to_string(),
            ));
        }
        if !(self.poll.interval_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "poll.interval_secs は 0 より大きい値を指定してください".to_string(),
            ));
        }
        if self.poll.timeout_secs < self.poll.interval_secs {
            return Err(ConfigError::Invalid(
                "poll.timeout_secs は poll.interval_secs 以上を指定してください".to_string(),
            ));
        }
        Ok(())
    }

    /// YAMLファイルから設定を読み込む
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// 設定ファイルを探して読み込む。見つからなければデフォルト値を返す
    pub fn discover() -> Result<Self> {
        match find_config_file()? {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// vdcflowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("vdcflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 VDCFLOW_CONFIG (直接パス指定)
/// 2. カレントディレクトリ: vdcflow.yaml
/// 3. ./.vdcflow/ ディレクトリ内: vdcflow.yaml
/// 4. ~/.config/vdcflow/config.yaml (グローバル設定)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    let path = current_dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(Some(path));
    }

    // 3. ./.vdcflow/ ディレクトリで検索
    let path = current_dir.join(CONFIG_DIR).join(CONFIG_FILE);
    if path.exists() {
        return Ok(Some(path));
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("vdcflow").join(GLOBAL_CONFIG_FILE);
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
