use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 練習設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSettings {
    /// 学習対象言語（プロンプトに埋め込む表示名）
    pub target_language: String,
    /// 目標 CEFR レベル
    pub cefr_level: CefrLevel,
    /// シナリオ一覧 JSON のパス（None なら組み込みデフォルト）
    pub catalog_path: Option<PathBuf>,
    /// LLM 接続設定
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Claude API キー（None ならオフライン生成器を使う）
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// CEFR レベル（A1 が最も低い）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }
}

impl std::fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CefrLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Ok(Self::A1),
            "A2" => Ok(Self::A2),
            "B1" => Ok(Self::B1),
            "B2" => Ok(Self::B2),
            "C1" => Ok(Self::C1),
            "C2" => Ok(Self::C2),
            other => Err(format!("unknown CEFR level: {other}")),
        }
    }
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            target_language: "Spanish".to_string(),
            cefr_level: CefrLevel::A2,
            catalog_path: None,
            llm: LlmSettings::default(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            timeout_secs: 30,
        }
    }
}

impl PracticeSettings {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 設定ファイルを読み込む。欠損・破損時はデフォルトにフォールバック
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                log::info!("設定ファイルを読めないためデフォルトを使用: {} ({e})", path.display());
                return Self::default();
            }
        };
        match Self::from_json_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("設定ファイルが不正なためデフォルトを使用: {} ({e})", path.display());
                Self::default()
            }
        }
    }
}
