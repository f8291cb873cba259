use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::error::AppError;

/// シナリオ一覧の読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Catalog parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Catalog has no scenarios")]
    Empty,
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        AppError::resource_load(e.to_string())
    }
}

/// カテゴリ1件分
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category: String,
    pub scenarios: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    scenarios: Vec<CategoryEntry>,
}

/// カテゴリ → シナリオプロンプト一覧（ファイル順を保持）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioCatalog {
    entries: Vec<CategoryEntry>,
}

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "Restaurant",
        &[
            "Ordering dinner at a busy restaurant",
            "Asking the waiter about vegetarian options",
            "Paying the bill and splitting it with a friend",
        ],
    ),
    (
        "Travel",
        &[
            "Checking in at a hotel reception",
            "Buying a train ticket at the station",
            "Asking a local for directions to the museum",
        ],
    ),
    (
        "Shopping",
        &[
            "Trying on clothes and asking for another size",
            "Buying fruit at a market stall",
        ],
    ),
    (
        "Small Talk",
        &[
            "Meeting a new neighbour in the hallway",
            "Chatting with a colleague about the weekend",
        ],
    ),
];

impl ScenarioCatalog {
    /// 組み込みのデフォルト一覧
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(category, scenarios)| CategoryEntry {
                category: category.to_string(),
                scenarios: scenarios.iter().map(|s| s.to_string()).collect(),
            })
            .collect();
        Self { entries }
    }

    /// `{ "scenarios": [ { "category": ..., "scenarios": [...] } ] }` を解析する
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        let entries: Vec<CategoryEntry> = doc
            .scenarios
            .into_iter()
            .filter(|e| !e.category.trim().is_empty())
            .collect();
        if entries.iter().all(|e| e.scenarios.is_empty()) {
            return Err(CatalogError::Empty);
        }
        Ok(Self { entries })
    }

    pub fn try_load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// ファイルから読み込む。欠損・破損時は組み込み一覧にフォールバック
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(catalog) => {
                log::info!(
                    "シナリオ一覧を読み込みました: {} ({} カテゴリ)",
                    path.display(),
                    catalog.entries.len()
                );
                catalog
            }
            Err(e) => {
                let err = AppError::from(e);
                log::warn!(
                    "シナリオ一覧を使用できないため組み込み一覧を使用: {} ({})",
                    path.display(),
                    err.diagnostic()
                );
                Self::builtin()
            }
        }
    }

    pub fn categories(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.category.as_str()).collect()
    }

    /// カテゴリのプロンプト一覧（未登録なら空）
    pub fn prompts(&self, category: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.category == category)
            .map(|e| e.scenarios.as_slice())
            .unwrap_or(&[])
    }

    /// カテゴリ内から一様ランダムに1件選ぶ
    pub fn random_prompt(&self, category: &str) -> Option<String> {
        self.random_prompt_with(category, &mut rand::thread_rng())
    }

    pub fn random_prompt_with<R: Rng + ?Sized>(&self, category: &str, rng: &mut R) -> Option<String> {
        self.prompts(category).choose(rng).cloned()
    }
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SAMPLE: &str = r#"{
        "scenarios": [
            { "category": "Restaurant", "scenarios": ["Order tapas"] },
            { "category": "Airport", "scenarios": ["Check a bag", "Lost luggage"] },
            { "category": "Empty", "scenarios": [] }
        ]
    }"#;

    #[test]
    fn test_parse_preserves_order() {
        let catalog = ScenarioCatalog::from_json_str(SAMPLE).unwrap();
        assert_eq!(catalog.categories(), vec!["Restaurant", "Airport", "Empty"]);
        assert_eq!(catalog.prompts("Airport").len(), 2);
        assert!(catalog.prompts("Unknown").is_empty());
    }

    #[test]
    fn test_random_prompt_picks_from_category() {
        let catalog = ScenarioCatalog::from_json_str(SAMPLE).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let p = catalog.random_prompt_with("Airport", &mut rng).unwrap();
            assert!(p == "Check a bag" || p == "Lost luggage");
        }
        assert_eq!(catalog.random_prompt("Restaurant").as_deref(), Some("Order tapas"));
        assert!(catalog.random_prompt("Empty").is_none());
        assert!(catalog.random_prompt("Unknown").is_none());
    }

    #[test]
    fn test_malformed_document_is_error() {
        assert!(matches!(
            ScenarioCatalog::from_json_str("{ \"scenarios\": 3 }"),
            Err(CatalogError::Parse(_))
        ));
        assert!(matches!(
            ScenarioCatalog::from_json_str(r#"{ "scenarios": [] }"#),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn test_load_malformed_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.json");
        std::fs::write(&path, "not json at all").unwrap();
        let catalog = ScenarioCatalog::load(&path);
        assert!(!catalog.categories().is_empty());
        assert_eq!(catalog, ScenarioCatalog::builtin());
    }

    #[test]
    fn test_load_missing_falls_back_to_builtin() {
        let catalog = ScenarioCatalog::load(Path::new("/nonexistent/scenarios.json"));
        assert!(!catalog.categories().is_empty());
    }

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let catalog = ScenarioCatalog::load(&path);
        assert_eq!(catalog.prompts("Restaurant"), &["Order tapas".to_string()]);
    }

    #[test]
    fn test_builtin_every_category_has_prompts() {
        let catalog = ScenarioCatalog::builtin();
        for category in catalog.categories() {
            assert!(!catalog.prompts(category).is_empty(), "{category}");
        }
    }
}
