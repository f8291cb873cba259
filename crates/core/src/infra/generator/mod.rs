pub mod claude;
pub mod prompts;
mod scripted;

pub use scripted::ScriptedGenerator;

use async_trait::async_trait;

use crate::domain::error::AppError;
use crate::domain::types::{FeedbackResult, ScenarioSpec};

/// 生成器エラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeneratorError {
    #[error("Generator not available: {0}")]
    Unavailable(String),
    #[error("Generation failed: {0}")]
    Failed(String),
    #[error("Malformed generator output: {0}")]
    Malformed(String),
    #[error("Generation timeout")]
    Timeout,
}

impl From<GeneratorError> for AppError {
    fn from(e: GeneratorError) -> Self {
        match e {
            GeneratorError::Unavailable(_) => AppError::generator_unavailable(e.to_string()),
            GeneratorError::Malformed(_) => AppError::malformed_output(e.to_string()),
            GeneratorError::Failed(_) | GeneratorError::Timeout => {
                AppError::generator_failed(e.to_string())
            }
        }
    }
}

/// シナリオ生成器（LLM）
#[async_trait]
pub trait ScenarioGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ScenarioSpec, GeneratorError>;

    fn name(&self) -> &str;
}

/// 文法フィードバック生成器（LLM）
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<FeedbackResult, GeneratorError>;

    fn name(&self) -> &str;
}
