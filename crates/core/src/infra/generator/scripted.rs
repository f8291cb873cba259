use async_trait::async_trait;

use super::{FeedbackGenerator, GeneratorError, ScenarioGenerator};
use crate::domain::types::{FeedbackResult, ScenarioLine, ScenarioSpec};

/// ScriptedGenerator: LLM を使わず決まった応答を返す生成器。
/// API キーが無い環境のデモ用。
pub struct ScriptedGenerator;

const PARTNER: &str = "Alex";
const LEARNER: &str = "Sam";

/// プロンプト中の "Scenario: ..." 行を取り出す
fn scenario_line(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("Scenario:"))
        .map(str::trim)
        .unwrap_or("a casual chat")
}

/// 先頭を大文字にし、文末記号が無ければピリオドを付ける
fn tidy(utterance: &str) -> String {
    let trimmed = utterance.trim();
    let mut chars = trimmed.chars();
    let mut out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if !out.ends_with(&['.', '!', '?'][..]) {
        out.push('.');
    }
    out
}

#[async_trait]
impl ScenarioGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<ScenarioSpec, GeneratorError> {
        let scenario = scenario_line(prompt);
        let line = |speaker: &str, text: String| ScenarioLine {
            speaker: speaker.to_string(),
            text,
        };
        Ok(ScenarioSpec {
            participants: vec![PARTNER.to_string(), LEARNER.to_string()],
            lines: vec![
                line(PARTNER, format!("Hi! Let's practice: {scenario}.")),
                line(LEARNER, "Sounds good. Where do we start?".to_string()),
                line(PARTNER, "Tell me what you would say first.".to_string()),
                line(LEARNER, "Let me think for a second.".to_string()),
            ],
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[async_trait]
impl FeedbackGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<FeedbackResult, GeneratorError> {
        let utterance = prompt
            .split("Learner's reply:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\n").next())
            .unwrap_or("")
            .trim();
        if utterance.is_empty() {
            return Err(GeneratorError::Malformed("prompt has no learner reply".to_string()));
        }
        Ok(FeedbackResult {
            grammar_phrase: "Start sentences with a capital letter and close them with punctuation."
                .to_string(),
            suggested_rewrite: tidy(utterance),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
