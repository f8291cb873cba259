use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::prompts;
use super::{FeedbackGenerator, GeneratorError, ScenarioGenerator};
use crate::domain::settings::LlmSettings;
use crate::domain::types::{FeedbackResult, ScenarioSpec};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Claude API を使用したシナリオ/フィードバック生成器
pub struct ClaudeGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

impl ClaudeGenerator {
    pub fn new(settings: &LlmSettings) -> Result<Self, GeneratorError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GeneratorError::Unavailable("Claude API key is not configured".into()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GeneratorError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, GeneratorError> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout
                } else {
                    GeneratorError::Failed(format!("HTTP request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Failed(format!(
                "Claude API error: {status} - {body}"
            )));
        }

        let msg_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Failed(format!("Response parse error: {e}")))?;

        let text = msg_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(GeneratorError::Malformed("Empty response from Claude API".to_string()));
        }

        Ok(text)
    }
}

/// 応答テキストから JSON オブジェクト部分を取り出してデコードする
fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, GeneratorError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(GeneratorError::Malformed("no JSON object in reply".to_string())),
    };
    serde_json::from_str(body).map_err(|e| GeneratorError::Malformed(format!("JSON decode: {e}")))
}

#[async_trait]
impl ScenarioGenerator for ClaudeGenerator {
    async fn generate(&self, prompt: &str) -> Result<ScenarioSpec, GeneratorError> {
        let text = self.complete(prompts::SYSTEM_SCENARIO, prompt).await?;
        let spec: ScenarioSpec = parse_json_reply(&text)?;
        if spec.lines.is_empty() {
            return Err(GeneratorError::Malformed("scenario has no lines".to_string()));
        }
        Ok(spec)
    }

    fn name(&self) -> &str {
        "claude"
    }
}

#[async_trait]
impl FeedbackGenerator for ClaudeGenerator {
    async fn generate(&self, prompt: &str) -> Result<FeedbackResult, GeneratorError> {
        let text = self.complete(prompts::SYSTEM_FEEDBACK, prompt).await?;
        let feedback: FeedbackResult = parse_json_reply(&text)?;
        feedback.validate().map_err(GeneratorError::Malformed)?;
        Ok(feedback)
    }

    fn name(&self) -> &str {
        "claude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_key(key: Option<&str>) -> LlmSettings {
        LlmSettings {
            api_key: key.map(str::to_string),
            ..LlmSettings::default()
        }
    }

    #[test]
    fn test_claude_generator_name() {
        let generator = ClaudeGenerator::new(&settings_with_key(Some("test-key"))).unwrap();
        assert_eq!(ScenarioGenerator::name(&generator), "claude");
        assert_eq!(FeedbackGenerator::name(&generator), "claude");
    }

    #[test]
    fn test_missing_key_is_unavailable() {
        assert!(matches!(
            ClaudeGenerator::new(&settings_with_key(None)),
            Err(GeneratorError::Unavailable(_))
        ));
        assert!(matches!(
            ClaudeGenerator::new(&settings_with_key(Some("  "))),
            Err(GeneratorError::Unavailable(_))
        ));
    }

    #[test]
    fn test_parse_json_reply_tolerates_fences() {
        let text = "```json\n{\"grammar_phrase\": \"ok\", \"suggested_rewrite\": \"Hola.\"}\n```";
        let fb: FeedbackResult = parse_json_reply(text).unwrap();
        assert_eq!(fb.suggested_rewrite, "Hola.");
    }

    #[test]
    fn test_parse_json_reply_rejects_prose() {
        let result: Result<FeedbackResult, _> = parse_json_reply("Sure! Here is feedback.");
        assert!(matches!(result, Err(GeneratorError::Malformed(_))));
    }
}
