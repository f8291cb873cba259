use async_trait::async_trait;

use crate::domain::stt::{AudioSegment, SttContext, SttEngine, SttError, Transcript};

/// NoopSttEngine: 固定文字列を返すモック実装。
/// 実機の音声認識が使えない環境（CLI デモ、テスト）向け。
pub struct NoopSttEngine {
    text: String,
}

impl NoopSttEngine {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for NoopSttEngine {
    fn default() -> Self {
        Self::new("Hola, quisiera practicar un poco.")
    }
}

#[async_trait]
impl SttEngine for NoopSttEngine {
    async fn transcribe(
        &self,
        _audio: &AudioSegment,
        _ctx: &SttContext,
    ) -> Result<Transcript, SttError> {
        Ok(Transcript {
            text: self.text.clone(),
            confidence: Some(1.0),
        })
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_stt_returns_fixed_text() {
        let stt = NoopSttEngine::new("buenos días");
        let audio = AudioSegment::new(vec![0.0; 100], 16000, chrono::Utc::now());
        let result = stt.transcribe(&audio, &SttContext::default()).await.unwrap();

        assert_eq!(result.text, "buenos días");
        assert_eq!(result.confidence, Some(1.0));
    }

    #[test]
    fn test_noop_name() {
        assert_eq!(NoopSttEngine::default().name(), "noop");
    }
}
