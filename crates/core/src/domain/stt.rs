use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── AudioSegment ────────────────────────────────────────────────

/// 文字起こし対象の音声セグメント（f32 mono PCM）。
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// セグメント固有ID (UUID v4)
    pub id: Uuid,
    /// 録音開始時刻 (UTC)
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// セグメント長 (ミリ秒)
    pub duration_ms: u32,
    /// サンプルレート (Hz)
    pub sample_rate: u32,
    /// PCMサンプル
    pub samples: Vec<f32>,
}

impl AudioSegment {
    /// サンプル列から AudioSegment を生成する。duration_ms は自動算出。
    pub fn new(
        samples: Vec<f32>,
        sample_rate: u32,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let duration_ms = if sample_rate > 0 {
            ((samples.len() as f64 / sample_rate as f64) * 1000.0) as u32
        } else {
            0
        };
        Self {
            id: Uuid::new_v4(),
            started_at,
            duration_ms,
            sample_rate,
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ─── Transcript ──────────────────────────────────────────────────

/// 文字起こし結果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// 信頼度スコア (0.0–1.0)。エンジンが提供しない場合は None。
    pub confidence: Option<f32>,
}

// ─── SttError ────────────────────────────────────────────────────

/// STT処理で発生するエラー。
#[derive(Debug, Clone)]
pub struct SttError {
    pub kind: SttErrorKind,
    pub detail: String,
    /// 同じ操作のやり直しで回復可能かどうか
    pub recoverable: bool,
}

impl std::fmt::Display for SttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SttError::{:?}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for SttError {}

/// STTエラー種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SttErrorKind {
    /// STTエンジンが利用不可
    EngineNotAvailable,
    /// 文字起こし処理中のエラー
    TranscriptionFailed,
    /// 発話が検出されなかった
    NoSpeech,
    /// 録音セッションが既に動作中 / 未開始
    SessionState,
}

impl SttError {
    pub fn engine_not_available(detail: impl Into<String>) -> Self {
        Self { kind: SttErrorKind::EngineNotAvailable, detail: detail.into(), recoverable: false }
    }

    pub fn transcription_failed(detail: impl Into<String>) -> Self {
        Self { kind: SttErrorKind::TranscriptionFailed, detail: detail.into(), recoverable: true }
    }

    pub fn no_speech() -> Self {
        Self { kind: SttErrorKind::NoSpeech, detail: "No speech detected".into(), recoverable: true }
    }

    pub fn session_state(detail: impl Into<String>) -> Self {
        Self { kind: SttErrorKind::SessionState, detail: detail.into(), recoverable: true }
    }
}

// ─── SttContext ──────────────────────────────────────────────────

/// STTエンジンに渡すコンテキスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SttContext {
    /// 言語指定 (例: "es-ES")
    pub language: Option<String>,
}

// ─── SttEngine trait ─────────────────────────────────────────────

/// STTエンジンのコアトレイト。
#[async_trait::async_trait]
pub trait SttEngine: Send + Sync {
    /// 音声セグメントを文字起こしする。
    async fn transcribe(
        &self,
        audio: &AudioSegment,
        ctx: &SttContext,
    ) -> Result<Transcript, SttError>;

    /// エンジン名 (例: "noop")。
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_segment_new_computes_duration() {
        let seg = AudioSegment::new(vec![0.0f32; 16000], 16000, chrono::Utc::now());
        assert_eq!(seg.duration_ms, 1000);
        assert!(!seg.is_empty());
    }

    #[test]
    fn audio_segment_new_zero_rate() {
        let seg = AudioSegment::new(vec![0.0f32; 100], 0, chrono::Utc::now());
        assert_eq!(seg.duration_ms, 0);
    }

    #[test]
    fn stt_error_constructors() {
        let e = SttError::engine_not_available("model missing");
        assert_eq!(e.kind, SttErrorKind::EngineNotAvailable);
        assert!(!e.recoverable);

        let e = SttError::no_speech();
        assert_eq!(e.kind, SttErrorKind::NoSpeech);
        assert!(e.recoverable);
    }

    #[test]
    fn stt_error_display() {
        let msg = format!("{}", SttError::transcription_failed("engine crashed"));
        assert!(msg.contains("TranscriptionFailed"));
        assert!(msg.contains("engine crashed"));
    }
}
