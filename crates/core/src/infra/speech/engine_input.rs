use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{SpeechEvent, SpeechInput, SpeechSession};
use crate::domain::stt::{AudioSegment, SttContext, SttEngine, SttError};
use crate::infra::audio::level;

/// SttEngine を使った音声入力。
///
/// 録音中は push_samples で渡された PCM を蓄積し、レベルを通知する。
/// stop でセグメント全体を書き起こし、Final / Failed を1回だけ送る。
pub struct EngineSpeechInput {
    engine: Arc<dyn SttEngine>,
    ctx: SttContext,
    sample_rate: u32,
    active: Mutex<Option<Capture>>,
}

struct Capture {
    started_at: chrono::DateTime<chrono::Utc>,
    samples: Vec<f32>,
    tx: mpsc::UnboundedSender<SpeechEvent>,
}

impl EngineSpeechInput {
    pub fn new(engine: Arc<dyn SttEngine>, sample_rate: u32, language: Option<String>) -> Self {
        Self {
            engine,
            ctx: SttContext { language },
            sample_rate,
            active: Mutex::new(None),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.active.lock().is_some()
    }

    /// 録音中のサンプルを追加する。録音中でなければ false
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        let mut active = self.active.lock();
        let Some(capture) = active.as_mut() else {
            return false;
        };
        capture.samples.extend_from_slice(samples);
        let _ = capture
            .tx
            .send(SpeechEvent::Level(level::normalized_level(samples)));
        true
    }
}

#[async_trait]
impl SpeechInput for EngineSpeechInput {
    fn start(&self) -> Result<SpeechSession, SttError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(SttError::session_state("recording is already in progress"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *active = Some(Capture {
            started_at: chrono::Utc::now(),
            samples: Vec::new(),
            tx,
        });
        log::info!("録音開始 (engine: {})", self.engine.name());
        Ok(SpeechSession::new(rx))
    }

    async fn stop(&self) {
        let Some(capture) = self.active.lock().take() else {
            log::debug!("stop: 録音中ではありません");
            return;
        };

        let audio = AudioSegment::new(capture.samples, self.sample_rate, capture.started_at);
        log::info!("録音終了: {} ms, 書き起こし開始", audio.duration_ms);

        let event = match self.engine.transcribe(&audio, &self.ctx).await {
            Ok(transcript) if transcript.text.trim().is_empty() => {
                SpeechEvent::Failed(SttError::no_speech())
            }
            Ok(transcript) => {
                log::info!("書き起こし完了 (confidence: {:?})", transcript.confidence);
                SpeechEvent::Final(transcript.text)
            }
            Err(e) => {
                log::error!("STT error: {}", e);
                SpeechEvent::Failed(e)
            }
        };
        let _ = capture.tx.send(event);
    }

    fn cancel(&self) {
        if self.active.lock().take().is_some() {
            log::info!("録音を破棄しました");
        }
    }

    fn name(&self) -> &str {
        self.engine.name()
    }
}
