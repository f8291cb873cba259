mod engine_input;
mod noop;

pub use engine_input::EngineSpeechInput;
pub use noop::NoopSttEngine;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::error::AppError;
use crate::domain::stt::SttError;

/// 音声入力セッションから届くイベント
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    /// レベルメーター値 (0.0〜1.0)
    Level(f32),
    /// 途中経過の書き起こし
    Partial(String),
    /// 最終結果（終端）
    Final(String),
    /// 失敗（終端）
    Failed(SttError),
}

impl SpeechEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final(_) | Self::Failed(_))
    }
}

impl From<SttError> for AppError {
    fn from(e: SttError) -> Self {
        AppError::speech_input(e.detail)
    }
}

/// 録音セッション1回分のイベント受信口。
///
/// セッションごとに専用チャネルを持つ。終端イベントの後は None を返す。
pub struct SpeechSession {
    events: mpsc::UnboundedReceiver<SpeechEvent>,
    finished: bool,
}

impl SpeechSession {
    pub fn new(events: mpsc::UnboundedReceiver<SpeechEvent>) -> Self {
        Self {
            events,
            finished: false,
        }
    }

    /// 次のイベントを待つ。送信側が閉じられたか終端済みなら None
    pub async fn next_event(&mut self) -> Option<SpeechEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await?;
        if event.is_terminal() {
            self.finished = true;
        }
        Some(event)
    }

    /// 途中イベントを読み捨てて終端結果だけを返す
    #[cfg(test)]
    pub(crate) async fn terminal(mut self) -> Option<Result<String, SttError>> {
        while let Some(event) = self.next_event().await {
            match event {
                SpeechEvent::Final(text) => return Some(Ok(text)),
                SpeechEvent::Failed(e) => return Some(Err(e)),
                SpeechEvent::Level(_) | SpeechEvent::Partial(_) => {}
            }
        }
        None
    }
}

/// 音声入力ソース
#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// 録音を開始し、このセッション専用のイベント受信口を返す。
    fn start(&self) -> Result<SpeechSession, SttError>;

    /// 録音を終了する。終端イベントはセッションのチャネルに届く。
    async fn stop(&self);

    /// 録音を破棄する。終端イベントは送られずチャネルが閉じる。
    fn cancel(&self);

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_terminal_skips_interim_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SpeechEvent::Level(0.3)).unwrap();
        tx.send(SpeechEvent::Partial("ho".into())).unwrap();
        tx.send(SpeechEvent::Final("hola".into())).unwrap();
        tx.send(SpeechEvent::Final("ignored".into())).unwrap();

        let result = SpeechSession::new(rx).terminal().await;
        assert_eq!(result.unwrap().unwrap(), "hola");
    }

    #[tokio::test]
    async fn test_no_events_after_terminal() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SpeechEvent::Failed(SttError::no_speech())).unwrap();
        tx.send(SpeechEvent::Level(0.1)).unwrap();

        let mut session = SpeechSession::new(rx);
        assert!(matches!(session.next_event().await, Some(SpeechEvent::Failed(_))));
        assert!(session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_channel_has_no_terminal() {
        let (tx, rx) = mpsc::unbounded_channel::<SpeechEvent>();
        drop(tx);
        assert!(SpeechSession::new(rx).terminal().await.is_none());
    }

    #[test]
    fn test_stt_error_maps_to_speech_input() {
        let e: AppError = SttError::no_speech().into();
        assert_eq!(e.code, crate::domain::error::ErrorCode::SpeechInputFailed);
    }
}
