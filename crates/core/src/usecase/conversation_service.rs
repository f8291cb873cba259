use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use crate::domain::conversation::{scenario_messages, OrchestratorState, StateSnapshot};
use crate::domain::error::AppError;
use crate::domain::job::JobKind;
use crate::domain::settings::PracticeSettings;
use crate::infra::catalog::ScenarioCatalog;
use crate::infra::generator::{prompts, FeedbackGenerator, ScenarioGenerator};
use crate::infra::metrics::{Metrics, MetricsSummary, Phase};
use crate::infra::speech::{SpeechEvent, SpeechInput, SpeechSession};
use crate::usecase::job_queue::{run_cancellable, JobQueue};

/// start_conversation の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// 前提条件を満たさず何もしなかった
    Ignored,
    /// シナリオがトランスクリプトに反映された
    Ready,
    /// 生成に失敗し、エラーメッセージを反映した
    Failed,
    /// リセット・再開始により結果を破棄した
    Discarded,
}

/// フィードバックワーカーへの依頼
struct FeedbackRequest {
    epoch: u64,
    utterance: String,
    /// 発話受付時点のトランスクリプトから描画した会話コンテキスト
    context: String,
}

/// 会話オーケストレータ。
///
/// 状態の変更はすべて `Shared::mutate` の中で、await を挟まずに行う。
/// 変更のたびに watch チャネルへスナップショットを発行する。
pub struct ConversationService {
    shared: Arc<Shared>,
    feedback_tx: mpsc::UnboundedSender<FeedbackRequest>,
}

struct Shared {
    state: Mutex<OrchestratorState>,
    snapshot_tx: watch::Sender<StateSnapshot>,
    catalog: ScenarioCatalog,
    settings: PracticeSettings,
    scenario_gen: Arc<dyn ScenarioGenerator>,
    feedback_gen: Arc<dyn FeedbackGenerator>,
    speech_input: Arc<dyn SpeechInput>,
    jobs: JobQueue,
    metrics: Metrics,
    runtime: Handle,
}

impl ConversationService {
    /// Tokio ランタイム内で呼び出すこと（フィードバックワーカーを起動する）
    pub fn new(
        catalog: ScenarioCatalog,
        settings: PracticeSettings,
        scenario_gen: Arc<dyn ScenarioGenerator>,
        feedback_gen: Arc<dyn FeedbackGenerator>,
        speech_input: Arc<dyn SpeechInput>,
    ) -> Result<Self, AppError> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::internal(format!("Tokio ランタイム外で初期化されました: {e}")))?;

        let state = OrchestratorState::new();
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            snapshot_tx,
            catalog,
            settings,
            scenario_gen,
            feedback_gen,
            speech_input,
            jobs: JobQueue::new(),
            metrics: Metrics::new(),
            runtime,
        });

        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        shared
            .runtime
            .spawn(feedback_worker(shared.clone(), feedback_rx));

        log::info!(
            "ConversationService 初期化: scenario={}, feedback={}, speech={}, {} {}",
            shared.scenario_gen.name(),
            shared.feedback_gen.name(),
            shared.speech_input.name(),
            shared.settings.target_language,
            shared.settings.cefr_level
        );

        Ok(Self {
            shared,
            feedback_tx,
        })
    }

    // ==================== Conversation ====================

    /// シナリオを生成して会話を開始する。
    ///
    /// category が空、またはプロンプト未指定でカテゴリに候補が無い場合は何もしない。
    /// 実行中の生成・フィードバックはすべて破棄される。
    pub async fn start_conversation(&self, category: &str, explicit_prompt: &str) -> StartOutcome {
        if category.trim().is_empty() {
            log::debug!("start_conversation: カテゴリが空のため無視");
            return StartOutcome::Ignored;
        }

        let scenario = if explicit_prompt.trim().is_empty() {
            match self.shared.catalog.random_prompt(category) {
                Some(p) => p,
                None => {
                    log::debug!("start_conversation: カテゴリ '{category}' にシナリオがありません");
                    return StartOutcome::Ignored;
                }
            }
        } else {
            explicit_prompt.to_string()
        };

        let canceled = self.shared.jobs.cancel_all();
        if !canceled.is_empty() {
            log::info!("実行中のジョブ {} 件をキャンセル", canceled.len());
        }

        let (epoch, was_recording) = self.shared.mutate(|st| {
            let was_recording = st.is_recording();
            let (epoch, t) = st.begin_scenario(category, &scenario);
            log::info!("会話開始 [{category}] {scenario}: {} → {}", t.prev_state, t.new_state.as_str());
            (epoch, was_recording)
        });
        if was_recording {
            self.shared.speech_input.cancel();
        }
        self.shared.metrics.inc_conversations_started();

        let settings = &self.shared.settings;
        let prompt = prompts::build_scenario_prompt(
            category,
            &scenario,
            settings.cefr_level,
            &settings.target_language,
        );

        // 呼び出し側の future が破棄されても状態遷移を完了させるため、別タスクで実行する
        let (job_id, cancel_rx) = self.shared.jobs.enqueue(epoch, JobKind::Scenario);
        let handle = self.shared.runtime.spawn(
            self.shared
                .clone()
                .generate_scenario(epoch, job_id.clone(), cancel_rx, prompt),
        );
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = AppError::internal(format!("シナリオ生成タスクが異常終了しました: {e}"));
                log::error!("{}", err.diagnostic());
                self.shared.jobs.mark_failed(&job_id, err.message.clone());
                self.shared.metrics.inc_error(err.code);
                match self.shared.mutate(|st| st.fail_scenario(epoch, &err)) {
                    Ok(_) => StartOutcome::Failed,
                    Err(e) => self.shared.discard(e),
                }
            }
        }
    }

    /// 学習者の発話を受け付け、フィードバック生成を依頼する（完了は待たない）。
    ///
    /// 空白のみの発話や、会話が Active でない場合は false。
    pub fn submit_user_utterance(&self, text: &str) -> bool {
        self.shared.submit(&self.feedback_tx, text)
    }

    /// トランスクリプトを消去して Idle に戻す。実行中のジョブ・録音も破棄する
    pub fn reset_conversation(&self) {
        let canceled = self.shared.jobs.cancel_all();
        let was_recording = self.shared.mutate(|st| {
            let was_recording = st.is_recording();
            let t = st.reset();
            log::info!("会話リセット: {} → {}", t.prev_state, t.new_state.as_str());
            was_recording
        });
        if was_recording {
            self.shared.speech_input.cancel();
        }
        if !canceled.is_empty() {
            log::info!("実行中のジョブ {} 件をキャンセル", canceled.len());
        }
        self.shared.jobs.cleanup_completed();
    }

    // ==================== Speech ====================

    /// 録音を開始する。終端結果は発話として submit される
    pub fn start_recording(&self) -> bool {
        let epoch = match self.shared.mutate(|st| st.begin_recording()) {
            Ok(epoch) => epoch,
            Err(e) => {
                log::debug!("start_recording: {e}");
                return false;
            }
        };

        match self.shared.speech_input.start() {
            Ok(session) => {
                self.shared.runtime.spawn(listen_speech(
                    self.shared.clone(),
                    self.feedback_tx.clone(),
                    epoch,
                    session,
                ));
                true
            }
            Err(e) => {
                let err = AppError::from(e);
                log::warn!("録音開始失敗: {}", err.diagnostic());
                self.shared.metrics.inc_error(err.code);
                if let Err(e) = self.shared.mutate(|st| st.record_speech_failure(epoch, &err)) {
                    self.shared.discard(e);
                }
                false
            }
        }
    }

    /// 録音を終了し、書き起こしを待つ
    pub async fn stop_recording(&self) {
        if !self.shared.state.lock().is_recording() {
            return;
        }
        self.shared.speech_input.stop().await;
    }

    /// 録音を破棄する（発話は送られない）
    pub fn cancel_recording(&self) {
        self.shared.speech_input.cancel();
        if let Err(e) = self.shared.mutate(|st| {
            let epoch = st.epoch();
            st.end_recording(epoch)
        }) {
            self.shared.discard(e);
        }
    }

    // ==================== Queries ====================

    pub fn snapshot(&self) -> StateSnapshot {
        self.shared.state.lock().snapshot()
    }

    /// 状態変化の購読（表示層用）
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.shared.catalog
    }

    pub fn settings(&self) -> &PracticeSettings {
        &self.shared.settings
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.shared.metrics.summary()
    }
}

impl Shared {
    /// 状態を1回の操作として変更し、スナップショットを発行する
    fn mutate<R>(&self, f: impl FnOnce(&mut OrchestratorState) -> R) -> R {
        let mut state = self.state.lock();
        let out = f(&mut state);
        self.snapshot_tx.send_replace(state.snapshot());
        out
    }

    /// 古い世代の結果を破棄する
    fn discard(&self, reason: AppError) -> StartOutcome {
        log::debug!("結果を破棄: {reason}");
        self.metrics.inc_stale_discarded();
        StartOutcome::Discarded
    }

    /// シナリオを生成してトランスクリプトに反映する
    async fn generate_scenario(
        self: Arc<Self>,
        epoch: u64,
        job_id: String,
        cancel_rx: oneshot::Receiver<()>,
        prompt: String,
    ) -> StartOutcome {
        let start = Instant::now();
        let Some(result) = run_cancellable(self.scenario_gen.generate(&prompt), cancel_rx).await
        else {
            log::info!("シナリオ生成はキャンセルされました (epoch {epoch})");
            self.metrics.inc_stale_discarded();
            return StartOutcome::Discarded;
        };
        self.metrics
            .record_latency(Phase::Scenario, start.elapsed().as_millis() as u64);

        let outcome = match result
            .map_err(AppError::from)
            .and_then(|spec| scenario_messages(&spec))
        {
            Ok(messages) => {
                self.jobs.mark_done(&job_id);
                let line_count = messages.len();
                match self.mutate(|st| st.finish_scenario(epoch, messages)) {
                    Ok(_) => {
                        log::info!("シナリオ生成完了: {line_count} 行");
                        self.metrics.inc_scenarios_generated();
                        StartOutcome::Ready
                    }
                    Err(e) => self.discard(e),
                }
            }
            Err(err) => {
                log::warn!("シナリオ生成失敗: {}", err.diagnostic());
                self.jobs.mark_failed(&job_id, err.message.clone());
                self.metrics.inc_error(err.code);
                match self.mutate(|st| st.fail_scenario(epoch, &err)) {
                    Ok(_) => StartOutcome::Failed,
                    Err(e) => self.discard(e),
                }
            }
        };

        self.jobs.cleanup_completed();
        outcome
    }

    fn submit(&self, feedback_tx: &mpsc::UnboundedSender<FeedbackRequest>, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        // コンテキストは受付時点のトランスクリプト（この発話より後の発話を含めない）
        let accepted = self.mutate(|st| {
            let context = prompts::render_context(st.transcript(), text);
            st.accept_utterance(text).map(|(epoch, t)| (epoch, t, context))
        });
        let (epoch, context) = match accepted {
            Ok((epoch, t, context)) => {
                log::debug!("発話受付: {} → {:?}", t.prev_state, t.new_state);
                (epoch, context)
            }
            Err(e) => {
                log::debug!("submit_user_utterance: {e}");
                return false;
            }
        };
        self.metrics.inc_utterances_submitted();

        let request = FeedbackRequest {
            epoch,
            utterance: text.to_string(),
            context,
        };
        if feedback_tx.send(request).is_err() {
            let err = AppError::internal("フィードバックワーカーが停止しています");
            log::error!("{}", err.diagnostic());
            self.metrics.inc_error(err.code);
            if let Err(e) = self.mutate(|st| st.fail_feedback(epoch, &err)) {
                self.discard(e);
            }
        }
        true
    }

    /// 1発話分のフィードバックを生成し、トランスクリプトに反映する
    async fn provide_feedback(&self, request: FeedbackRequest) {
        let FeedbackRequest {
            epoch,
            utterance,
            context,
        } = request;

        if self.state.lock().epoch() != epoch {
            log::debug!("古い世代のフィードバック依頼を破棄 (epoch {epoch})");
            self.metrics.inc_stale_discarded();
            return;
        }

        let prompt = prompts::build_feedback_prompt(
            &self.settings.target_language,
            &context,
            &utterance,
            self.settings.cefr_level,
        );

        let (job_id, cancel_rx) = self.jobs.enqueue(epoch, JobKind::Feedback);
        let start = Instant::now();
        let Some(result) = run_cancellable(self.feedback_gen.generate(&prompt), cancel_rx).await
        else {
            log::info!("フィードバック生成はキャンセルされました (epoch {epoch})");
            self.metrics.inc_stale_discarded();
            return;
        };
        self.metrics
            .record_latency(Phase::Feedback, start.elapsed().as_millis() as u64);

        let result = result.map_err(AppError::from).and_then(|feedback| {
            feedback
                .validate()
                .map(|_| feedback)
                .map_err(AppError::malformed_output)
        });

        match result {
            Ok(feedback) => {
                self.jobs.mark_done(&job_id);
                match self.mutate(|st| st.finish_feedback(epoch, &feedback)) {
                    Ok(_) => {
                        log::info!("フィードバック完了");
                        self.metrics.inc_feedback_delivered();
                    }
                    Err(e) => {
                        self.discard(e);
                    }
                }
            }
            Err(err) => {
                log::warn!("フィードバック生成失敗: {}", err.diagnostic());
                self.jobs.mark_failed(&job_id, err.message.clone());
                self.metrics.inc_error(err.code);
                if let Err(e) = self.mutate(|st| st.fail_feedback(epoch, &err)) {
                    self.discard(e);
                }
            }
        }

        self.jobs.cleanup_completed();
    }
}

/// フィードバック依頼を投入順に1件ずつ処理する
async fn feedback_worker(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<FeedbackRequest>) {
    while let Some(request) = rx.recv().await {
        shared.provide_feedback(request).await;
    }
    log::debug!("フィードバックワーカー終了");
}

/// 録音セッションのイベントを状態に反映する
async fn listen_speech(
    shared: Arc<Shared>,
    feedback_tx: mpsc::UnboundedSender<FeedbackRequest>,
    epoch: u64,
    mut session: SpeechSession,
) {
    while let Some(event) = session.next_event().await {
        match event {
            SpeechEvent::Level(level) => shared.mutate(|st| st.set_audio_level(epoch, level)),
            SpeechEvent::Partial(_) => {}
            SpeechEvent::Final(text) => {
                if let Err(e) = shared.mutate(|st| st.end_recording(epoch)) {
                    shared.discard(e);
                    return;
                }
                log::info!("音声入力確定: {} 文字", text.chars().count());
                shared.submit(&feedback_tx, &text);
                return;
            }
            SpeechEvent::Failed(e) => {
                let err = AppError::from(e);
                log::warn!("音声入力失敗: {}", err.diagnostic());
                shared.metrics.inc_error(err.code);
                if let Err(e) = shared.mutate(|st| st.record_speech_failure(epoch, &err)) {
                    shared.discard(e);
                }
                return;
            }
        }
    }

    // 終端イベント無しでチャネルが閉じた（キャンセル）
    if let Err(e) = shared.mutate(|st| st.end_recording(epoch)) {
        shared.discard(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::conversation::ConversationPhase;
    use crate::domain::types::MessageRole;
    use crate::infra::generator::ScriptedGenerator;
    use crate::infra::speech::{EngineSpeechInput, NoopSttEngine};

    fn make_service() -> (ConversationService, Arc<EngineSpeechInput>) {
        let generator = Arc::new(ScriptedGenerator);
        let speech = Arc::new(EngineSpeechInput::new(
            Arc::new(NoopSttEngine::default()),
            16_000,
            Some("es".into()),
        ));
        let service = ConversationService::new(
            ScenarioCatalog::builtin(),
            PracticeSettings::default(),
            generator.clone(),
            generator,
            speech.clone(),
        )
        .unwrap();
        (service, speech)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<StateSnapshot>,
        pred: impl Fn(&StateSnapshot) -> bool,
    ) -> StateSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let snap = rx.borrow_and_update();
                    if pred(&snap) {
                        return snap.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_new_requires_runtime() {
        let generator = Arc::new(ScriptedGenerator);
        let speech = Arc::new(EngineSpeechInput::new(
            Arc::new(NoopSttEngine::default()),
            16_000,
            None,
        ));
        let result = ConversationService::new(
            ScenarioCatalog::builtin(),
            PracticeSettings::default(),
            generator.clone(),
            generator,
            speech,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_from_catalog() {
        let (service, _) = make_service();
        let outcome = service.start_conversation("Restaurant", "").await;
        assert_eq!(outcome, StartOutcome::Ready);

        let snap = service.snapshot();
        assert_eq!(snap.phase, ConversationPhase::Active);
        assert!(snap.has_started_conversation);
        assert!(!snap.is_generating_scenario);
        assert_eq!(snap.transcript.len(), 5);
        let prompt = snap.selected_scenario_prompt.unwrap();
        assert!(service.catalog().prompts("Restaurant").contains(&prompt));
    }

    #[tokio::test]
    async fn test_unknown_category_is_ignored() {
        let (service, _) = make_service();
        let before = service.snapshot();
        assert_eq!(
            service.start_conversation("Astronomy", "").await,
            StartOutcome::Ignored
        );
        assert_eq!(service.snapshot(), before);
        assert_eq!(service.metrics().conversations_started, 0);
    }

    #[tokio::test]
    async fn test_typed_utterance_gets_feedback() {
        let (service, _) = make_service();
        let mut rx = service.subscribe();
        service.start_conversation("Travel", "Buy a train ticket").await;

        assert!(service.submit_user_utterance("quiero un billete"));
        let snap = wait_for(&mut rx, |s| s.phase == ConversationPhase::Active && s.transcript.len() == 8).await;

        assert_eq!(snap.transcript[5].role, MessageRole::User);
        assert_eq!(snap.transcript[6].role, MessageRole::Feedback);
        assert!(snap.transcript[7].text.contains("Quiero un billete."));
        assert_eq!(service.metrics().feedback_delivered, 1);
    }

    #[tokio::test]
    async fn test_recording_flows_into_feedback() {
        let (service, speech) = make_service();
        let mut rx = service.subscribe();
        service.start_conversation("Small Talk", "").await;

        assert!(service.start_recording());
        assert!(service.snapshot().is_recording);
        assert!(!service.start_recording());

        assert!(speech.push_samples(&[0.25; 1600]));
        wait_for(&mut rx, |s| s.audio_level > 0.0).await;

        service.stop_recording().await;
        let snap = wait_for(&mut rx, |s| {
            !s.is_recording && s.phase == ConversationPhase::Active && s.transcript.len() == 8
        })
        .await;
        assert_eq!(snap.transcript[5].text, "Hola, quisiera practicar un poco.");
        assert_eq!(snap.audio_level, 0.0);
    }

    #[tokio::test]
    async fn test_cancel_recording_submits_nothing() {
        let (service, speech) = make_service();
        service.start_conversation("Shopping", "").await;

        assert!(service.start_recording());
        service.cancel_recording();
        assert!(!speech.is_capturing());

        let snap = service.snapshot();
        assert!(!snap.is_recording);
        assert_eq!(snap.transcript.len(), 5);
        assert_eq!(service.metrics().utterances_submitted, 0);
    }

    #[tokio::test]
    async fn test_reset_while_recording_releases_capture() {
        let (service, speech) = make_service();
        service.start_conversation("Restaurant", "").await;
        assert!(service.start_recording());

        service.reset_conversation();
        assert!(!speech.is_capturing());
        let snap = service.snapshot();
        assert!(!snap.is_recording);
        assert!(!snap.has_started_conversation);
        assert!(snap.transcript.is_empty());
    }
}
