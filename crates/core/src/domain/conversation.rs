use serde::Serialize;

use super::error::AppError;
use super::types::{ConversationMessage, FeedbackResult, MessageRole, ScenarioSpec};

/// シナリオ末尾に付ける「あなたの番」メッセージ
pub const YOUR_TURN_TEXT: &str = "Your turn! Reply to continue the conversation, by voice or by typing.";
pub const GRAMMAR_LABEL: &str = "Grammar & phrasing";
pub const REWRITE_LABEL: &str = "Suggested rewrite";

/// 会話フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConversationPhase {
    Idle,
    GeneratingScenario,
    Active,
    /// フィードバック生成待ち（pending は未完了の発話数）
    AwaitingFeedback { pending: usize },
}

impl ConversationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::GeneratingScenario => "generating_scenario",
            Self::Active => "active",
            Self::AwaitingFeedback { .. } => "awaiting_feedback",
        }
    }

    /// 発話・録音を受け付けるフェーズか
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Active | Self::AwaitingFeedback { .. })
    }
}

/// 状態遷移（ログ用）
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub prev_state: String,
    pub new_state: ConversationPhase,
}

/// オーケストレータが単独で所有する可変状態
#[derive(Debug, Clone)]
pub struct OrchestratorState {
    phase: ConversationPhase,
    is_recording: bool,
    selected_category: Option<String>,
    selected_scenario_prompt: Option<String>,
    last_error: Option<String>,
    transcript: Vec<ConversationMessage>,
    audio_level: f32,
    /// 開始・リセットごとに進む世代番号。古い世代の結果は破棄する
    epoch: u64,
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self {
            phase: ConversationPhase::Idle,
            is_recording: false,
            selected_category: None,
            selected_scenario_prompt: None,
            last_error: None,
            transcript: Vec::new(),
            audio_level: 0.0,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        &self.transcript
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn transition(&mut self, new_state: ConversationPhase) -> StateTransition {
        let prev = self.phase.as_str().to_string();
        self.phase = new_state;
        StateTransition {
            prev_state: prev,
            new_state,
        }
    }

    fn check_epoch(&self, epoch: u64, op: &str) -> Result<(), AppError> {
        if epoch != self.epoch {
            return Err(AppError::invalid_state(format!(
                "{op}: 世代 {epoch} の結果は破棄されました（現在 {}）",
                self.epoch
            )));
        }
        Ok(())
    }

    /// 任意のフェーズ → GeneratingScenario。トランスクリプトと録音状態を消去し新しい世代を返す
    pub fn begin_scenario(&mut self, category: &str, prompt: &str) -> (u64, StateTransition) {
        self.epoch += 1;
        self.transcript.clear();
        self.is_recording = false;
        self.audio_level = 0.0;
        self.last_error = None;
        self.selected_category = Some(category.to_string());
        self.selected_scenario_prompt = Some(prompt.to_string());
        let t = self.transition(ConversationPhase::GeneratingScenario);
        (self.epoch, t)
    }

    /// GeneratingScenario → Active（成功）
    pub fn finish_scenario(
        &mut self,
        epoch: u64,
        messages: Vec<ConversationMessage>,
    ) -> Result<StateTransition, AppError> {
        self.check_epoch(epoch, "finish_scenario")?;
        match self.phase {
            ConversationPhase::GeneratingScenario => {
                self.transcript.extend(messages);
                self.transcript.push(ConversationMessage::system(YOUR_TURN_TEXT));
                Ok(self.transition(ConversationPhase::Active))
            }
            other => Err(AppError::invalid_state(format!(
                "finish_scenario は {} 状態では実行できません",
                other.as_str()
            ))),
        }
    }

    /// GeneratingScenario → Active（失敗）。エラーを載せた system メッセージを1件追加
    pub fn fail_scenario(
        &mut self,
        epoch: u64,
        error: &AppError,
    ) -> Result<StateTransition, AppError> {
        self.check_epoch(epoch, "fail_scenario")?;
        match self.phase {
            ConversationPhase::GeneratingScenario => {
                self.transcript.push(ConversationMessage::system(format!(
                    "Sorry, the scenario could not be generated: {}",
                    error.message
                )));
                self.last_error = Some(error.diagnostic());
                Ok(self.transition(ConversationPhase::Active))
            }
            other => Err(AppError::invalid_state(format!(
                "fail_scenario は {} 状態では実行できません",
                other.as_str()
            ))),
        }
    }

    /// 発話を受理: Active / AwaitingFeedback → AwaitingFeedback
    pub fn accept_utterance(&mut self, text: &str) -> Result<(u64, StateTransition), AppError> {
        let pending = match self.phase {
            ConversationPhase::Active => 0,
            ConversationPhase::AwaitingFeedback { pending } => pending,
            other => {
                return Err(AppError::invalid_state(format!(
                    "accept_utterance は {} 状態では実行できません",
                    other.as_str()
                )))
            }
        };
        self.transcript.push(ConversationMessage::user(text));
        let t = self.transition(ConversationPhase::AwaitingFeedback {
            pending: pending + 1,
        });
        Ok((self.epoch, t))
    }

    fn complete_one_feedback(&mut self, op: &str) -> Result<StateTransition, AppError> {
        match self.phase {
            ConversationPhase::AwaitingFeedback { pending } if pending > 1 => {
                Ok(self.transition(ConversationPhase::AwaitingFeedback {
                    pending: pending - 1,
                }))
            }
            ConversationPhase::AwaitingFeedback { .. } => {
                Ok(self.transition(ConversationPhase::Active))
            }
            other => Err(AppError::invalid_state(format!(
                "{op} は {} 状態では実行できません",
                other.as_str()
            ))),
        }
    }

    /// フィードバック成功: 2件の feedback メッセージを追加
    pub fn finish_feedback(
        &mut self,
        epoch: u64,
        result: &FeedbackResult,
    ) -> Result<StateTransition, AppError> {
        self.check_epoch(epoch, "finish_feedback")?;
        let t = self.complete_one_feedback("finish_feedback")?;
        self.transcript.extend(feedback_messages(result));
        Ok(t)
    }

    /// フィードバック失敗: エラーを載せた feedback メッセージを1件追加
    pub fn fail_feedback(
        &mut self,
        epoch: u64,
        error: &AppError,
    ) -> Result<StateTransition, AppError> {
        self.check_epoch(epoch, "fail_feedback")?;
        let t = self.complete_one_feedback("fail_feedback")?;
        self.transcript.push(ConversationMessage::feedback(format!(
            "Feedback unavailable: {}",
            error.message
        )));
        self.last_error = Some(error.diagnostic());
        Ok(t)
    }

    /// 録音開始。既に録音中なら Err
    pub fn begin_recording(&mut self) -> Result<u64, AppError> {
        if self.is_recording {
            return Err(AppError::invalid_state("既に録音中です"));
        }
        if !self.phase.accepts_input() {
            return Err(AppError::invalid_state(format!(
                "begin_recording は {} 状態では実行できません",
                self.phase.as_str()
            )));
        }
        self.is_recording = true;
        self.audio_level = 0.0;
        Ok(self.epoch)
    }

    /// 録音終了（終端イベント受信時）。世代が古ければ何もしない
    pub fn end_recording(&mut self, epoch: u64) -> Result<(), AppError> {
        self.check_epoch(epoch, "end_recording")?;
        self.is_recording = false;
        self.audio_level = 0.0;
        Ok(())
    }

    pub fn set_audio_level(&mut self, epoch: u64, level: f32) {
        if epoch == self.epoch && self.is_recording {
            self.audio_level = level.clamp(0.0, 1.0);
        }
    }

    /// 音声入力の失敗を system メッセージとして記録する
    pub fn record_speech_failure(&mut self, epoch: u64, error: &AppError) -> Result<(), AppError> {
        self.check_epoch(epoch, "record_speech_failure")?;
        self.is_recording = false;
        self.audio_level = 0.0;
        self.transcript.push(ConversationMessage::system(format!(
            "Speech input failed: {}",
            error.message
        )));
        self.last_error = Some(error.diagnostic());
        Ok(())
    }

    /// どのフェーズからでも Idle に戻す。selected_category は保持
    pub fn reset(&mut self) -> StateTransition {
        self.epoch += 1;
        self.transcript.clear();
        self.is_recording = false;
        self.audio_level = 0.0;
        self.transition(ConversationPhase::Idle)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            phase: self.phase,
            has_started_conversation: self.phase != ConversationPhase::Idle,
            is_generating_scenario: self.phase == ConversationPhase::GeneratingScenario,
            is_processing_feedback: matches!(
                self.phase,
                ConversationPhase::AwaitingFeedback { .. }
            ),
            is_recording: self.is_recording,
            audio_level: self.audio_level,
            selected_category: self.selected_category.clone(),
            selected_scenario_prompt: self.selected_scenario_prompt.clone(),
            last_error: self.last_error.clone(),
            transcript: self.transcript.clone(),
        }
    }
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self::new()
    }
}

/// 表示層に公開する読み取り専用スナップショット
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub phase: ConversationPhase,
    pub has_started_conversation: bool,
    pub is_generating_scenario: bool,
    pub is_processing_feedback: bool,
    pub is_recording: bool,
    pub audio_level: f32,
    pub selected_category: Option<String>,
    pub selected_scenario_prompt: Option<String>,
    pub last_error: Option<String>,
    pub transcript: Vec<ConversationMessage>,
}

/// シナリオをトランスクリプトのメッセージ列に変換する。
///
/// 参加者がちょうど2人なら2人目（学習者役）の台詞を user、それ以外を assistant にする。
/// 2人でなければ全台詞を assistant として扱う。2人なのに参加者外の話者がいれば契約違反。
pub fn scenario_messages(spec: &ScenarioSpec) -> Result<Vec<ConversationMessage>, AppError> {
    let Some(learner) = spec.learner() else {
        log::warn!(
            "参加者数が {} 人のため全台詞を assistant として扱います",
            spec.participants.len()
        );
        return Ok(spec
            .lines
            .iter()
            .map(|line| {
                ConversationMessage::spoken(MessageRole::Assistant, &line.speaker, &line.text)
            })
            .collect());
    };

    if let Some(line) = spec.unknown_speaker() {
        return Err(AppError::malformed_output(format!(
            "speaker '{}' is not one of the participants {:?}",
            line.speaker, spec.participants
        )));
    }

    Ok(spec
        .lines
        .iter()
        .map(|line| {
            let role = if line.speaker == learner {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            ConversationMessage::spoken(role, &line.speaker, &line.text)
        })
        .collect())
}

/// フィードバック結果を2件のメッセージ（説明 → 書き換え案）にする
pub fn feedback_messages(result: &FeedbackResult) -> [ConversationMessage; 2] {
    [
        ConversationMessage::feedback(format!("{GRAMMAR_LABEL}: {}", result.grammar_phrase)),
        ConversationMessage::feedback(format!("{REWRITE_LABEL}: {}", result.suggested_rewrite)),
    ]
}
