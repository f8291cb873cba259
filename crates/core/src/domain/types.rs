use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// トランスクリプト上のメッセージ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// 文法フィードバック。以降の生成コンテキストには含めない
    Feedback,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Feedback => "feedback",
        }
    }
}

/// 会話メッセージ（生成後は不変）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub speaker: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, text: impl Into<String>, speaker: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            speaker,
            timestamp: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text, None)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text, None)
    }

    pub fn feedback(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Feedback, text, None)
    }

    /// シナリオ台詞用（話者名付き）
    pub fn spoken(role: MessageRole, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(role, text, Some(speaker.into()))
    }
}

/// シナリオの台詞1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioLine {
    pub speaker: String,
    pub text: String,
}

/// 生成されたロールプレイシナリオ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub participants: Vec<String>,
    pub lines: Vec<ScenarioLine>,
}

impl ScenarioSpec {
    /// 学習者役（2人目の参加者）。参加者がちょうど2人でなければ None
    pub fn learner(&self) -> Option<&str> {
        match self.participants.as_slice() {
            [_, second] => Some(second.as_str()),
            _ => None,
        }
    }

    /// 参加者に含まれない話者を持つ最初の台詞を返す
    pub fn unknown_speaker(&self) -> Option<&ScenarioLine> {
        self.lines
            .iter()
            .find(|line| !self.participants.iter().any(|p| p == &line.speaker))
    }
}

/// 1発話に対する文法フィードバック
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResult {
    pub grammar_phrase: String,
    pub suggested_rewrite: String,
}

impl FeedbackResult {
    /// 説明・書き換え案のどちらかが空なら Err
    pub fn validate(&self) -> Result<(), String> {
        if self.grammar_phrase.trim().is_empty() {
            return Err("grammar explanation is empty".to_string());
        }
        if self.suggested_rewrite.trim().is_empty() {
            return Err("suggested rewrite is empty".to_string());
        }
        Ok(())
    }
}
