use tokio::sync::watch;

use pp_core::domain::conversation::{ConversationPhase, StateSnapshot};
use pp_core::domain::types::{ConversationMessage, MessageRole};

/// メッセージ1件を端末表示用の1行にする
pub fn format_message(msg: &ConversationMessage) -> String {
    match (msg.role, msg.speaker.as_deref()) {
        (MessageRole::System, _) => format!("* {}", msg.text),
        (MessageRole::Feedback, _) => format!("  > {}", msg.text),
        (MessageRole::User, None) => format!("You: {}", msg.text),
        (_, Some(speaker)) => format!("{speaker}: {}", msg.text),
        (MessageRole::Assistant, None) => format!("Partner: {}", msg.text),
    }
}

/// 発話が受け付けられなかった理由を現在のフェーズから選ぶ
pub fn rejected_utterance_message(phase: ConversationPhase) -> &'static str {
    match phase {
        ConversationPhase::Idle => "会話が始まっていません（/new で開始）",
        ConversationPhase::GeneratingScenario => "シナリオを生成中です。完了してから話してください",
        ConversationPhase::Active | ConversationPhase::AwaitingFeedback { .. } => {
            "発話を送信できませんでした"
        }
    }
}

/// 表示済み位置を覚えておき、スナップショットから未表示の行を取り出す
#[derive(Default)]
pub struct TranscriptFollower {
    /// 最後に表示したメッセージの id
    last_shown: Option<u128>,
    was_generating: bool,
    was_recording: bool,
}

impl TranscriptFollower {
    /// 新しく表示すべき行を返す
    pub fn update(&mut self, snap: &StateSnapshot) -> Vec<String> {
        let mut out = Vec::new();

        if snap.is_generating_scenario && !self.was_generating {
            out.push("(シナリオを生成中…)".to_string());
        }
        if snap.is_recording && !self.was_recording {
            out.push("(録音中… /stop で確定)".to_string());
        }
        self.was_generating = snap.is_generating_scenario;
        self.was_recording = snap.is_recording;

        let start = self
            .last_shown
            .and_then(|id| snap.transcript.iter().position(|m| m.id.as_u128() == id))
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let fresh = &snap.transcript[start..];
        if start == 0 && self.last_shown.is_some() && !snap.has_started_conversation {
            out.push("(会話をリセットしました)".to_string());
        }
        out.extend(fresh.iter().map(format_message));
        if let Some(last) = snap.transcript.last() {
            self.last_shown = Some(last.id.as_u128());
        } else if !snap.has_started_conversation {
            self.last_shown = None;
        }
        out
    }
}

/// スナップショットの変化を購読して標準出力に書き続ける
pub async fn follow(mut rx: watch::Receiver<StateSnapshot>) {
    let mut follower = TranscriptFollower::default();
    loop {
        let lines = {
            let snap = rx.borrow_and_update();
            follower.update(&snap)
        };
        for line in lines {
            println!("{line}");
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pp_core::domain::conversation::OrchestratorState;
    use pp_core::domain::error::AppError;

    #[test]
    fn test_format_message() {
        assert_eq!(format_message(&ConversationMessage::user("hola")), "You: hola");
        assert_eq!(
            format_message(&ConversationMessage::spoken(MessageRole::User, "Cliente", "Gracias.")),
            "Cliente: Gracias."
        );
        assert_eq!(format_message(&ConversationMessage::system("Your turn!")), "* Your turn!");
        assert_eq!(
            format_message(&ConversationMessage::feedback("Suggested rewrite: Hola.")),
            "  > Suggested rewrite: Hola."
        );
    }

    #[test]
    fn test_rejected_utterance_message_follows_phase() {
        assert!(rejected_utterance_message(ConversationPhase::Idle).contains("/new"));
        assert!(rejected_utterance_message(ConversationPhase::GeneratingScenario).contains("生成中"));

        let mut state = OrchestratorState::new();
        state.begin_scenario("Travel", "Buy a ticket");
        let phase = state.snapshot().phase;
        assert_eq!(phase, ConversationPhase::GeneratingScenario);
        assert!(!rejected_utterance_message(phase).contains("始まっていません"));
    }

    #[test]
    fn test_follower_prints_only_new_lines() {
        let mut state = OrchestratorState::new();
        let mut follower = TranscriptFollower::default();

        let (epoch, _) = state.begin_scenario("Travel", "Buy a ticket");
        assert_eq!(follower.update(&state.snapshot()), vec!["(シナリオを生成中…)"]);

        state
            .fail_scenario(epoch, &AppError::generator_failed("offline"))
            .unwrap();
        let lines = follower.update(&state.snapshot());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("offline"));

        assert!(follower.update(&state.snapshot()).is_empty());

        state.reset();
        assert_eq!(follower.update(&state.snapshot()), vec!["(会話をリセットしました)"]);
        assert!(follower.update(&state.snapshot()).is_empty());
    }
}
