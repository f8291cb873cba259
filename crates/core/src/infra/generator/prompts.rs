/// シナリオ・フィードバック生成用プロンプトテンプレート
use crate::domain::settings::CefrLevel;
use crate::domain::types::{ConversationMessage, MessageRole};

/// 学習者の発話に付けるラベル
pub const LEARNER_LABEL: &str = "You";
/// 話者名の無い assistant メッセージのラベル
pub const PARTNER_LABEL: &str = "Partner";

/// シナリオ生成: JSON のみで応答させる
pub const SYSTEM_SCENARIO: &str = "\
You write short role-play dialogues for language learners.
Reply with a single JSON object and nothing else, using this shape:
{\"participants\": [\"<name 1>\", \"<name 2>\"], \"lines\": [{\"speaker\": \"<name>\", \"text\": \"<line>\"}]}
Rules:
- Exactly two participants. The second participant is the learner.
- Every line's speaker must be one of the two participant names, spelled identically.
- Alternate speakers, starting with the first participant.
- Write 4 to 6 lines, all in the target language.";

/// フィードバック生成: JSON のみで応答させる
pub const SYSTEM_FEEDBACK: &str = "\
You are a friendly language tutor reviewing one reply written by a learner.
Reply with a single JSON object and nothing else, using this shape:
{\"grammar_phrase\": \"<explanation>\", \"suggested_rewrite\": \"<rewrite>\"}
Rules:
- grammar_phrase explains the most useful grammar or phrasing point in one or two sentences, in English.
- suggested_rewrite is a natural version of the learner's reply in the target language.
- If the reply is already correct, say so and offer a more idiomatic alternative.";

/// シナリオ生成プロンプトを構築する
pub fn build_scenario_prompt(
    category: &str,
    scenario: &str,
    level: CefrLevel,
    language: &str,
) -> String {
    format!(
        "Target language: {language}\n\
         Learner level (CEFR): {level}\n\
         Category: {category}\n\
         Scenario: {scenario}\n\n\
         Write the dialogue for this scenario using vocabulary and grammar suitable for a {level} learner."
    )
}

/// フィードバック用の会話コンテキストを描画する。
///
/// system / feedback と、今回の発話と同一の user メッセージは除外する。
pub fn render_context(transcript: &[ConversationMessage], utterance: &str) -> String {
    transcript
        .iter()
        .filter(|m| !matches!(m.role, MessageRole::System | MessageRole::Feedback))
        .filter(|m| !(m.role == MessageRole::User && m.text == utterance))
        .map(|m| {
            let label = match m.role {
                MessageRole::User => LEARNER_LABEL,
                _ => m.speaker.as_deref().unwrap_or(PARTNER_LABEL),
            };
            format!("{label}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// フィードバック生成プロンプトを構築する
pub fn build_feedback_prompt(
    language: &str,
    context: &str,
    utterance: &str,
    level: CefrLevel,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Target language: {language}\n"));
    prompt.push_str(&format!("Learner level (CEFR): {level}\n\n"));

    if !context.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Learner's reply:\n");
    prompt.push_str(utterance);
    prompt.push_str(&format!(
        "\n\nGive feedback appropriate for a {level} learner."
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::spoken(MessageRole::Assistant, "Camarero", "¿Qué desea?"),
            ConversationMessage::spoken(MessageRole::User, "Cliente", "Un café."),
            ConversationMessage::system("Your turn!"),
            ConversationMessage::user("Quiero pan"),
            ConversationMessage::feedback("Grammar & phrasing: use 'quisiera' UNIQUE_FB"),
            ConversationMessage::new(MessageRole::Assistant, "Claro.", None),
            ConversationMessage::user("Y agua"),
        ]
    }

    #[test]
    fn test_context_excludes_system_feedback_and_current() {
        let ctx = render_context(&transcript(), "Y agua");
        assert!(!ctx.contains("UNIQUE_FB"));
        assert!(!ctx.contains("Your turn!"));
        assert!(!ctx.contains("Y agua"));
        assert_eq!(
            ctx,
            "Camarero: ¿Qué desea?\nYou: Un café.\nYou: Quiero pan\nPartner: Claro."
        );
    }

    #[test]
    fn test_context_empty_transcript() {
        assert_eq!(render_context(&[], "hola"), "");
    }

    #[test]
    fn test_scenario_prompt_contents() {
        let p = build_scenario_prompt("Restaurant", "Order dinner", CefrLevel::B1, "Spanish");
        assert!(p.contains("Spanish"));
        assert!(p.contains("B1"));
        assert!(p.contains("Restaurant"));
        assert!(p.contains("Order dinner"));
    }

    #[test]
    fn test_feedback_prompt_contents() {
        let p = build_feedback_prompt("Spanish", "Camarero: Hola", "Hola, una mesa", CefrLevel::A2);
        assert!(p.contains("Spanish"));
        assert!(p.contains("Camarero: Hola"));
        assert!(p.contains("Hola, una mesa"));
        assert!(p.contains("A2"));
    }

    #[test]
    fn test_feedback_prompt_without_context() {
        let p = build_feedback_prompt("Spanish", "", "Hola", CefrLevel::A1);
        assert!(!p.contains("Conversation so far"));
    }
}
