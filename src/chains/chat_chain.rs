use anyhow::Result;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::ServiceError;
use crate::i18n::Language;
use crate::memory::{ChatMemory, ChatTurn};
use crate::models::schemas::{ChatRequest, ChatResponse};
use crate::services::MedicalLanguageModel;

fn chat_system_prompt(language: Language) -> String {
    format!(
        "You are Medicare AI, a friendly medical assistant. Answer health questions with \
         accurate, evidence-based information in plain language. Ask a clarifying question \
         when the request is ambiguous. Never give a definitive diagnosis or prescribe \
         medication, and tell the user to seek emergency care right away when symptoms \
         sound serious. {}",
        language.prompt_instruction()
    )
}

/// 对话链：读取会话历史，调用模型并记录本轮问答
pub async fn get_chat_response(
    llm: &dyn MedicalLanguageModel,
    memory: &ChatMemory,
    config: &ChatConfig,
    request: &ChatRequest,
) -> Result<ChatResponse> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ServiceError::invalid("message is empty").into());
    }
    if message.chars().count() > config.max_message_chars {
        return Err(ServiceError::invalid(format!(
            "message exceeds {} characters",
            config.max_message_chars
        ))
        .into());
    }

    let session_id = request
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let history = memory.history(&session_id).await;
    let language = request.language();
    let answer = llm
        .chat(&chat_system_prompt(language), &history, message)
        .await?;

    memory
        .record_exchange(
            &session_id,
            ChatTurn::user(message),
            ChatTurn::assistant(answer.clone()),
        )
        .await;

    info!(session = %session_id, history_turns = history.len(), "chat response generated");
    Ok(ChatResponse {
        response: answer,
        language,
        session_id,
        disclaimer: language.disclaimer().to_string(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::testing::MockLanguageModel;
    use crate::memory::ChatRole;

    fn request(message: &str, session_id: Option<&str>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            language: Some(Language::English),
            session_id: session_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_new_session_id_generated() {
        let llm = MockLanguageModel::default();
        let memory = ChatMemory::default();
        let config = ChatConfig::default();

        let response = get_chat_response(&llm, &memory, &config, &request("I have a headache", None))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&response.session_id).is_ok());
        assert_eq!(response.response, "Drink water and rest.");
        assert_eq!(response.disclaimer, Language::English.disclaimer());
        assert_eq!(memory.history(&response.session_id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_history_passed_to_model() {
        let llm = MockLanguageModel::default();
        let memory = ChatMemory::default();
        let config = ChatConfig::default();

        get_chat_response(&llm, &memory, &config, &request("first", Some("s1")))
            .await
            .unwrap();
        get_chat_response(&llm, &memory, &config, &request("second", Some("s1")))
            .await
            .unwrap();

        let histories = llm.histories();
        assert!(histories[0].is_empty());
        assert_eq!(histories[1].len(), 2);
        assert_eq!(histories[1][0].role, ChatRole::User);
        assert_eq!(histories[1][0].content, "first");
    }

    #[tokio::test]
    async fn test_language_instruction_in_system_prompt() {
        let llm = MockLanguageModel::default();
        let mut chat = request("J'ai de la fièvre", None);
        chat.language = Some(Language::French);

        let response = get_chat_response(&llm, &ChatMemory::default(), &ChatConfig::default(), &chat)
            .await
            .unwrap();
        assert_eq!(response.language, Language::French);
        assert!(llm.last_system_prompt().unwrap().contains("Répondez en français"));
    }

    #[tokio::test]
    async fn test_message_validation() {
        let llm = MockLanguageModel::default();
        let memory = ChatMemory::default();
        let config = ChatConfig {
            max_message_chars: 5,
            ..Default::default()
        };

        for message in ["   ", "too long message"] {
            let err = get_chat_response(&llm, &memory, &config, &request(message, None))
                .await
                .unwrap_err();
            assert!(matches!(
                ServiceError::find(&err),
                Some(ServiceError::InvalidRequest(_))
            ));
        }
        assert_eq!(memory.session_count().await, 0);
    }
}
