use axum::{Json, extract::State, extract::rejection::JsonRejection};
use medicare_ai::context::AppContext;
use medicare_ai::{ChatRequest, ChatResponse, get_chat_response};

use super::{ApiError, with_timeout};

/// POST /chat
pub async fn chat(
    State(context): State<AppContext>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(mut request) = body?;
    request
        .language
        .get_or_insert(context.settings().default_language);
    let llm = context.gemini_service();
    let response = with_timeout(
        &context,
        get_chat_response(
            llm.as_ref(),
            context.memory(),
            &context.settings().chat,
            &request,
        ),
    )
    .await?;
    Ok(Json(response))
}
