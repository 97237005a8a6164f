use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use medicare_ai::chains::search_medical_research;
use medicare_ai::context::AppContext;
use medicare_ai::i18n::Language;
use medicare_ai::{ResearchRequest, ResearchResponse};
use serde::Deserialize;

use super::{ApiError, with_timeout};

/// GET /research 的查询参数
#[derive(Debug, Deserialize)]
pub struct ResearchParams {
    q: String,
    lang: Option<String>,
    max_results: Option<usize>,
}

async fn run_research(
    context: &AppContext,
    request: ResearchRequest,
) -> Result<Json<ResearchResponse>, ApiError> {
    let llm = context.gemini_service();
    let search = context.tavily_service();
    let response = with_timeout(
        context,
        search_medical_research(
            llm.as_ref(),
            search.as_ref(),
            &request,
            context.settings().tavily.max_results,
        ),
    )
    .await?;
    Ok(Json(response))
}

/// GET /research?q=&lang=&max_results=
pub async fn research_get(
    State(context): State<AppContext>,
    params: Result<Query<ResearchParams>, QueryRejection>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let Query(params) = params?;
    let language = match params.lang.as_deref().map(str::trim) {
        Some(lang) if !lang.is_empty() => lang
            .parse::<Language>()
            .map_err(ApiError::bad_request)?,
        _ => context.settings().default_language,
    };
    let request = ResearchRequest {
        query: params.q,
        language: Some(language),
        max_results: params.max_results,
    };
    run_research(&context, request).await
}

/// POST /research
pub async fn research_post(
    State(context): State<AppContext>,
    body: Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let Json(mut request) = body?;
    request
        .language
        .get_or_insert(context.settings().default_language);
    run_research(&context, request).await
}
