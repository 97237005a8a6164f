use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use medicare_ai::config::Settings;
use medicare_ai::context::AppContext;
use medicare_ai::i18n::Language;
use medicare_ai::memory::{ChatMemory, ChatTurn};
use medicare_ai::services::{
    MedicalLanguageModel, SearchHit, SearchOutcome, SearchQuery, WebSearch,
};
use medicare_ai::{
    AnalysisRequest, AnalysisResponse, ChatRequest, ChatResponse, HealthCheckResponse,
    ImageAnalysisResponse, MedicalAnalysis, ResearchRequest, ResearchResponse, ResearchResult,
    analyze_medical_record, create_analysis_chain, gemini_service, get_chat_response,
    load_google_llm, load_google_vision_llm, settings, tavily_service,
};

const LIB_SOURCE: &str = include_str!("../src/lib.rs");

/// 收集lib.rs中`pub use`导出的名称
fn exported_names() -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for statement in LIB_SOURCE.split(';') {
        let code = statement
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(path) = code.trim().strip_prefix("pub use ") {
            collect_names(path, &mut names);
        }
    }
    names
}

fn collect_names(path: &str, names: &mut BTreeSet<String>) {
    let list = match (path.find('{'), path.rfind('}')) {
        (Some(start), Some(end)) => &path[start + 1..end],
        _ => path.rsplit("::").next().unwrap_or(path),
    };
    for name in list.split(',') {
        let name = name.trim();
        if !name.is_empty() {
            names.insert(name.to_string());
        }
    }
}

#[test]
fn test_facade_exports_exactly_the_public_names() {
    let expected: BTreeSet<String> = [
        "load_google_llm",
        "load_google_vision_llm",
        "settings",
        "create_analysis_chain",
        "analyze_medical_record",
        "get_chat_response",
        "ChatRequest",
        "ChatResponse",
        "AnalysisRequest",
        "AnalysisResponse",
        "MedicalAnalysis",
        "HealthCheckResponse",
        "ImageAnalysisResponse",
        "ResearchRequest",
        "ResearchResponse",
        "ResearchResult",
        "gemini_service",
        "tavily_service",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    assert_eq!(exported_names(), expected);
}

#[test]
fn test_facade_has_no_routes_or_wildcards() {
    assert!(!LIB_SOURCE.contains("routes"));
    assert!(!LIB_SOURCE.contains("server"));
    assert!(!LIB_SOURCE.contains("::*"));
}

#[test]
fn test_service_singletons_are_shared() {
    let first = gemini_service().unwrap();
    let second = gemini_service().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let first = tavily_service().unwrap();
    let second = tavily_service().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let config = settings().unwrap();
    assert!(std::ptr::eq(config, settings().unwrap()));
}

#[test]
fn test_loaders_build_without_keys() {
    let settings = Settings::default();
    let llm = load_google_llm(&settings).unwrap();
    let vision = load_google_vision_llm(&settings).unwrap();
    assert!(!llm.is_configured());
    assert_eq!(vision.model(), settings.llm.vision_model);
}

struct CannedModel;

#[async_trait]
impl MedicalLanguageModel for CannedModel {
    async fn complete(&self, _system_prompt: &str, _prompt: &str) -> Result<String> {
        Ok("- thyroid stimulating hormone high".to_string())
    }

    async fn chat(&self, _system_prompt: &str, history: &[ChatTurn], _message: &str) -> Result<String> {
        Ok(format!("answer #{}", history.len() / 2 + 1))
    }

    async fn extract_analysis(&self, _system_prompt: &str, _prompt: &str) -> Result<MedicalAnalysis> {
        Ok(MedicalAnalysis {
            summary: "TSH is above the reference range.".to_string(),
            abnormal_values: vec!["TSH 6.8 mIU/L (0.4-4.0)".to_string()],
            ..Default::default()
        })
    }

    async fn read_document(&self, _data: &[u8], _mime_type: &str, _instruction: &str) -> Result<String> {
        Ok(r#"{"documentType":"lab report","extractedText":"TSH 6.8 mIU/L","description":""}"#.to_string())
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn model_name(&self) -> String {
        "canned".to_string()
    }
}

struct CannedSearch;

#[async_trait]
impl WebSearch for CannedSearch {
    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        Ok(SearchOutcome {
            answer: None,
            hits: vec![SearchHit {
                title: format!("Results for {}", query.query),
                url: "https://medlineplus.gov/hypothyroidism.html".to_string(),
                content: "Hypothyroidism happens when the thyroid gland does not make enough hormone."
                    .to_string(),
                score: Some(0.7),
            }],
        })
    }

    fn is_configured(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_analysis_through_facade() {
    let settings = Settings::default();
    let chain = create_analysis_chain(Arc::new(CannedModel), Arc::new(CannedSearch), &settings);

    let document: ImageAnalysisResponse = chain
        .read_upload(b"%PDF-1.4", "application/pdf", Language::English)
        .await
        .unwrap();
    let request = AnalysisRequest::new(document.analysis_text(), Language::English);
    let response: AnalysisResponse = analyze_medical_record(&chain, &request).await.unwrap();

    assert_eq!(response.extracted_text, "TSH 6.8 mIU/L");
    assert_eq!(response.abnormal_values.len(), 1);
    let source: &ResearchResult = &response.sources[0];
    assert_eq!(source.source, "MedlinePlus");
}

#[tokio::test]
async fn test_chat_through_facade() {
    let settings = Settings::default();
    let memory = ChatMemory::new(&settings.chat);
    let request = ChatRequest {
        message: "What does a high TSH mean?".to_string(),
        language: Some(Language::English),
        session_id: Some("patient-1".to_string()),
    };

    let first: ChatResponse = get_chat_response(&CannedModel, &memory, &settings.chat, &request)
        .await
        .unwrap();
    let second = get_chat_response(&CannedModel, &memory, &settings.chat, &request)
        .await
        .unwrap();

    assert_eq!(first.response, "answer #1");
    assert_eq!(second.response, "answer #2");
    assert_eq!(second.session_id, "patient-1");
}

#[tokio::test]
async fn test_context_research_and_health() {
    let context = AppContext::with_services(
        Settings::default(),
        Arc::new(CannedModel),
        Arc::new(CannedSearch),
    );

    let request = ResearchRequest {
        query: "hypothyroidism".to_string(),
        language: Some(Language::English),
        max_results: Some(1),
    };
    let response: ResearchResponse = medicare_ai::chains::search_medical_research(
        context.gemini_service().as_ref(),
        context.tavily_service().as_ref(),
        &request,
        context.settings().tavily.max_results,
    )
    .await
    .unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(
        response.results[0].ai_summary.as_deref(),
        Some("- thyroid stimulating hormone high")
    );

    let health: HealthCheckResponse = context.health();
    assert_eq!(serde_json::to_value(&health).unwrap()["status"], "healthy");
}
