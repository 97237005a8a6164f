pub mod cache;
pub mod chains;
pub mod config;
pub mod context;
pub mod error;
pub mod i18n;
pub mod llm;
pub mod memory;
pub mod models;
pub mod services;

// Stable import point for consumers
pub use chains::{analyze_medical_record, create_analysis_chain, get_chat_response};
pub use config::{load_google_llm, load_google_vision_llm, settings};
pub use models::schemas::{
    AnalysisRequest, AnalysisResponse, ChatRequest, ChatResponse, HealthCheckResponse,
    ImageAnalysisResponse, MedicalAnalysis, ResearchRequest, ResearchResponse, ResearchResult,
};
pub use services::{gemini_service, tavily_service};
