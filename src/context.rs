//! 应用上下文：统一构造服务并以`Arc`共享给链路与HTTP路由

use anyhow::Result;
use std::sync::Arc;

use crate::chains::{AnalysisChain, create_analysis_chain};
use crate::config::Settings;
use crate::memory::ChatMemory;
use crate::models::schemas::{HealthCheckResponse, ServiceHealth};
use crate::services::{GeminiService, MedicalLanguageModel, TavilyService, WebSearch};

#[derive(Clone)]
pub struct AppContext {
    settings: Arc<Settings>,
    llm: Arc<dyn MedicalLanguageModel>,
    search: Arc<dyn WebSearch>,
    memory: Arc<ChatMemory>,
    analysis_chain: Arc<AnalysisChain>,
}

impl AppContext {
    /// 根据配置构造Gemini与Tavily服务，构造失败时原样返回错误
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let llm: Arc<dyn MedicalLanguageModel> = Arc::new(GeminiService::from_settings(&settings)?);
        let search: Arc<dyn WebSearch> = Arc::new(TavilyService::from_settings(&settings)?);
        Ok(Self::with_services(settings, llm, search))
    }

    /// 使用给定的服务实现构造上下文
    pub fn with_services(
        settings: Settings,
        llm: Arc<dyn MedicalLanguageModel>,
        search: Arc<dyn WebSearch>,
    ) -> Self {
        let memory = Arc::new(ChatMemory::new(&settings.chat));
        let analysis_chain = Arc::new(create_analysis_chain(
            Arc::clone(&llm),
            Arc::clone(&search),
            &settings,
        ));
        Self {
            settings: Arc::new(settings),
            llm,
            search,
            memory,
            analysis_chain,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gemini_service(&self) -> Arc<dyn MedicalLanguageModel> {
        Arc::clone(&self.llm)
    }

    pub fn tavily_service(&self) -> Arc<dyn WebSearch> {
        Arc::clone(&self.search)
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    pub fn analysis_chain(&self) -> &AnalysisChain {
        &self.analysis_chain
    }

    pub fn health(&self) -> HealthCheckResponse {
        HealthCheckResponse::from_services(vec![
            ServiceHealth {
                name: "gemini".to_string(),
                configured: self.llm.is_configured(),
                model: Some(self.llm.model_name()),
            },
            ServiceHealth {
                name: "tavily".to_string(),
                configured: self.search.is_configured(),
                model: None,
            },
        ])
        .with_cache(self.search.cache_report())
    }
}
