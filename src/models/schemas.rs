//! 接口请求与响应的数据结构
//!
//! 字段统一使用camelCase序列化，与前端保持一致。

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::CachePerformanceReport;
use crate::error::ServiceError;
use crate::i18n::Language;

/// 检索语句长度范围（字符，去除首尾空白后）
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_QUERY_CHARS: usize = 500;
/// 单次检索返回条数上限
pub const MAX_RESEARCH_RESULTS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// 未指定时由服务端填入默认语言
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn language(&self) -> Language {
        self.language.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub language: Language,
    pub session_id: String,
    pub disclaimer: String,
    pub timestamp: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// 病历原文
    pub medical_record: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default = "default_true")]
    pub include_research: bool,
    /// 患者补充信息（年龄、既往史等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_context: Option<String>,
}

impl AnalysisRequest {
    pub fn new(medical_record: impl Into<String>, language: Language) -> Self {
        Self {
            medical_record: medical_record.into(),
            language: Some(language),
            include_research: true,
            patient_context: None,
        }
    }

    pub fn language(&self) -> Language {
        self.language.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.medical_record.trim().is_empty() {
            return Err(ServiceError::invalid("medical record is empty"));
        }
        Ok(())
    }
}

/// 紧急程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    #[default]
    Routine,
    Soon,
    Urgent,
    Emergency,
}

/// 模型对病历的结构化分析结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MedicalAnalysis {
    /// Plain-language summary of the record
    pub summary: String,
    /// Most important findings, one per item
    #[serde(default)]
    pub key_findings: Vec<String>,
    /// Values outside the reference range, with the value and the range
    #[serde(default)]
    pub abnormal_values: Vec<String>,
    /// Recommendations for the patient
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Concrete next steps (follow-up tests, specialist visits)
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// How soon the patient should see a doctor
    #[serde(default)]
    pub urgency: UrgencyLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub extracted_text: String,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub abnormal_values: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
    pub urgency: UrgencyLevel,
    pub sources: Vec<ResearchResult>,
    pub language: Language,
    pub disclaimer: String,
}

impl AnalysisResponse {
    pub fn from_analysis(
        analysis: MedicalAnalysis,
        extracted_text: String,
        sources: Vec<ResearchResult>,
        language: Language,
    ) -> Self {
        Self {
            extracted_text,
            summary: analysis.summary,
            key_findings: analysis.key_findings,
            abnormal_values: analysis.abnormal_values,
            recommendations: analysis.recommendations,
            next_steps: analysis.next_steps,
            urgency: analysis.urgency,
            sources,
            language,
            disclaimer: language.disclaimer().to_string(),
        }
    }
}

/// 图片或PDF的读取结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisResponse {
    /// 文档类型，如"lab report"、"prescription"
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub language: Language,
}

impl ImageAnalysisResponse {
    /// 文本与描述至少有一项非空
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.extracted_text.trim().is_empty() && self.description.trim().is_empty() {
            return Err(ServiceError::MalformedOutput(
                "document produced neither text nor description".to_string(),
            ));
        }
        Ok(())
    }

    /// 送入分析链的文本，没有识别出文字时退回描述
    pub fn analysis_text(&self) -> &str {
        if self.extracted_text.trim().is_empty() {
            &self.description
        } else {
            &self.extracted_text
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl ResearchRequest {
    pub fn language(&self) -> Language {
        self.language.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        let chars = self.query.trim().chars().count();
        if chars < MIN_QUERY_CHARS {
            return Err(ServiceError::invalid(format!(
                "query must be at least {} characters",
                MIN_QUERY_CHARS
            )));
        }
        if chars > MAX_QUERY_CHARS {
            return Err(ServiceError::invalid(format!(
                "query must be at most {} characters",
                MAX_QUERY_CHARS
            )));
        }
        Ok(())
    }

    /// 请求的条数，限制在1..=10，未指定时使用`default`
    pub fn effective_max_results(&self, default: usize) -> usize {
        self.max_results
            .unwrap_or(default)
            .clamp(1, MAX_RESEARCH_RESULTS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResponse {
    pub query: String,
    pub results: Vec<ResearchResult>,
    pub total: usize,
    pub language: Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub name: String,
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub services: Vec<ServiceHealth>,
    /// 检索结果缓存的命中统计，缓存关闭时省略
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePerformanceReport>,
}

impl HealthCheckResponse {
    /// 任一外部服务未配置时状态为degraded
    pub fn from_services(services: Vec<ServiceHealth>) -> Self {
        let status = if services.iter().all(|service| service.configured) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            services,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<CachePerformanceReport>) -> Self {
        self.cache = cache;
        self
    }
}
