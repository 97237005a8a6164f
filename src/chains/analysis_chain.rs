//! 病历分析链
//!
//! 流程：校验 → 截断病历 → 规划检索语句并并发检索 → 结构化提取分析结果。
//! 检索失败只降级为无参考来源，提取失败直接返回错误。

use anyhow::Result;
use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::config::{AnalysisConfig, Settings};
use crate::error::ServiceError;
use crate::i18n::Language;
use crate::llm::client::utils::{extract_json_object, truncate_chars};
use crate::models::schemas::{
    AnalysisRequest, AnalysisResponse, ImageAnalysisResponse, ResearchResult,
};
use crate::services::{MedicalLanguageModel, SearchHit, SearchQuery, WebSearch};

use super::research_chain::to_research_result;

/// 去掉模型输出的列表符号与编号
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:[-*•]+|\d+[.)])\s*"#).expect("list marker pattern is valid")
});

const FALLBACK_QUERY_MAX_CHARS: usize = 200;

pub struct AnalysisChain {
    llm: Arc<dyn MedicalLanguageModel>,
    search: Arc<dyn WebSearch>,
    config: AnalysisConfig,
}

/// 创建病历分析链
pub fn create_analysis_chain(
    llm: Arc<dyn MedicalLanguageModel>,
    search: Arc<dyn WebSearch>,
    settings: &Settings,
) -> AnalysisChain {
    AnalysisChain {
        llm,
        search,
        config: settings.analysis.clone(),
    }
}

/// 对一份病历执行分析
pub async fn analyze_medical_record(
    chain: &AnalysisChain,
    request: &AnalysisRequest,
) -> Result<AnalysisResponse> {
    chain.analyze(request).await
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/") || matches!(mime, "application/json" | "application/xml")
}

fn document_instruction(language: Language) -> String {
    format!(
        "You are reading a medical document (lab report, prescription, imaging report, or a photo). \
         Return a JSON object with the fields \"documentType\" (short label), \
         \"extractedText\" (all readable text, verbatim, keeping values and units) and \
         \"description\" (what the document shows, in 1 to 3 sentences). \
         Use an empty string when a field does not apply. \
         Write the description in {}.",
        language.display_name()
    )
}

fn query_planner_prompt(language: Language, count: usize) -> String {
    format!(
        "You help a patient understand a medical record. Write {} short web search queries \
         (in {}) that would find reliable medical information about the most important \
         findings in the record. One query per line, no numbering, no extra text.",
        count,
        language.display_name()
    )
}

fn analysis_system_prompt(language: Language) -> String {
    format!(
        "You are a careful medical assistant explaining a medical record to the patient. \
         Identify the key findings and any values outside their reference ranges, explain them \
         in plain language, and suggest recommendations and concrete next steps. \
         Set urgency to emergency only for findings that need immediate care. \
         Never state a definitive diagnosis. {}",
        language.prompt_instruction()
    )
}

impl AnalysisChain {
    /// 读取上传的文件：图片与PDF交给视觉模型，文本直接解码
    pub async fn read_upload(
        &self,
        data: &[u8],
        mime_type: &str,
        language: Language,
    ) -> Result<ImageAnalysisResponse> {
        if data.is_empty() {
            return Err(ServiceError::invalid("uploaded file is empty").into());
        }

        let mime = normalize_mime(mime_type);
        if is_text_mime(&mime) {
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| ServiceError::invalid("text file is not valid UTF-8"))?;
            if text.trim().is_empty() {
                return Err(ServiceError::invalid("uploaded file is empty").into());
            }
            return Ok(ImageAnalysisResponse {
                document_type: "text".to_string(),
                extracted_text: text.trim().to_string(),
                description: String::new(),
                language,
            });
        }

        if !(mime.starts_with("image/") || mime == "application/pdf") {
            return Err(ServiceError::UnsupportedMedia(mime).into());
        }

        debug!(mime = %mime, bytes = data.len(), "reading document with vision model");
        let raw = self
            .llm
            .read_document(data, &mime, &document_instruction(language))
            .await?;
        let json = extract_json_object(&raw).ok_or_else(|| {
            ServiceError::MalformedOutput("document reader did not return JSON".to_string())
        })?;
        let mut document: ImageAnalysisResponse = serde_json::from_str(json)
            .map_err(|e| ServiceError::MalformedOutput(format!("invalid document JSON: {}", e)))?;
        document.language = language;
        document.validate()?;
        Ok(document)
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        request.validate()?;
        // 没有模型时不把病历内容发给检索服务
        if !self.llm.is_configured() {
            return Err(ServiceError::NotConfigured("GOOGLE_API_KEY").into());
        }
        let language = request.language();
        let record = request.medical_record.trim();

        let (excerpt, truncated) = truncate_chars(record, self.config.max_record_chars);
        if truncated {
            warn!(
                max_chars = self.config.max_record_chars,
                "medical record truncated before analysis"
            );
        }

        let sources = if request.include_research
            && self.config.enable_research
            && self.search.is_configured()
        {
            self.research(&excerpt, language).await
        } else {
            Vec::new()
        };

        let prompt = self.analysis_prompt(&excerpt, request.patient_context.as_deref(), &sources);
        let analysis = self
            .llm
            .extract_analysis(&analysis_system_prompt(language), &prompt)
            .await?;

        info!(
            findings = analysis.key_findings.len(),
            sources = sources.len(),
            urgency = ?analysis.urgency,
            "medical record analyzed"
        );
        Ok(AnalysisResponse::from_analysis(
            analysis,
            record.to_string(),
            sources,
            language,
        ))
    }

    fn analysis_prompt(
        &self,
        record: &str,
        patient_context: Option<&str>,
        sources: &[ResearchResult],
    ) -> String {
        let mut prompt = String::from("Medical record:\n");
        prompt.push_str(record);
        prompt.push_str("\n\n");

        if let Some(context) = patient_context.filter(|context| !context.trim().is_empty()) {
            prompt.push_str("Patient context:\n");
            prompt.push_str(context.trim());
            prompt.push_str("\n\n");
        }

        if !sources.is_empty() {
            prompt.push_str("Reference material from trusted medical sources:\n");
            for (index, source) in sources.iter().enumerate() {
                prompt.push_str(&format!(
                    "[{}] {} ({}): {}\n",
                    index + 1,
                    source.title,
                    source.source,
                    source.description
                ));
            }
        }
        prompt
    }

    /// 规划检索语句，模型不可用时退回病历的第一行
    async fn plan_queries(&self, record: &str, language: Language) -> Vec<String> {
        let count = self.config.research_queries.max(1);
        let planned = match self
            .llm
            .complete(&query_planner_prompt(language, count), record)
            .await
        {
            Ok(output) => parse_queries(&output, count),
            Err(e) => {
                warn!(error = %e, "query planning failed, using the record itself");
                Vec::new()
            }
        };
        if !planned.is_empty() {
            return planned;
        }

        record
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| vec![truncate_chars(line, FALLBACK_QUERY_MAX_CHARS).0])
            .unwrap_or_default()
    }

    async fn research(&self, record: &str, language: Language) -> Vec<ResearchResult> {
        let queries = self.plan_queries(record, language).await;
        if queries.is_empty() {
            return Vec::new();
        }
        debug!(?queries, "running research queries");

        let per_query = self.config.results_per_query.max(1);
        let searches = queries.iter().map(|query| {
            let search = Arc::clone(&self.search);
            let query = SearchQuery::new(query.clone(), per_query);
            async move { search.search(&query).await }
        });

        let mut hits = Vec::new();
        for (query, outcome) in queries.iter().zip(join_all(searches).await) {
            match outcome {
                Ok(outcome) => hits.extend(outcome.hits),
                Err(e) => warn!(query = %query, error = %e, "research query failed"),
            }
        }

        let limit = queries.len() * per_query;
        select_sources(hits, limit)
    }
}

/// 每行一条检索语句，去掉列表符号、引号与空行
fn parse_queries(output: &str, count: usize) -> Vec<String> {
    output
        .lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().trim_matches('"').trim().to_string())
        .filter(|line| line.chars().count() >= 2)
        .take(count)
        .collect()
}

/// 按URL去重后取得分最高的若干条
fn select_sources(hits: Vec<SearchHit>, limit: usize) -> Vec<ResearchResult> {
    let mut seen = HashSet::new();
    let mut unique: Vec<SearchHit> = hits
        .into_iter()
        .filter(|hit| seen.insert(hit.url.trim_end_matches('/').to_string()))
        .collect();
    unique.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
    unique
        .into_iter()
        .take(limit)
        .map(to_research_result)
        .collect()
}
